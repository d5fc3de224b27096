pub mod client;
pub mod crd;
pub mod errors;
pub mod finalizer;
pub mod leader;
pub mod owner;
pub mod pod;
pub mod resource_names;

pub use crd::{
    Allocation, Condition, GatewaySettings, IdentityConfig, IdentityConfigSpec, Pool, PoolPhase,
    PoolSpec, PoolStatus, ScalingPolicy, ServiceExposure, TlsMode, TlsPolicy, Worker, WorkerCounts,
    WorkerPhase, WorkerResources, WorkerSpec, WorkerStatus, BUILD_DAEMON_PORT, POOL_LABEL,
    WORKER_FINALIZER,
};
pub use pod::PodExt;

/// Namespace the controllers themselves run in, used for cluster-scoped
/// bookkeeping such as the leader-election lease. Individual Pools (and their
/// Workers) live in whatever namespace the user created them in.
pub const CONTROLLER_NAMESPACE_ENV: &str = "FLEET_CONTROLLER_NAMESPACE";

pub fn controller_namespace() -> String {
    std::env::var(CONTROLLER_NAMESPACE_ENV).unwrap_or_else(|_| "buildkit-fleet-system".to_string())
}
