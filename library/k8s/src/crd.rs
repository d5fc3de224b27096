//! Declarative record types registered with the orchestrator: `Pool`, `Worker`,
//! and `IdentityConfig`, all versioned under the same stable API group.

use chrono::{DateTime, Utc};
use kube::CustomResource;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

pub const GROUP: &str = "buildkit.fleet.io";
pub const VERSION: &str = "v1alpha1";

/// Label applied to every Worker (and its pod) naming the owning Pool.
pub const POOL_LABEL: &str = "buildkit.fleet.io/pool";

/// Finalizer added to a Worker on first reconcile; removed only after its pod
/// has been deleted.
pub const WORKER_FINALIZER: &str = "buildkit.fleet.io/worker-finalizer";

/// TCP port the build daemon binary listens on inside every worker pod. A
/// black-box constant of the build daemon's own wire contract, not something
/// a Pool author configures.
pub const BUILD_DAEMON_PORT: i32 = 7788;

// ---------------------------------------------------------------------
// Pool
// ---------------------------------------------------------------------

#[derive(CustomResource, Debug, Clone, Deserialize, Serialize, JsonSchema)]
#[kube(
    group = "buildkit.fleet.io",
    version = "v1alpha1",
    kind = "Pool",
    namespaced,
    status = "PoolStatus",
    shortname = "pool"
)]
pub struct PoolSpec {
    pub scaling: ScalingPolicy,
    pub worker_resources: WorkerResources,
    pub build_daemon_image: String,
    pub tls: TlsPolicy,
    /// Caller-identity auth methods permitted against this pool's allocation
    /// policy. Empty means "no restriction beyond global authentication".
    #[serde(default)]
    pub auth_methods: Vec<String>,
    /// Caller-identity patterns allowed to allocate from this pool. Supports
    /// `*` (any) and `prefix*` suffix wildcards.
    #[serde(default)]
    pub policy: Vec<String>,
    pub gateway: GatewaySettings,
}

#[derive(Debug, Clone, Default, Deserialize, Serialize, JsonSchema, PartialEq)]
pub struct ScalingPolicy {
    #[serde(default)]
    pub min: u32,
    pub max: u32,
    /// Seconds of fleet-wide idleness before a `min: 0` pool scales to zero.
    #[serde(default = "default_scale_down_delay_secs")]
    pub scale_down_delay_secs: u64,
    /// Optional 5-field cron expression. When the current time matches
    /// (within a 2 minute window) desired is forced to zero regardless of `min`.
    #[serde(default)]
    pub scale_to_zero_cron: Option<String>,
}

fn default_scale_down_delay_secs() -> u64 {
    300
}

#[derive(Debug, Clone, Default, Deserialize, Serialize, JsonSchema, PartialEq)]
pub struct WorkerResources {
    #[serde(default)]
    pub cpu: Option<String>,
    #[serde(default)]
    pub memory: Option<String>,
}

#[derive(Debug, Clone, Deserialize, Serialize, JsonSchema, PartialEq)]
#[serde(rename_all = "lowercase")]
pub enum TlsMode {
    Auto,
    Manual,
}

impl Default for TlsMode {
    fn default() -> Self {
        TlsMode::Auto
    }
}

#[derive(Debug, Clone, Deserialize, Serialize, JsonSchema, PartialEq)]
pub struct TlsPolicy {
    #[serde(default)]
    pub mode: TlsMode,
    #[serde(default = "default_server_cert_duration_secs")]
    pub server_cert_duration_secs: u64,
    #[serde(default = "default_rotate_before_secs")]
    pub rotate_before_secs: u64,
}

impl Default for TlsPolicy {
    fn default() -> Self {
        TlsPolicy {
            mode: TlsMode::Auto,
            server_cert_duration_secs: default_server_cert_duration_secs(),
            rotate_before_secs: default_rotate_before_secs(),
        }
    }
}

fn default_server_cert_duration_secs() -> u64 {
    365 * 24 * 3600
}

fn default_rotate_before_secs() -> u64 {
    30 * 24 * 3600
}

#[derive(Debug, Clone, Deserialize, Serialize, JsonSchema, PartialEq)]
#[serde(rename_all = "PascalCase")]
pub enum ServiceExposure {
    ClusterIp,
    NodePort,
    LoadBalancer,
}

impl Default for ServiceExposure {
    fn default() -> Self {
        ServiceExposure::ClusterIp
    }
}

#[derive(Debug, Clone, Deserialize, Serialize, JsonSchema, PartialEq)]
pub struct GatewaySettings {
    #[serde(default = "default_true")]
    pub enabled: bool,
    #[serde(default = "default_gateway_replicas")]
    pub replicas: u32,
    #[serde(default = "default_gateway_port")]
    pub port: u16,
    #[serde(default)]
    pub exposure: ServiceExposure,
    #[serde(default)]
    pub external_hostname: Option<String>,
}

impl Default for GatewaySettings {
    fn default() -> Self {
        GatewaySettings {
            enabled: true,
            replicas: default_gateway_replicas(),
            port: default_gateway_port(),
            exposure: ServiceExposure::default(),
            external_hostname: None,
        }
    }
}

fn default_true() -> bool {
    true
}

fn default_gateway_replicas() -> u32 {
    1
}

fn default_gateway_port() -> u16 {
    8443
}

#[derive(Debug, Clone, Default, Deserialize, Serialize, JsonSchema, PartialEq)]
pub struct PoolStatus {
    #[serde(default)]
    pub phase: PoolPhase,
    #[serde(default)]
    pub gateway_ready: bool,
    #[serde(default)]
    pub workers: WorkerCounts,
    #[serde(default)]
    pub endpoint: Option<String>,
    #[serde(default)]
    pub server_cert_not_before: Option<DateTime<Utc>>,
    #[serde(default)]
    pub server_cert_not_after: Option<DateTime<Utc>>,
    #[serde(default)]
    pub conditions: Vec<Condition>,
    #[serde(default)]
    pub observed_generation: i64,
}

#[derive(Debug, Clone, Deserialize, Serialize, JsonSchema, PartialEq)]
pub enum PoolPhase {
    Pending,
    Running,
    ScaledToZero,
    Failed,
}

impl Default for PoolPhase {
    fn default() -> Self {
        PoolPhase::Pending
    }
}

#[derive(Debug, Clone, Default, Deserialize, Serialize, JsonSchema, PartialEq)]
pub struct WorkerCounts {
    #[serde(default)]
    pub total: u32,
    #[serde(default)]
    pub ready: u32,
    #[serde(default)]
    pub idle: u32,
    #[serde(default)]
    pub allocated: u32,
    #[serde(default)]
    pub provisioning: u32,
    #[serde(default)]
    pub failed: u32,
    #[serde(default)]
    pub desired: u32,
    #[serde(default)]
    pub needed: u32,
}

#[derive(Debug, Clone, Deserialize, Serialize, JsonSchema, PartialEq)]
pub struct Condition {
    #[serde(rename = "type")]
    pub type_: String,
    pub status: String,
    pub reason: String,
    pub message: String,
    pub observed_generation: i64,
    pub last_transition_time: DateTime<Utc>,
}

// ---------------------------------------------------------------------
// Worker
// ---------------------------------------------------------------------

#[derive(CustomResource, Debug, Clone, Deserialize, Serialize, JsonSchema)]
#[kube(
    group = "buildkit.fleet.io",
    version = "v1alpha1",
    kind = "Worker",
    namespaced,
    status = "WorkerStatus",
    shortname = "wkr"
)]
pub struct WorkerSpec {
    pub pool: String,
    #[serde(default)]
    pub allocation: Option<Allocation>,
}

#[derive(Debug, Clone, Deserialize, Serialize, JsonSchema, PartialEq)]
pub struct Allocation {
    pub job_id: Option<String>,
    pub token: String,
    pub requester: String,
    pub allocated_at: DateTime<Utc>,
    pub expires_at: DateTime<Utc>,
    #[serde(default)]
    pub metadata: BTreeMap<String, String>,
}

#[derive(Debug, Clone, Default, Deserialize, Serialize, JsonSchema, PartialEq)]
pub struct WorkerStatus {
    #[serde(default)]
    pub phase: WorkerPhase,
    #[serde(default)]
    pub pod_name: Option<String>,
    #[serde(default)]
    pub pod_ip: Option<String>,
    #[serde(default)]
    pub endpoint: Option<String>,
    #[serde(default)]
    pub created_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub ready_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub last_activity: Option<DateTime<Utc>>,
    #[serde(default)]
    pub allocation_count: u64,
    #[serde(default)]
    pub failure_message: Option<String>,
}

#[derive(Debug, Clone, Deserialize, Serialize, JsonSchema, PartialEq)]
pub enum WorkerPhase {
    Pending,
    Provisioning,
    Idle,
    Allocated,
    Running,
    Terminating,
    Failed,
}

impl Default for WorkerPhase {
    fn default() -> Self {
        WorkerPhase::Pending
    }
}

// ---------------------------------------------------------------------
// IdentityConfig
// ---------------------------------------------------------------------

#[derive(CustomResource, Debug, Clone, Deserialize, Serialize, JsonSchema)]
#[kube(
    group = "buildkit.fleet.io",
    version = "v1alpha1",
    kind = "IdentityConfig",
    shortname = "idc"
)]
pub struct IdentityConfigSpec {
    pub issuer_url: String,
    pub audience: String,
    #[serde(default = "default_user_claim")]
    pub user_claim: String,
    #[serde(default = "default_groups_claim")]
    pub groups_claim: String,
    #[serde(default = "default_true")]
    pub enabled: bool,
}

fn default_user_claim() -> String {
    "sub".to_string()
}

fn default_groups_claim() -> String {
    "groups".to_string()
}
