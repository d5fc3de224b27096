//! Process-level configuration, read once at startup from environment
//! variables rendered into the Gateway Deployment by the Fleet Controller's
//! gateway manager. Declarative policy (scaling, TLS, auth) stays in the
//! `Pool` spec; only the values needed to locate this Gateway's own fleet and
//! listeners are passed as env vars, matching the rest of the workspace's
//! per-binary configuration style.

pub struct Config {
    pub pool_namespace: String,
    pub pool_name: String,
    pub cluster_ca_namespace: String,
    pub listen_addr: String,
    pub metrics_addr: String,
    pub allocation_api_url: String,
}

const POOL_NAMESPACE_ENV: &str = "POOL_NAMESPACE";
const POOL_NAME_ENV: &str = "POOL_NAME";
const CLUSTER_CA_NAMESPACE_ENV: &str = "FLEET_CONTROLLER_NAMESPACE";
const LISTEN_ADDR_ENV: &str = "GATEWAY_LISTEN_ADDR";
const METRICS_ADDR_ENV: &str = "GATEWAY_METRICS_ADDR";
const ALLOCATION_API_URL_ENV: &str = "ALLOCATION_API_URL";

impl Config {
    /// Panics if `POOL_NAMESPACE`/`POOL_NAME` are absent — those two are not
    /// optional, the Gateway cannot serve traffic for a fleet it cannot name.
    pub fn from_env() -> Self {
        Config {
            pool_namespace: std::env::var(POOL_NAMESPACE_ENV).expect("POOL_NAMESPACE to be set"),
            pool_name: std::env::var(POOL_NAME_ENV).expect("POOL_NAME to be set"),
            cluster_ca_namespace: std::env::var(CLUSTER_CA_NAMESPACE_ENV)
                .unwrap_or_else(|_| "buildkit-fleet-system".to_string()),
            listen_addr: std::env::var(LISTEN_ADDR_ENV).unwrap_or_else(|_| "0.0.0.0:8443".to_string()),
            metrics_addr: std::env::var(METRICS_ADDR_ENV).unwrap_or_else(|_| "0.0.0.0:9090".to_string()),
            allocation_api_url: std::env::var(ALLOCATION_API_URL_ENV)
                .unwrap_or_else(|_| "http://allocation-api.buildkit-fleet-system.svc.cluster.local".to_string()),
        }
    }
}
