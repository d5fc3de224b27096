//! Canonical names for the sub-resources a Pool owns. Centralized here so
//! the Fleet Controller (which writes them) and the Worker Controller,
//! Allocation API, and Gateway (which only read them) never drift apart on
//! a naming convention.

/// Cluster-wide secret holding the CA keypair (`ca.crt`, `ca.key`). One per
/// cluster, not per Pool.
pub const CLUSTER_CA_SECRET: &str = "buildkit-fleet-ca";

pub fn server_secret(pool: &str) -> String {
    format!("{}-server-tls", pool)
}

pub fn worker_secret(pool: &str) -> String {
    format!("{}-worker-tls", pool)
}

pub fn client_secret(pool: &str, token_prefix: &str) -> String {
    format!("{}-client-{}", pool, token_prefix)
}

pub fn config_map(pool: &str) -> String {
    format!("{}-config", pool)
}

pub fn gateway_deployment(pool: &str) -> String {
    format!("{}-gateway", pool)
}

pub fn gateway_service(pool: &str) -> String {
    format!("{}-gateway", pool)
}

pub fn worker_pod(worker: &str) -> String {
    format!("{}-pod", worker)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn names_are_distinct() {
        let pool = "builders";
        assert_ne!(server_secret(pool), worker_secret(pool));
        assert_ne!(config_map(pool), gateway_deployment(pool));
    }
}
