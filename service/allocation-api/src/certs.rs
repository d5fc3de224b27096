//! `POST /certs/request` — mints an operator-facing client bundle (not bound
//! to any single allocation token) good for dialing the Gateway of each named
//! pool directly, for tooling that wants a standing credential rather than a
//! per-job allocation.

use error::*;
use identity::{secret, CertRequest};
use k8s::errors::ApiError;
use k8s::resource_names;
use k8s::Pool;
use kind::Kind;
use kube::api::Api;
use result::Result as FleetResult;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

const CLUSTER_CA_NAMESPACE_ENV: &str = "FLEET_CONTROLLER_NAMESPACE";
const DEFAULT_DURATION_SECS: i64 = 3600;

#[derive(Deserialize)]
pub struct CertsRequest {
    pub pools: Vec<PoolRef>,
    #[serde(default)]
    pub duration: Option<i64>,
}

#[derive(Deserialize)]
pub struct PoolRef {
    pub namespace: String,
    pub name: String,
}

#[derive(Serialize, Kind)]
pub struct CertsResponse {
    pub ca: String,
    pub cert: String,
    pub key: String,
    pub endpoints: BTreeMap<String, String>,
}

pub async fn request(client: &kube::Client, caller: &str, req: CertsRequest) -> FleetResult<CertsResponse> {
    let ca_namespace = std::env::var(CLUSTER_CA_NAMESPACE_ENV).unwrap_or_else(|_| "buildkit-fleet-system".to_string());
    let ca = secret::ensure_ca(&ca_namespace, resource_names::CLUSTER_CA_SECRET).await?;
    let (ca_pem, _) = ca.to_pem();

    let duration = chrono::Duration::seconds(req.duration.unwrap_or(DEFAULT_DURATION_SECS));
    let issued = ca.issue(&CertRequest {
        common_name: format!("operator:{}", caller),
        dns_names: vec![],
        ip_addresses: vec![],
        organization: String::new(),
        duration,
        is_server: false,
        is_client: true,
    })?;

    let mut endpoints = BTreeMap::new();
    for pool_ref in &req.pools {
        let pools: Api<Pool> = Api::namespaced(client.clone(), &pool_ref.namespace);
        let pool = pools.get(&pool_ref.name).await.map_err(ApiError::from)?;
        let endpoint = format!(
            "{}.{}.svc.cluster.local:{}",
            resource_names::gateway_service(&pool_ref.name),
            pool_ref.namespace,
            pool.spec.gateway.port,
        );
        endpoints.insert(pool_ref.name.clone(), endpoint);
    }

    Ok(CertsResponse {
        ca: base64_encode(&ca_pem),
        cert: base64_encode(&issued.cert_pem),
        key: base64_encode(&issued.key_pem),
        endpoints,
    })
}

fn base64_encode(s: &str) -> String {
    use base64::engine::general_purpose::STANDARD;
    use base64::Engine;
    STANDARD.encode(s.as_bytes())
}
