//! The `/workers/allocate` algorithm (spec §4.4): find or create an Idle
//! worker, bind a token to it, and mint a short-lived client certificate
//! whose subject the Gateway will trust.

use crate::errors::{AllocationWriteConflict, AtCapacity, PoolNotFound, WorkerHasNoEndpoint};
use crate::policy;
use crate::state::State;
use backoff::future::retry;
use backoff::ExponentialBackoff;
use chrono::{Duration as ChronoDuration, Utc};
use error::*;
use identity::{secret, CertRequest};
use k8s::errors::ApiError;
use k8s::resource_names;
use k8s::{Allocation, Pool, Worker, WorkerSpec, WorkerStatus, BUILD_DAEMON_PORT, POOL_LABEL};
use kind::Kind;
use kube::api::{Api, ListParams, Patch, PatchParams, PostParams};
use kube::ResourceExt;
use result::Result as FleetResult;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::time::{Duration as StdDuration, Instant};
use tokens::PoolRef;

const WAIT_FOR_NEW_WORKER: StdDuration = StdDuration::from_secs(5 * 60);
const WAIT_FOR_IDLE_WORKER: StdDuration = StdDuration::from_secs(2 * 60);
const POLL_INTERVAL: StdDuration = StdDuration::from_millis(500);
const CLUSTER_CA_NAMESPACE_ENV: &str = "FLEET_CONTROLLER_NAMESPACE";

#[derive(Deserialize)]
pub struct AllocateRequest {
    pub pool: String,
    pub namespace: String,
    #[serde(default)]
    pub ttl: Option<i64>,
    #[serde(default)]
    pub job_id: Option<String>,
    #[serde(default)]
    pub metadata: BTreeMap<String, String>,
}

#[derive(Serialize, Kind)]
pub struct AllocateResponse {
    pub worker: String,
    pub token: String,
    pub endpoint: String,
    pub gateway_endpoint: String,
    pub expires_at: chrono::DateTime<Utc>,
    pub ca_cert: String,
    pub client_cert: String,
    pub client_key: String,
}

pub async fn allocate(state: &State, req: AllocateRequest, caller: &str) -> FleetResult<AllocateResponse> {
    let pools: Api<Pool> = Api::namespaced(state.client.clone(), &req.namespace);
    let pool = pools.get(&req.pool).await.map_err(|source| match source {
        kube::Error::Api(e) if e.code == 404 => {
            Box::new(PoolNotFound { pool: req.pool.clone() }) as Box<dyn FleetError>
        }
        other => ApiError::from(other).into(),
    })?;

    if !policy::authorize(&pool.spec.policy, caller) {
        return Err(crate::errors::Forbidden { pool: req.pool.clone() }.into());
    }

    let workers: Api<Worker> = Api::namespaced(state.client.clone(), &req.namespace);
    let lp = ListParams::default().labels(&format!("{}={}", POOL_LABEL, req.pool));

    let worker_name = match find_idle(&workers, &lp).await? {
        Some(name) => name,
        None => {
            let count = workers.list(&lp).await.map_err(ApiError::from)?.items.len() as u32;
            if count < pool.spec.scaling.max {
                create_worker(&workers, &pool).await?;
                wait_for_idle(&workers, &lp, WAIT_FOR_NEW_WORKER, &req.pool).await?
            } else {
                wait_for_idle(&workers, &lp, WAIT_FOR_IDLE_WORKER, &req.pool).await?
            }
        }
    };

    let worker = workers.get(&worker_name).await.map_err(ApiError::from)?;
    let endpoint = worker
        .status
        .as_ref()
        .and_then(|s| s.endpoint.clone())
        .ok_or_else(|| WorkerHasNoEndpoint { worker: worker_name.clone() })?;

    let record = state
        .tokens
        .issue(
            PoolRef {
                namespace: req.namespace.clone(),
                name: req.pool.clone(),
            },
            worker_name.clone(),
            endpoint.clone(),
            req.job_id.clone(),
            caller.to_string(),
            req.ttl,
            req.metadata.clone(),
        )
        .await;

    if let Err(err) = write_allocation(&workers, &worker_name, &record.token, &record.expires_at, caller, &req).await {
        state.tokens.revoke(&record.token).await;
        return Err(err);
    }

    let ca_namespace = std::env::var(CLUSTER_CA_NAMESPACE_ENV).unwrap_or_else(|_| "buildkit-fleet-system".to_string());
    let ca = secret::ensure_ca(&ca_namespace, resource_names::CLUSTER_CA_SECRET).await?;
    let (ca_pem, _) = ca.to_pem();

    let ttl_secs = (record.expires_at - record.issued_at).num_seconds().max(1);
    let issued = ca.issue(&CertRequest {
        common_name: format!("alloc:{}", record.token),
        dns_names: vec![],
        ip_addresses: vec![],
        organization: String::new(),
        duration: ChronoDuration::seconds(ttl_secs),
        is_server: false,
        is_client: true,
    })?;

    let gateway_endpoint = format!(
        "{}.{}.svc.cluster.local:{}",
        resource_names::gateway_service(&req.pool),
        req.namespace,
        pool.spec.gateway.port,
    );

    Ok(AllocateResponse {
        worker: worker_name,
        token: record.token,
        endpoint,
        gateway_endpoint,
        expires_at: record.expires_at,
        ca_cert: base64_encode(&ca_pem),
        client_cert: base64_encode(&issued.cert_pem),
        client_key: base64_encode(&issued.key_pem),
    })
}

fn base64_encode(s: &str) -> String {
    use base64::engine::general_purpose::STANDARD;
    use base64::Engine;
    STANDARD.encode(s.as_bytes())
}

async fn find_idle(workers: &Api<Worker>, lp: &ListParams) -> FleetResult<Option<String>> {
    let list = workers.list(lp).await.map_err(ApiError::from)?;
    Ok(list
        .items
        .into_iter()
        .find(|w| matches!(w.status.as_ref().map(|s| &s.phase), Some(k8s::WorkerPhase::Idle)))
        .map(|w| w.name_any()))
}

async fn create_worker(workers: &Api<Worker>, pool: &Pool) -> FleetResult<()> {
    let mut labels = BTreeMap::new();
    labels.insert(POOL_LABEL.to_string(), pool.name_any());
    let worker = Worker {
        metadata: kube::api::ObjectMeta {
            generate_name: Some(format!("{}-", pool.name_any())),
            owner_references: Some(vec![k8s::owner::owner_reference(pool)]),
            labels: Some(labels),
            ..Default::default()
        },
        spec: WorkerSpec {
            pool: pool.name_any(),
            allocation: None,
        },
        status: None,
    };
    workers
        .create(&PostParams::default(), &worker)
        .await
        .map_err(ApiError::from)?;
    Ok(())
}

async fn wait_for_idle(
    workers: &Api<Worker>,
    lp: &ListParams,
    deadline: StdDuration,
    pool_name: &str,
) -> FleetResult<String> {
    let start = Instant::now();
    loop {
        if let Some(name) = find_idle(workers, lp).await? {
            return Ok(name);
        }
        if start.elapsed() >= deadline {
            return Err(AtCapacity { pool: pool_name.to_string() }.into());
        }
        tokio::time::sleep(POLL_INTERVAL.max(StdDuration::from_secs(2))).await;
    }
}

async fn write_allocation(
    workers: &Api<Worker>,
    worker_name: &str,
    token: &str,
    expires_at: &chrono::DateTime<Utc>,
    caller: &str,
    req: &AllocateRequest,
) -> FleetResult<()> {
    let worker_name = worker_name.to_string();
    let token = token.to_string();
    let caller = caller.to_string();
    let expires_at = *expires_at;
    let job_id = req.job_id.clone();
    let metadata = req.metadata.clone();

    let result = retry(ExponentialBackoff {
        max_elapsed_time: Some(StdDuration::from_millis(300)),
        ..ExponentialBackoff::default()
    }, || {
        let workers = workers.clone();
        let worker_name = worker_name.clone();
        let token = token.clone();
        let caller = caller.clone();
        let job_id = job_id.clone();
        let metadata = metadata.clone();
        async move {
            let patch = serde_json::json!({
                "spec": {
                    "allocation": Allocation {
                        job_id,
                        token,
                        requester: caller,
                        allocated_at: Utc::now(),
                        expires_at,
                        metadata,
                    }
                }
            });
            workers
                .patch(&worker_name, &PatchParams::default(), &Patch::Merge(&patch))
                .await
                .map_err(|source| match source {
                    kube::Error::Api(e) if e.code == 409 => {
                        backoff::Error::transient(ApiError::from(kube::Error::Api(e)))
                    }
                    other => backoff::Error::permanent(ApiError::from(other)),
                })
        }
    })
    .await;

    result.map(|_| ()).map_err(|_| AllocationWriteConflict { worker: worker_name }.into())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn base64_round_trips() {
        let encoded = base64_encode("hello");
        use base64::engine::general_purpose::STANDARD;
        use base64::Engine;
        assert_eq!(STANDARD.decode(encoded).unwrap(), b"hello");
    }
}
