//! `GET /pools` and the wake path (`POST /pools/{name}/wake`): scale a
//! scaled-to-zero pool back up and wait for its Gateway to report Ready.

use crate::errors::{PoolNotFound, WakeTimedOut};
use error::*;
use k8s::errors::ApiError;
use k8s::{Pool, PoolPhase};
use kind::Kind;
use kube::api::{Api, ListParams, Patch, PatchParams};
use kube::ResourceExt;
use result::Result as FleetResult;
use serde::Serialize;
use std::time::{Duration, Instant};

const WAKE_POLL_INTERVAL: Duration = Duration::from_secs(2);
const WAKE_DEADLINE: Duration = Duration::from_secs(5 * 60);

#[derive(Serialize, Kind)]
pub struct PoolSummary {
    pub namespace: String,
    pub name: String,
    pub phase: PoolPhase,
    pub endpoint: Option<String>,
}

pub async fn list(client: &kube::Client) -> FleetResult<Vec<PoolSummary>> {
    let pools: Api<Pool> = Api::all(client.clone());
    let items = pools.list(&ListParams::default()).await.map_err(ApiError::from)?;
    Ok(items
        .items
        .into_iter()
        .map(|pool| PoolSummary {
            namespace: pool.namespace().unwrap_or_default(),
            name: pool.name_any(),
            phase: pool.status.as_ref().map(|s| s.phase.clone()).unwrap_or_default(),
            endpoint: pool.status.as_ref().and_then(|s| s.endpoint.clone()),
        })
        .collect())
}

#[derive(Serialize, Kind)]
pub struct WakeResponse {
    pub endpoint: String,
}

pub async fn wake(client: &kube::Client, namespace: &str, name: &str) -> FleetResult<WakeResponse> {
    let pools: Api<Pool> = Api::namespaced(client.clone(), namespace);
    let pool = pools.get(name).await.map_err(|source| match source {
        kube::Error::Api(e) if e.code == 404 => Box::new(PoolNotFound { pool: name.to_string() }) as Box<dyn FleetError>,
        other => ApiError::from(other).into(),
    })?;

    if pool.spec.scaling.min == 0 {
        let patch = serde_json::json!({ "spec": { "scaling": { "min": 1 } } });
        pools
            .patch(name, &PatchParams::default(), &Patch::Merge(&patch))
            .await
            .map_err(ApiError::from)?;
    }

    let start = Instant::now();
    loop {
        let current = pools.get(name).await.map_err(ApiError::from)?;
        if let Some(status) = &current.status {
            let ready = status
                .conditions
                .iter()
                .any(|c| c.type_ == "Ready" && c.status == "True");
            if ready {
                if let Some(endpoint) = status.endpoint.clone() {
                    return Ok(WakeResponse { endpoint });
                }
            }
        }
        if start.elapsed() >= WAKE_DEADLINE {
            return Err(WakeTimedOut { pool: name.to_string() }.into());
        }
        tokio::time::sleep(WAKE_POLL_INTERVAL).await;
    }
}
