//! `/workers/release` — revokes the token and deletes the Worker outright.
//! §9's open question ("retain the idle worker instead?") is resolved in
//! DESIGN.md in favor of deletion: the Worker Controller's state machine has
//! no transition back from `Allocated` to `Idle` without a pod restart, so
//! keeping the record around would just leave a phantom `Allocated` worker
//! until the next reconcile notices the cleared allocation.

use crate::errors::TokenNotAllocated;
use error::*;
use k8s::errors::ApiError;
use k8s::Worker;
use kind::Kind;
use kube::api::{Api, DeleteParams};
use result::Result as FleetResult;
use serde::{Deserialize, Serialize};
use tokens::{TokenManager, Validation};

#[derive(Deserialize)]
pub struct ReleaseRequest {
    pub token: String,
}

#[derive(Serialize, Kind)]
pub struct ReleaseResponse {
    pub status: String,
}

pub async fn release(client: &kube::Client, tokens: &TokenManager, req: ReleaseRequest) -> FleetResult<ReleaseResponse> {
    let record = match tokens.validate(&req.token).await? {
        Validation::Valid(record) => record,
        Validation::Expired | Validation::NotFound => return Err(TokenNotAllocated {}.into()),
    };

    tokens.revoke(&req.token).await;

    let workers: Api<Worker> = Api::namespaced(client.clone(), &record.pool.namespace);
    match workers.delete(&record.worker, &DeleteParams::default()).await {
        Ok(_) => {}
        Err(kube::Error::Api(e)) if e.code == 404 => {}
        Err(source) => return Err(ApiError::from(source).into()),
    }

    Ok(ReleaseResponse {
        status: "released".to_string(),
    })
}
