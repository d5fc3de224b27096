//! `/workers/lookup` — used only by the Gateway, network-restricted at the
//! deployment layer rather than by caller identity (the Gateway has no user
//! context of its own to authenticate with).

use crate::errors::TokenNotAllocated;
use error::*;
use kind::Kind;
use result::Result as FleetResult;
use serde::{Deserialize, Serialize};
use tokens::{TokenManager, Validation};

#[derive(Deserialize)]
pub struct LookupRequest {
    pub token: String,
}

#[derive(Serialize, Kind)]
pub struct LookupResponse {
    pub worker_endpoint: String,
    pub worker_name: String,
    pub pool: String,
}

pub async fn lookup(tokens: &TokenManager, req: LookupRequest) -> FleetResult<LookupResponse> {
    match tokens.validate(&req.token).await? {
        Validation::Valid(record) => Ok(LookupResponse {
            worker_endpoint: record.worker_endpoint,
            worker_name: record.worker,
            pool: record.pool.name,
        }),
        Validation::Expired | Validation::NotFound => Err(TokenNotAllocated {}.into()),
    }
}
