//! Client for the Allocation API's `/workers/lookup`, the only call the
//! Gateway makes to resolve a presented token into a worker endpoint.

use error::*;
use result::Result as FleetResult;
use serde::{Deserialize, Serialize};

#[derive(Serialize)]
struct LookupRequest {
    token: String,
}

#[derive(Deserialize, Clone)]
pub struct LookupResponse {
    pub worker_endpoint: String,
    pub worker_name: String,
    pub pool: String,
}

#[derive(Deserialize)]
struct Envelope<T> {
    payload: Option<T>,
    error: Option<serde_json::Value>,
}

pub struct LookupClient {
    http: reqwest::Client,
    base_url: String,
}

impl LookupClient {
    pub fn new(base_url: String) -> Self {
        LookupClient {
            http: reqwest::Client::new(),
            base_url,
        }
    }

    pub async fn lookup(&self, token: &str) -> FleetResult<LookupResponse> {
        let url = format!("{}/workers/lookup", self.base_url);
        let resp = self
            .http
            .post(&url)
            .json(&LookupRequest { token: token.to_string() })
            .send()
            .await
            .map_err(|source| LookupRequestFailed {
                reason: source.to_string(),
            })?;

        let status = resp.status();
        let envelope: Envelope<LookupResponse> = resp.json().await.map_err(|source| LookupRequestFailed {
            reason: format!("decoding response body (status {status}): {source}"),
        })?;

        match envelope.payload {
            Some(payload) => Ok(payload),
            None => Err(TokenRejected {
                detail: envelope.error.map(|e| e.to_string()).unwrap_or_else(|| status.to_string()),
            }
            .into()),
        }
    }
}

#[derive(Error, FleetError, Kind, HttpCode, Debug)]
#[code(Status::BadGateway)]
#[error("could not reach the allocation lookup service: {reason}")]
pub struct LookupRequestFailed {
    reason: String,
}

#[derive(Error, FleetError, Kind, HttpCode, Debug)]
#[code(Status::Unauthorized)]
#[error("allocation lookup rejected the presented token: {detail}")]
pub struct TokenRejected {
    detail: String,
}
