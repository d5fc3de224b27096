//! In-memory, single-process allocation token table.
//!
//! A token is 32 random bytes concatenated with an HMAC-SHA256 signature
//! (keyed by a process-local secret generated once at startup) computed over
//! those bytes, then base64-url encoded with padding — 64 raw bytes come out
//! to an 88 character string. Tokens are never persisted: a restart loses
//! every outstanding allocation and clients are expected to re-allocate.

use base64::engine::general_purpose::URL_SAFE as B64;
use base64::Engine;
use chrono::{DateTime, Duration as ChronoDuration, Utc};
use error::*;
use hmac::{Hmac, Mac};
use rand::rngs::OsRng;
use rand::RngCore;
use result::Result as FleetResult;
use serde::{Deserialize, Serialize};
use sha2::Sha256;
use std::collections::BTreeMap;
use std::collections::HashMap;
use tokio::sync::RwLock;

type HmacSha256 = Hmac<Sha256>;

pub const DEFAULT_TTL_SECS: i64 = 3600;
pub const MAX_TTL_SECS: i64 = 24 * 3600;
const SECRET_LEN: usize = 32;
const RANDOM_LEN: usize = 32;
const MAC_LEN: usize = 32;

/// A reference to the Pool a worker belongs to, carried alongside the
/// allocation so the Gateway and the lookup endpoint don't need a second
/// round-trip to the orchestrator just to find the namespace.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct PoolRef {
    pub namespace: String,
    pub name: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AllocationRecord {
    pub token: String,
    pub pool: PoolRef,
    pub worker: String,
    pub worker_endpoint: String,
    pub job_id: Option<String>,
    pub requester: String,
    pub issued_at: DateTime<Utc>,
    pub expires_at: DateTime<Utc>,
    #[serde(default)]
    pub metadata: BTreeMap<String, String>,
}

pub enum Validation {
    Valid(AllocationRecord),
    Expired,
    NotFound,
}

pub struct TokenManager {
    secret: [u8; SECRET_LEN],
    table: RwLock<HashMap<String, AllocationRecord>>,
}

impl Default for TokenManager {
    fn default() -> Self {
        Self::new()
    }
}

impl TokenManager {
    pub fn new() -> Self {
        let mut secret = [0u8; SECRET_LEN];
        OsRng.fill_bytes(&mut secret);
        TokenManager {
            secret,
            table: RwLock::new(HashMap::new()),
        }
    }

    /// Mints a new token and stores its allocation record. `ttl` is clamped
    /// to [`MAX_TTL_SECS`]; `None` defaults to [`DEFAULT_TTL_SECS`].
    #[allow(clippy::too_many_arguments)]
    pub async fn issue(
        &self,
        pool: PoolRef,
        worker: String,
        worker_endpoint: String,
        job_id: Option<String>,
        requester: String,
        ttl_secs: Option<i64>,
        metadata: BTreeMap<String, String>,
    ) -> AllocationRecord {
        let ttl_secs = ttl_secs.unwrap_or(DEFAULT_TTL_SECS).clamp(1, MAX_TTL_SECS);
        let token = self.generate();
        let issued_at = Utc::now();
        let record = AllocationRecord {
            token: token.clone(),
            pool,
            worker,
            worker_endpoint,
            job_id,
            requester,
            issued_at,
            expires_at: issued_at + ChronoDuration::seconds(ttl_secs),
            metadata,
        };
        self.table.write().await.insert(token, record.clone());
        record
    }

    /// Validates a token's signature and liveness. A well-formed but expired
    /// token is removed from the table as a side effect (lazy sweep).
    pub async fn validate(&self, token: &str) -> FleetResult<Validation> {
        if !self.verify_signature(token) {
            return Ok(Validation::NotFound);
        }
        let now = Utc::now();
        let mut table = self.table.write().await;
        match table.get(token) {
            None => Ok(Validation::NotFound),
            Some(record) if record.expires_at < now => {
                table.remove(token);
                Ok(Validation::Expired)
            }
            Some(record) => Ok(Validation::Valid(record.clone())),
        }
    }

    pub async fn revoke(&self, token: &str) {
        self.table.write().await.remove(token);
    }

    /// New expiry is `min(now + extension, issued_at + max_ttl)`.
    pub async fn refresh(
        &self,
        token: &str,
        extension_secs: i64,
    ) -> FleetResult<Option<AllocationRecord>> {
        let mut table = self.table.write().await;
        let Some(record) = table.get_mut(token) else {
            return Ok(None);
        };
        let now = Utc::now();
        let max_expiry = record.issued_at + ChronoDuration::seconds(MAX_TTL_SECS);
        let requested = now + ChronoDuration::seconds(extension_secs);
        record.expires_at = requested.min(max_expiry);
        Ok(Some(record.clone()))
    }

    /// Periodic sweep: removes every token whose expiry has passed. Returns
    /// the number of entries removed, for logging.
    pub async fn cleanup_expired(&self) -> usize {
        let now = Utc::now();
        let mut table = self.table.write().await;
        let before = table.len();
        table.retain(|_, record| record.expires_at >= now);
        before - table.len()
    }

    fn generate(&self) -> String {
        let mut random = [0u8; RANDOM_LEN];
        OsRng.fill_bytes(&mut random);
        let mac = self.mac(&random);
        let mut raw = Vec::with_capacity(RANDOM_LEN + MAC_LEN);
        raw.extend_from_slice(&random);
        raw.extend_from_slice(&mac);
        B64.encode(raw)
    }

    fn mac(&self, random: &[u8]) -> [u8; MAC_LEN] {
        let mut mac =
            HmacSha256::new_from_slice(&self.secret).expect("HMAC accepts keys of any length");
        mac.update(random);
        mac.finalize().into_bytes().into()
    }

    /// Recomputes the HMAC over the embedded random bytes and compares it
    /// (constant-time, via [`Mac::verify_slice`]) against the embedded tag.
    /// Malformed base64, wrong length, or a mismatched tag are all rejected
    /// identically — this is also what makes forged tokens indistinguishable
    /// from not-found ones to a caller.
    fn verify_signature(&self, token: &str) -> bool {
        let Ok(raw) = B64.decode(token) else {
            return false;
        };
        if raw.len() != RANDOM_LEN + MAC_LEN {
            return false;
        }
        let (random, tag) = raw.split_at(RANDOM_LEN);
        let mut mac =
            HmacSha256::new_from_slice(&self.secret).expect("HMAC accepts keys of any length");
        mac.update(random);
        mac.verify_slice(tag).is_ok()
    }
}

#[derive(Error, FleetError, Kind, HttpCode, Debug)]
#[code(Status::NotFound)]
#[error("no such allocation token")]
pub struct TokenNotFound {}

#[cfg(test)]
mod tests {
    use super::*;

    fn pool() -> PoolRef {
        PoolRef {
            namespace: "default".to_string(),
            name: "builders".to_string(),
        }
    }

    #[tokio::test]
    async fn round_trip() {
        let mgr = TokenManager::new();
        let record = mgr
            .issue(
                pool(),
                "w-1".to_string(),
                "10.0.0.1:7777".to_string(),
                None,
                "alice".to_string(),
                None,
                BTreeMap::new(),
            )
            .await;
        match mgr.validate(&record.token).await.unwrap() {
            Validation::Valid(got) => assert_eq!(got.token, record.token),
            _ => panic!("expected a valid token"),
        }
        mgr.revoke(&record.token).await;
        assert!(matches!(
            mgr.validate(&record.token).await.unwrap(),
            Validation::NotFound
        ));
    }

    #[tokio::test]
    async fn ttl_is_clamped() {
        let mgr = TokenManager::new();
        let record = mgr
            .issue(
                pool(),
                "w-1".to_string(),
                "10.0.0.1:7777".to_string(),
                None,
                "alice".to_string(),
                Some(MAX_TTL_SECS * 10),
                BTreeMap::new(),
            )
            .await;
        let ttl = record.expires_at - record.issued_at;
        assert!(ttl.num_seconds() <= MAX_TTL_SECS);
    }

    #[tokio::test]
    async fn forged_token_is_rejected() {
        let mgr = TokenManager::new();
        let fake = B64.encode([7u8; 64]);
        assert!(matches!(
            mgr.validate(&fake).await.unwrap(),
            Validation::NotFound
        ));
    }

    #[tokio::test]
    async fn flipped_byte_is_rejected() {
        let mgr = TokenManager::new();
        let record = mgr
            .issue(
                pool(),
                "w-1".to_string(),
                "10.0.0.1:7777".to_string(),
                None,
                "alice".to_string(),
                None,
                BTreeMap::new(),
            )
            .await;
        let mut raw = B64.decode(&record.token).unwrap();
        raw[0] ^= 0x01;
        let flipped = B64.encode(raw);
        assert!(matches!(
            mgr.validate(&flipped).await.unwrap(),
            Validation::NotFound
        ));
    }
}
