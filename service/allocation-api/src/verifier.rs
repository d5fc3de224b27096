//! Lazily-constructed JWKS verifiers for enabled `IdentityConfig`s, cached by
//! issuer URL with a last-used timestamp so a background sweeper can evict
//! verifiers nobody has presented a token for in 24 hours.

use error::*;
use jsonwebtoken::{decode, Algorithm, DecodingKey, Validation};
use result::Result as FleetResult;
use serde::Deserialize;
use std::collections::HashMap;
use std::time::Instant;
use tokio::sync::RwLock;

#[derive(Deserialize)]
struct Jwks {
    keys: Vec<Jwk>,
}

#[derive(Deserialize)]
struct Jwk {
    n: String,
    e: String,
}

struct CachedVerifier {
    keys: Vec<DecodingKey>,
    last_used: Instant,
}

pub struct VerifierCache {
    http: reqwest::Client,
    entries: RwLock<HashMap<String, CachedVerifier>>,
}

impl VerifierCache {
    pub fn new(http: reqwest::Client) -> Self {
        VerifierCache {
            http,
            entries: RwLock::new(HashMap::new()),
        }
    }

    /// Verifies `token` as an RS256 JWT issued by `issuer_url`, fetching and
    /// caching its JWKS on first use. Returns the caller identity read out of
    /// `user_claim`, or `None` if no cached or fetched key validates it.
    pub async fn verify(
        &self,
        issuer_url: &str,
        audience: &str,
        user_claim: &str,
        token: &str,
    ) -> FleetResult<Option<String>> {
        self.ensure_loaded(issuer_url).await?;

        let entries = self.entries.read().await;
        let Some(entry) = entries.get(issuer_url) else {
            return Ok(None);
        };

        let mut validation = Validation::new(Algorithm::RS256);
        validation.set_audience(&[audience]);

        for key in &entry.keys {
            if let Ok(data) = decode::<serde_json::Value>(token, key, &validation) {
                let identity = data
                    .claims
                    .get(user_claim)
                    .and_then(|v| v.as_str())
                    .map(str::to_string);
                if identity.is_some() {
                    return Ok(identity);
                }
            }
        }
        Ok(None)
    }

    async fn ensure_loaded(&self, issuer_url: &str) -> FleetResult<()> {
        {
            let mut entries = self.entries.write().await;
            if let Some(entry) = entries.get_mut(issuer_url) {
                entry.last_used = Instant::now();
                return Ok(());
            }
        }

        let jwks_url = format!("{}/.well-known/jwks.json", issuer_url.trim_end_matches('/'));
        let jwks: Jwks = self
            .http
            .get(&jwks_url)
            .send()
            .await
            .map_err(|source| JwksFetchFailed {
                issuer: issuer_url.to_string(),
                source: source.to_string(),
            })?
            .json()
            .await
            .map_err(|source| JwksFetchFailed {
                issuer: issuer_url.to_string(),
                source: source.to_string(),
            })?;

        let keys = jwks
            .keys
            .iter()
            .filter_map(|k| DecodingKey::from_rsa_components(&k.n, &k.e).ok())
            .collect();

        self.entries.write().await.insert(
            issuer_url.to_string(),
            CachedVerifier {
                keys,
                last_used: Instant::now(),
            },
        );
        Ok(())
    }

    /// Drops every cached verifier whose last use is older than `max_idle`.
    /// Run periodically by a background task spawned at startup.
    pub async fn sweep(&self, max_idle: std::time::Duration) {
        let mut entries = self.entries.write().await;
        entries.retain(|_, entry| entry.last_used.elapsed() < max_idle);
    }
}

#[derive(Error, FleetError, Kind, HttpCode, Debug)]
#[code(Status::Unauthorized)]
#[error("failed to fetch JWKS for issuer '{issuer}': {source}")]
pub struct JwksFetchFailed {
    issuer: String,
    source: String,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn sweep_drops_only_stale_entries() {
        let cache = VerifierCache::new(reqwest::Client::new());
        cache.entries.write().await.insert(
            "https://issuer.example".to_string(),
            CachedVerifier {
                keys: vec![],
                last_used: Instant::now(),
            },
        );
        cache.sweep(std::time::Duration::from_secs(3600)).await;
        assert_eq!(cache.entries.read().await.len(), 1);
    }
}
