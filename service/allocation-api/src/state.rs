//! Rocket-managed state shared by every route: the orchestrator client, the
//! in-memory token table, and the identity-verifier cache.

use std::sync::Arc;
use std::time::Duration;
use tokens::TokenManager;

use crate::verifier::VerifierCache;

pub struct State {
    pub client: kube::Client,
    pub tokens: Arc<TokenManager>,
    pub verifiers: Arc<VerifierCache>,
    pub http: reqwest::Client,
}

impl State {
    /// Builds process state and spawns its two background sweepers (expired
    /// token cleanup, idle JWKS-verifier eviction). The returned `Arc`s are
    /// the same ones the sweepers hold, so the tasks keep running for the
    /// life of the process regardless of how `State` itself is stored.
    pub fn new(client: kube::Client) -> Self {
        let http = reqwest::Client::builder()
            .pool_max_idle_per_host(10)
            .pool_idle_timeout(Duration::from_secs(90))
            .timeout(Duration::from_secs(10))
            .build()
            .expect("the outbound HTTP client to build with a static configuration");

        let tokens = Arc::new(TokenManager::new());
        let verifiers = Arc::new(VerifierCache::new(http.clone()));

        spawn_sweepers(tokens.clone(), verifiers.clone());

        State {
            client,
            tokens,
            verifiers,
            http,
        }
    }
}

fn spawn_sweepers(tokens: Arc<TokenManager>, verifiers: Arc<VerifierCache>) {
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(Duration::from_secs(300));
        loop {
            ticker.tick().await;
            let removed = tokens.cleanup_expired().await;
            if removed > 0 {
                log::info!("swept {} expired allocation tokens", removed);
            }
        }
    });
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(Duration::from_secs(3600));
        loop {
            ticker.tick().await;
            verifiers.sweep(Duration::from_secs(24 * 3600)).await;
        }
    });
}
