//! Fallback authentication path: hands the caller's bearer token to the
//! orchestrator's own token-review endpoint when no enabled `IdentityConfig`
//! accepted it.

use k8s::errors::ApiError;
use k8s_openapi::api::authentication::v1::{TokenReview, TokenReviewSpec};
use kube::api::{Api, PostParams};
use result::Result as FleetResult;

pub async fn verify(client: &kube::Client, token: &str) -> FleetResult<Option<String>> {
    let api: Api<TokenReview> = Api::all(client.clone());
    let review = TokenReview {
        spec: TokenReviewSpec {
            token: Some(token.to_string()),
            ..Default::default()
        },
        ..Default::default()
    };
    let reviewed = api
        .create(&PostParams::default(), &review)
        .await
        .map_err(ApiError::from)?;
    let status = reviewed.status.unwrap_or_default();
    if !status.authenticated.unwrap_or(false) {
        return Ok(None);
    }
    Ok(status.user.and_then(|info| info.username))
}
