//! Bearer-auth request guard. Tries, in order, signed-token verification
//! against every enabled `IdentityConfig`, then the orchestrator's own
//! token-review endpoint. First success wins; both failing is a 401.

use crate::state::State;
use crate::tokenreview;
use error::*;
use k8s::IdentityConfig;
use kube::api::{Api, ListParams};
use result::Result as FleetResult;
use rocket::http::Status;
use rocket::outcome::Outcome;
use rocket::request::{self, FromRequest, Request};

/// The authenticated caller's identity, as read from whichever auth method
/// succeeded.
pub struct Caller {
    pub identity: String,
}

#[rocket::async_trait]
impl<'r> FromRequest<'r> for Caller {
    type Error = Box<dyn FleetError>;

    async fn from_request(req: &'r Request<'_>) -> request::Outcome<Self, Self::Error> {
        let Some(token) = bearer_token(req) else {
            return Outcome::Error((Status::Unauthorized, Unauthenticated {}.into()));
        };
        let state = req
            .rocket()
            .state::<State>()
            .expect("allocation-api State is always managed");

        match authenticate(state, &token).await {
            Ok(Some(identity)) => Outcome::Success(Caller { identity }),
            Ok(None) => Outcome::Error((Status::Unauthorized, Unauthenticated {}.into())),
            Err(err) => Outcome::Error((Status::Unauthorized, err)),
        }
    }
}

fn bearer_token(req: &Request<'_>) -> Option<String> {
    req.headers()
        .get_one("Authorization")?
        .strip_prefix("Bearer ")
        .map(str::to_string)
}

async fn authenticate(state: &State, token: &str) -> FleetResult<Option<String>> {
    let configs: Api<IdentityConfig> = Api::all(state.client.clone());
    let list = configs
        .list(&ListParams::default())
        .await
        .map_err(k8s::errors::ApiError::from)?;

    for config in list.items.iter().filter(|c| c.spec.enabled) {
        if let Some(identity) = state
            .verifiers
            .verify(
                &config.spec.issuer_url,
                &config.spec.audience,
                &config.spec.user_claim,
                token,
            )
            .await?
        {
            return Ok(Some(identity));
        }
    }

    tokenreview::verify(&state.client, token).await
}

#[derive(Error, FleetError, Kind, HttpCode, Debug)]
#[code(Status::Unauthorized)]
#[error("missing or invalid bearer credentials")]
pub struct Unauthenticated {}
