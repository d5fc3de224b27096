mod allocate;
mod auth;
mod certs;
mod errors;
mod lookup;
mod policy;
mod pools;
mod release;
mod state;
mod tokenreview;
mod verifier;

use auth::Caller;
use response::Response;
use result::Result;
use state::State;

#[macro_use]
extern crate rocket;

#[post("/workers/allocate", data = "<body>")]
async fn workers_allocate(
    state: &rocket::State<State>,
    caller: Caller,
    body: rocket::serde::json::Json<allocate::AllocateRequest>,
) -> Result<Response<allocate::AllocateResponse>> {
    Ok(allocate::allocate(state, body.into_inner(), &caller.identity).await?.into())
}

#[post("/workers/lookup", data = "<body>")]
async fn workers_lookup(
    state: &rocket::State<State>,
    body: rocket::serde::json::Json<lookup::LookupRequest>,
) -> Result<Response<lookup::LookupResponse>> {
    Ok(lookup::lookup(&state.tokens, body.into_inner()).await?.into())
}

#[post("/workers/release", data = "<body>")]
async fn workers_release(
    state: &rocket::State<State>,
    body: rocket::serde::json::Json<release::ReleaseRequest>,
) -> Result<Response<release::ReleaseResponse>> {
    Ok(release::release(&state.client, &state.tokens, body.into_inner())
        .await?
        .into())
}

#[get("/pools")]
async fn pools_list(state: &rocket::State<State>, _caller: Caller) -> Result<Response<Vec<pools::PoolSummary>>> {
    Ok(pools::list(&state.client).await?.into())
}

#[post("/pools/<name>/wake?<namespace>")]
async fn pools_wake(
    state: &rocket::State<State>,
    _caller: Caller,
    name: String,
    namespace: String,
) -> Result<Response<pools::WakeResponse>> {
    Ok(pools::wake(&state.client, &namespace, &name).await?.into())
}

#[post("/certs/request", data = "<body>")]
async fn certs_request(
    state: &rocket::State<State>,
    caller: Caller,
    body: rocket::serde::json::Json<certs::CertsRequest>,
) -> Result<Response<certs::CertsResponse>> {
    Ok(certs::request(&state.client, &caller.identity, body.into_inner())
        .await?
        .into())
}

#[get("/health")]
fn health() -> &'static str {
    "ok"
}

#[tokio::main]
async fn main() {
    std::env::set_var("RUST_LOG_STYLE", "always");
    env_logger::init();

    let client = kube::Client::try_default()
        .await
        .expect("a kubeconfig or in-cluster service account to be available");
    let state = State::new(client);

    rocket::build()
        .manage(state)
        .mount(
            "/",
            routes![
                workers_allocate,
                workers_lookup,
                workers_release,
                pools_list,
                pools_wake,
                certs_request,
                health,
            ],
        )
        .ignite()
        .await
        .expect("rocket to ignite")
        .launch()
        .await
        .expect("rocket to serve until shutdown");
}
