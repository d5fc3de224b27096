//! Drives the Pool reconcile loop through the fixed order laid out in
//! §4.6: ensure the cluster CA exists, then TLS, Config, Gateway, and
//! Worker managers in that order, then fold their outcomes into the
//! status sub-resource. Workers carry an owner reference back to their
//! Pool (set at creation in the worker manager), so `.owns()` is enough
//! to wake a reconcile the moment a worker's phase changes — no separate
//! label-based mapping needed.

use crate::{config, gatewaymgr, requeue, status, tls, workers};
use error::*;
use futures::StreamExt;
use k8s::{Pool, Worker};
use kube::api::Api;
use kube::runtime::controller::Action;
use kube::runtime::{watcher, Controller};
use kube::ResourceExt;
use log::{info, warn};
use result::Result as FleetResult;
use std::sync::Arc;
use std::time::Duration;
use term_colors::*;

pub struct Context {
    pub client: kube::Client,
}

pub async fn run(client: kube::Client) {
    let ctx = Arc::new(Context { client: client.clone() });
    let pools: Api<Pool> = Api::all(client.clone());
    let workers: Api<Worker> = Api::all(client);

    Controller::new(pools, watcher::Config::default())
        .owns(workers, watcher::Config::default())
        .shutdown_on_signal()
        .run(reconcile, error_policy, ctx)
        .for_each(|res| async move {
            match res {
                Ok((object, _)) => info!("reconciled pool {}", cyan(object.name)),
                Err(err) => warn!("pool reconcile failed: {}", err),
            }
        })
        .await;
}

fn error_policy(_pool: Arc<Pool>, err: &StringError, _ctx: Arc<Context>) -> Action {
    warn!("pool reconcile error: {}", err);
    Action::requeue(Duration::from_secs(10))
}

async fn reconcile(pool: Arc<Pool>, ctx: Arc<Context>) -> Result<Action, StringError> {
    apply(&pool, &ctx).await.map_err(StringError::from)
}

async fn apply(pool: &Pool, ctx: &Context) -> FleetResult<Action> {
    let name = pool.name_any();
    let client = &ctx.client;

    let tls_outcome = match tls::reconcile(pool).await {
        Ok(outcome) => outcome,
        Err(err) => {
            warn!("pool {} TLS reconcile failed: {}", cyan(&name), err);
            status::mark_failed(client, pool, "TlsReconcileFailed", &err.to_string()).await?;
            return Ok(Action::requeue(Duration::from_secs(30)));
        }
    };

    config::reconcile(client, pool).await?;
    let gateway_outcome = gatewaymgr::reconcile(client, pool).await?;

    let worker_outcome = match workers::reconcile(client, pool).await {
        Ok(outcome) => outcome,
        Err(err) => {
            warn!("pool {} worker reconcile failed: {}", cyan(&name), err);
            status::mark_failed(client, pool, "WorkerReconcileFailed", &err.to_string()).await?;
            return Ok(Action::requeue(Duration::from_secs(30)));
        }
    };

    status::reconcile(client, pool, &tls_outcome, &gateway_outcome, &worker_outcome).await?;

    let requeue_after = requeue::next_requeue(chrono::Utc::now(), tls_outcome.server_cert_not_after);
    Ok(Action::requeue(requeue_after))
}
