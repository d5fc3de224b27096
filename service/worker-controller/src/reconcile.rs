use crate::podspec::build_pod;
use crate::requeue::{next_requeue, STUCK_THRESHOLD};
use chrono::Utc;
use error::*;
use futures::StreamExt;
use k8s::pod::PodExt;
use k8s::{errors::ApiError, finalizer, Pool, Worker, WorkerPhase, WorkerStatus, WORKER_FINALIZER};
use k8s_openapi::api::core::v1::Pod;
use kube::api::{Api, DeleteParams, Patch, PatchParams};
use kube::runtime::controller::Action;
use kube::runtime::finalizer::Error as FinalizerError;
use kube::runtime::watcher;
use kube::runtime::Controller;
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
    let workers: Api<Worker> = Api::all(client);

    Controller::new(workers, watcher::Config::default())
        .shutdown_on_signal()
        .run(reconcile, error_policy, ctx)
        .for_each(|res| async move {
            match res {
                Ok((object, _)) => info!("reconciled worker {}", cyan(object.name)),
                Err(err) => warn!("reconcile failed: {}", err),
            }
        })
        .await;
}

fn error_policy(_worker: Arc<Worker>, err: &FinalizerError<StringError>, _ctx: Arc<Context>) -> Action {
    warn!("worker reconcile error: {}", err);
    Action::requeue(Duration::from_secs(10))
}

async fn reconcile(worker: Arc<Worker>, ctx: Arc<Context>) -> Result<Action, FinalizerError<StringError>> {
    let ns = worker.namespace().unwrap_or_default();
    let api: Api<Worker> = Api::namespaced(ctx.client.clone(), &ns);

    finalizer::apply(
        &api,
        WORKER_FINALIZER,
        worker,
        |worker| {
            let ctx = ctx.clone();
            async move { apply(worker, ctx).await.map_err(StringError::from) }
        },
        |worker| {
            let ctx = ctx.clone();
            async move { cleanup(worker, ctx).await.map_err(StringError::from) }
        },
    )
    .await
}

async fn apply(worker: Arc<Worker>, ctx: Arc<Context>) -> FleetResult<Action> {
    let ns = worker.namespace().unwrap_or_default();
    let name = worker.name_any();
    let pods: Api<Pod> = Api::namespaced(ctx.client.clone(), &ns);
    let pools: Api<Pool> = Api::namespaced(ctx.client.clone(), &ns);
    let workers: Api<Worker> = Api::namespaced(ctx.client.clone(), &ns);

    let pool = pools.get(&worker.spec.pool).await.map_err(ApiError::from)?;
    let status = worker.status.clone().unwrap_or_default();
    let now = Utc::now();

    // A live allocation whose expiry has passed triggers self-deletion,
    // regardless of phase.
    if let Some(alloc) = worker.spec.allocation.as_ref() {
        if alloc.expires_at < now {
            info!("allocation on worker {} expired, deleting", cyan(&name));
            workers.delete(&name, &DeleteParams::default()).await.map_err(ApiError::from)?;
            return Ok(Action::await_change());
        }
    }

    let next = match status.phase {
        WorkerPhase::Pending => on_pending(&worker, &pool, &pods, &status, now).await?,
        WorkerPhase::Provisioning => on_provisioning(&worker, &pods, &status, now).await?,
        WorkerPhase::Idle | WorkerPhase::Allocated | WorkerPhase::Running => {
            on_ready(&worker, &pods, &status).await?
        }
        WorkerPhase::Failed => status,
        WorkerPhase::Terminating => status,
    };

    patch_status(&workers, &name, next.clone()).await?;

    let expires_at = worker.spec.allocation.as_ref().map(|a| a.expires_at);
    Ok(Action::requeue(next_requeue(now, expires_at)))
}

async fn on_pending(
    worker: &Worker,
    pool: &Pool,
    pods: &Api<Pod>,
    status: &WorkerStatus,
    now: chrono::DateTime<Utc>,
) -> FleetResult<WorkerStatus> {
    let created_at = status.created_at.unwrap_or(now);
    if now - created_at > STUCK_THRESHOLD {
        return Ok(WorkerStatus {
            phase: WorkerPhase::Failed,
            failure_message: Some("pod did not begin provisioning within 10 minutes".to_string()),
            ..status.clone()
        });
    }

    let pod = build_pod(worker, pool);
    let pod_name = pod.name_any();
    match pods.create(&Default::default(), &pod).await {
        Ok(_) => {}
        Err(kube::Error::Api(e)) if e.code == 409 => {}
        Err(source) => {
            return Ok(WorkerStatus {
                phase: WorkerPhase::Failed,
                failure_message: Some(format!("failed to create worker pod: {}", source)),
                ..status.clone()
            })
        }
    }

    Ok(WorkerStatus {
        phase: WorkerPhase::Provisioning,
        pod_name: Some(pod_name),
        created_at: Some(created_at),
        ..status.clone()
    })
}

async fn on_provisioning(
    worker: &Worker,
    pods: &Api<Pod>,
    status: &WorkerStatus,
    now: chrono::DateTime<Utc>,
) -> FleetResult<WorkerStatus> {
    let Some(pod_name) = status.pod_name.as_ref() else {
        return Ok(WorkerStatus {
            phase: WorkerPhase::Pending,
            ..status.clone()
        });
    };
    let created_at = status.created_at.unwrap_or(now);

    let pod = match pods.get(pod_name).await {
        Ok(pod) => pod,
        Err(kube::Error::Api(e)) if e.code == 404 => {
            return Ok(WorkerStatus {
                phase: WorkerPhase::Pending,
                pod_name: None,
                ..status.clone()
            })
        }
        Err(source) => return Err(ApiError::from(source).into()),
    };

    if pod.terminated() || pod.crashed() {
        return Ok(WorkerStatus {
            phase: WorkerPhase::Failed,
            failure_message: pod.terminated_message().or_else(|| pod.terminated_reason()),
            ..status.clone()
        });
    }

    if pod.unschedulable() && now - created_at > STUCK_THRESHOLD {
        return Ok(WorkerStatus {
            phase: WorkerPhase::Failed,
            failure_message: Some("pod is unschedulable".to_string()),
            ..status.clone()
        });
    }

    if now - created_at > STUCK_THRESHOLD {
        return Ok(WorkerStatus {
            phase: WorkerPhase::Failed,
            failure_message: Some("pod stuck provisioning for more than 10 minutes".to_string()),
            ..status.clone()
        });
    }

    if pod.running() {
        let pod_ip = pod.status.as_ref().and_then(|s| s.pod_ip.clone());
        let endpoint = pod_ip
            .as_ref()
            .map(|ip| format!("{}:{}", ip, k8s::BUILD_DAEMON_PORT));
        let phase = if worker.spec.allocation.is_some() {
            WorkerPhase::Allocated
        } else {
            WorkerPhase::Idle
        };
        return Ok(WorkerStatus {
            phase,
            pod_ip,
            endpoint,
            ready_at: Some(now),
            ..status.clone()
        });
    }

    Ok(status.clone())
}

async fn on_ready(worker: &Worker, pods: &Api<Pod>, status: &WorkerStatus) -> FleetResult<WorkerStatus> {
    let Some(pod_name) = status.pod_name.as_ref() else {
        return Ok(WorkerStatus {
            phase: WorkerPhase::Pending,
            ..status.clone()
        });
    };

    match pods.get(pod_name).await {
        Ok(_) => {
            let phase = if worker.spec.allocation.is_some() {
                WorkerPhase::Allocated
            } else {
                WorkerPhase::Idle
            };
            Ok(WorkerStatus { phase, ..status.clone() })
        }
        Err(kube::Error::Api(e)) if e.code == 404 => Ok(WorkerStatus {
            phase: WorkerPhase::Pending,
            pod_name: None,
            pod_ip: None,
            endpoint: None,
            ..status.clone()
        }),
        Err(source) => Err(ApiError::from(source).into()),
    }
}

async fn cleanup(worker: Arc<Worker>, ctx: Arc<Context>) -> FleetResult<Action> {
    let ns = worker.namespace().unwrap_or_default();
    let pods: Api<Pod> = Api::namespaced(ctx.client.clone(), &ns);
    if let Some(pod_name) = worker.status.as_ref().and_then(|s| s.pod_name.clone()) {
        match pods.delete(&pod_name, &DeleteParams::default()).await {
            Ok(_) => info!(
                "deleted pod {} for terminating worker {}",
                cyan(&pod_name),
                cyan(worker.name_any())
            ),
            Err(kube::Error::Api(e)) if e.code == 404 => {}
            Err(source) => return Err(ApiError::from(source).into()),
        }
    }
    Ok(Action::await_change())
}

async fn patch_status(api: &Api<Worker>, name: &str, status: WorkerStatus) -> FleetResult<()> {
    let patch = serde_json::json!({ "status": status });
    api.patch_status(name, &PatchParams::default(), &Patch::Merge(&patch))
        .await
        .map_err(ApiError::from)?;
    Ok(())
}
