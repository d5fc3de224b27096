//! Status manager (§4.6 step 6): recomputes every observed-state field and
//! writes the status sub-resource only when it actually changed, so
//! unrelated reconciles (e.g. a no-op TLS check) don't generate update
//! storms against the orchestrator's watch machinery.

use crate::gatewaymgr::GatewayOutcome;
use crate::tls::TlsOutcome;
use crate::workers::WorkerOutcome;
use chrono::Utc;
use k8s::resource_names;
use k8s::{Condition, Pool, PoolPhase, PoolStatus, WorkerCounts};
use kube::api::{Api, Patch, PatchParams};
use kube::ResourceExt;
use result::Result as FleetResult;

pub async fn reconcile(
    client: &kube::Client,
    pool: &Pool,
    tls: &TlsOutcome,
    gateway: &GatewayOutcome,
    workers: &WorkerOutcome,
) -> FleetResult<()> {
    let next = compute(pool, tls, gateway, workers, None);
    write_if_changed(client, pool, next).await
}

/// Used by the reconcile driver when a permanent data fault (malformed CA
/// secret, invalid cron expression) short-circuits the rest of the loop:
/// every other manager is skipped, but the Pool must still flip to `Failed`
/// with a human-readable reason, per §7.
pub async fn mark_failed(client: &kube::Client, pool: &Pool, reason: &str, message: &str) -> FleetResult<()> {
    let mut status = pool.status.clone().unwrap_or_default();
    status.phase = PoolPhase::Failed;
    status.observed_generation = pool.metadata.generation.unwrap_or(0);
    upsert_condition(&mut status.conditions, "Ready", "False", reason, message, status.observed_generation);
    write_if_changed(client, pool, status).await
}

fn compute(
    pool: &Pool,
    tls: &TlsOutcome,
    gateway: &GatewayOutcome,
    workers: &WorkerOutcome,
    previous_phase_override: Option<PoolPhase>,
) -> PoolStatus {
    let mut status = pool.status.clone().unwrap_or_default();
    let observed_generation = pool.metadata.generation.unwrap_or(0);

    status.gateway_ready = gateway.ready;
    status.workers = WorkerCounts {
        total: workers.total,
        ready: workers.ready,
        idle: workers.idle,
        allocated: workers.allocated,
        provisioning: workers.provisioning,
        failed: workers.failed,
        desired: workers.desired,
        needed: workers.needed,
    };
    status.server_cert_not_before = Some(tls.server_cert_not_before);
    status.server_cert_not_after = Some(tls.server_cert_not_after);
    status.observed_generation = observed_generation;

    status.phase = previous_phase_override.unwrap_or_else(|| {
        if !pool.spec.gateway.enabled || workers.desired == 0 {
            PoolPhase::ScaledToZero
        } else if gateway.ready {
            PoolPhase::Running
        } else {
            PoolPhase::Pending
        }
    });

    // §3.6 invariant 5: Ready iff the Gateway has at least one ready replica.
    // A Pool with the gateway disabled by spec is never "not ready" for a
    // resource it was never asked to provide.
    let ready = if pool.spec.gateway.enabled { gateway.ready } else { true };
    let (ready_status, reason, message) = if ready {
        ("True", "GatewayReady", "gateway has at least one ready replica".to_string())
    } else {
        ("False", "GatewayNotReady", "gateway has no ready replicas yet".to_string())
    };
    upsert_condition(&mut status.conditions, "Ready", ready_status, reason, &message, observed_generation);

    if pool.spec.gateway.enabled {
        status.endpoint = Some(format!(
            "{}.{}.svc.cluster.local:{}",
            resource_names::gateway_service(&pool.name_any()),
            pool.namespace().unwrap_or_default(),
            pool.spec.gateway.port,
        ));
    } else {
        status.endpoint = None;
    }

    status
}

fn upsert_condition(
    conditions: &mut Vec<Condition>,
    type_: &str,
    status: &str,
    reason: &str,
    message: &str,
    observed_generation: i64,
) {
    let now = Utc::now();
    if let Some(existing) = conditions.iter_mut().find(|c| c.type_ == type_) {
        if existing.status != status {
            existing.last_transition_time = now;
        }
        existing.status = status.to_string();
        existing.reason = reason.to_string();
        existing.message = message.to_string();
        existing.observed_generation = observed_generation;
    } else {
        conditions.push(Condition {
            type_: type_.to_string(),
            status: status.to_string(),
            reason: reason.to_string(),
            message: message.to_string(),
            observed_generation,
            last_transition_time: now,
        });
    }
}

async fn write_if_changed(client: &kube::Client, pool: &Pool, next: PoolStatus) -> FleetResult<()> {
    let current = pool.status.clone().unwrap_or_default();
    if current == next {
        return Ok(());
    }
    let namespace = pool.namespace().unwrap_or_default();
    let api: Api<Pool> = Api::namespaced(client.clone(), &namespace);
    let patch = serde_json::json!({ "status": next });
    api.patch_status(&pool.name_any(), &PatchParams::default(), &Patch::Merge(&patch))
        .await
        .map_err(k8s::errors::ApiError::from)?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use k8s::{GatewaySettings, PoolSpec, ScalingPolicy, TlsPolicy, WorkerResources};

    fn pool() -> Pool {
        Pool::new(
            "builders",
            PoolSpec {
                scaling: ScalingPolicy { min: 1, max: 3, ..Default::default() },
                worker_resources: WorkerResources::default(),
                build_daemon_image: "example/buildkit:latest".to_string(),
                tls: TlsPolicy::default(),
                auth_methods: vec![],
                policy: vec![],
                gateway: GatewaySettings::default(),
            },
        )
    }

    #[test]
    fn ready_condition_reflects_gateway_state() {
        let tls = TlsOutcome { server_cert_not_before: Utc::now(), server_cert_not_after: Utc::now() };
        let workers = WorkerOutcome {
            total: 1, ready: 1, idle: 1, allocated: 0, provisioning: 0, failed: 0, desired: 1, needed: 0,
        };
        let not_ready = compute(&pool(), &tls, &GatewayOutcome { ready: false }, &workers, None);
        assert_eq!(not_ready.conditions[0].status, "False");

        let ready = compute(&pool(), &tls, &GatewayOutcome { ready: true }, &workers, None);
        assert_eq!(ready.conditions[0].status, "True");
        assert_eq!(ready.phase, PoolPhase::Running);
    }

    #[test]
    fn zero_desired_workers_parks_pool_as_scaled_to_zero() {
        let tls = TlsOutcome { server_cert_not_before: Utc::now(), server_cert_not_after: Utc::now() };
        let workers = WorkerOutcome {
            total: 0, ready: 0, idle: 0, allocated: 0, provisioning: 0, failed: 0, desired: 0, needed: 0,
        };
        let status = compute(&pool(), &tls, &GatewayOutcome { ready: true }, &workers, None);
        assert_eq!(status.phase, PoolPhase::ScaledToZero);
    }
}
