//! Worker manager (§4.6 step 5 / §4.7): lists this Pool's Workers,
//! categorizes them, deletes failed/stuck ones, tops up toward `desired`,
//! and prunes excess idle workers (oldest first) once they have sat idle
//! longer than the scale-down delay — or immediately, regardless of `min`,
//! when the Pool's cron schedule forces `desired` to zero.

use chrono::{Duration as ChronoDuration, Utc};
use k8s::{Allocation, Pool, Worker, WorkerPhase, WorkerSpec, POOL_LABEL};
use kube::api::{Api, ListParams, PostParams};
use kube::ResourceExt;
use log::info;
use result::Result as FleetResult;
use std::collections::BTreeMap;
use term_colors::*;

pub struct WorkerOutcome {
    pub total: u32,
    pub ready: u32,
    pub idle: u32,
    pub allocated: u32,
    pub provisioning: u32,
    pub failed: u32,
    pub desired: u32,
    pub needed: u32,
}

pub async fn reconcile(client: &kube::Client, pool: &Pool) -> FleetResult<WorkerOutcome> {
    let namespace = pool.namespace().unwrap_or_default();
    let pool_name = pool.name_any();
    let workers: Api<Worker> = Api::namespaced(client.clone(), &namespace);
    let lp = ListParams::default().labels(&format!("{}={}", POOL_LABEL, pool_name));
    let list = workers.list(&lp).await.map_err(k8s::errors::ApiError::from)?;

    let now = Utc::now();
    let stuck_threshold = crate::requeue::STUCK_THRESHOLD;

    let mut ready = 0u32;
    let mut idle_count = 0u32;
    let mut allocated = 0u32;
    let mut provisioning = 0u32;
    let mut failed_names = Vec::new();
    let mut stuck_names = Vec::new();
    let mut idle_candidates: Vec<(String, chrono::DateTime<Utc>)> = Vec::new();

    for worker in &list.items {
        let name = worker.name_any();
        let status = worker.status.clone().unwrap_or_default();
        match status.phase {
            WorkerPhase::Failed => failed_names.push(name),
            WorkerPhase::Provisioning => {
                let created_at = status.created_at.unwrap_or(now);
                if now - created_at > stuck_threshold {
                    stuck_names.push(name);
                } else {
                    provisioning += 1;
                }
            }
            WorkerPhase::Pending => provisioning += 1,
            WorkerPhase::Idle => {
                ready += 1;
                idle_count += 1;
                let idle_since = status.last_activity.or(status.ready_at).unwrap_or(now);
                idle_candidates.push((name, idle_since));
            }
            WorkerPhase::Allocated => {
                ready += 1;
                allocated += 1;
            }
            WorkerPhase::Running => ready += 1,
            WorkerPhase::Terminating => {}
        }
    }

    for name in &failed_names {
        info!("worker manager deleting failed worker {}", cyan(name));
        let _ = workers.delete(name, &Default::default()).await;
    }
    for name in &stuck_names {
        info!("worker manager deleting stuck worker {}", cyan(name));
        let _ = workers.delete(name, &Default::default()).await;
    }

    let desired = scheduler::desired(pool.spec.scaling.min, pool.spec.scaling.max, allocated);
    let cron_forces_zero = match pool.spec.scaling.scale_to_zero_cron.as_deref() {
        Some(expr) if !expr.is_empty() => scheduler::cron_forces_zero(expr, now)?,
        _ => false,
    };
    let effective_desired = if cron_forces_zero { 0 } else { desired };
    let needed = scheduler::needed(effective_desired, ready, provisioning);

    for _ in 0..needed {
        create_worker(&workers, pool).await?;
    }

    let target_idle = effective_desired.saturating_sub(allocated + provisioning);
    let excess_idle = idle_count.saturating_sub(target_idle);
    if excess_idle > 0 {
        let delay = ChronoDuration::seconds(pool.spec.scaling.scale_down_delay_secs as i64);
        let eligible: Vec<(&str, chrono::DateTime<Utc>)> = idle_candidates
            .iter()
            .filter(|(_, since)| cron_forces_zero || now - *since >= delay)
            .map(|(name, since)| (name.as_str(), *since))
            .collect();
        let victims = scheduler::select_scale_down_victims(eligible, excess_idle as usize);
        for victim in victims {
            info!("worker manager scaling down idle worker {}", cyan(victim));
            let _ = workers.delete(victim, &Default::default()).await;
        }
    }

    Ok(WorkerOutcome {
        total: list.items.len() as u32,
        ready,
        idle: idle_count,
        allocated,
        provisioning,
        failed: failed_names.len() as u32,
        desired: effective_desired,
        needed,
    })
}

async fn create_worker(workers: &Api<Worker>, pool: &Pool) -> FleetResult<()> {
    let mut labels = BTreeMap::new();
    labels.insert(POOL_LABEL.to_string(), pool.name_any());
    let worker = Worker {
        metadata: kube::api::ObjectMeta {
            generate_name: Some(format!("{}-", pool.name_any())),
            namespace: pool.namespace(),
            owner_references: Some(vec![k8s::owner::owner_reference(pool)]),
            labels: Some(labels),
            ..Default::default()
        },
        spec: WorkerSpec {
            pool: pool.name_any(),
            allocation: None::<Allocation>,
        },
        status: None,
    };
    workers.create(&PostParams::default(), &worker).await.map_err(k8s::errors::ApiError::from)?;
    Ok(())
}
