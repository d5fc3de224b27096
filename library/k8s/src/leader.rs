//! A hand-rolled leader election primitive built on the orchestrator's
//! `coordination.k8s.io/v1` Lease resource, grounded on the same
//! acquire/renew/release vocabulary standard controller runtimes use.
//!
//! Only the leader runs a reconcile loop's write path; followers keep their
//! watches and caches warm (so there is no cold start on failover) but skip
//! every mutating step, matching the concurrency model's leader-elected
//! process guidance.

use chrono::Utc;
use k8s_openapi::api::coordination::v1::{Lease, LeaseSpec};
use kube::api::{Api, Patch, PatchParams, PostParams};
use log::{debug, info, warn};
use std::time::Duration;
use tokio::time::sleep;

pub struct LeaseLock {
    api: Api<Lease>,
    name: String,
    identity: String,
    lease_duration: Duration,
}

impl LeaseLock {
    pub fn new(api: Api<Lease>, name: impl Into<String>, identity: impl Into<String>) -> Self {
        LeaseLock {
            api,
            name: name.into(),
            identity: identity.into(),
            lease_duration: Duration::from_secs(15),
        }
    }

    /// Blocks, polling every `lease_duration / 3`, until this process holds
    /// the lease (or successfully creates it). Returns once leadership is
    /// acquired; the caller is responsible for calling [`Self::renew`]
    /// periodically afterwards and [`Self::release`] on shutdown.
    pub async fn acquire(&self) {
        let poll = self.lease_duration / 3;
        loop {
            match self.try_acquire_or_renew().await {
                Ok(true) => {
                    info!("acquired leadership as {}", self.identity);
                    return;
                }
                Ok(false) => debug!("lease {} held by another identity", self.name),
                Err(err) => warn!("error contacting orchestrator for lease {}: {}", self.name, err),
            }
            sleep(poll).await;
        }
    }

    /// Attempts to either create the lease (first leader ever) or, if it
    /// already exists and we are the current holder, renew its timestamp. If
    /// held by someone else and not yet expired, returns `Ok(false)`. If
    /// expired, steals it.
    pub async fn try_acquire_or_renew(&self) -> kube::Result<bool> {
        match self.api.get(&self.name).await {
            Ok(existing) => {
                let spec = existing.spec.unwrap_or_default();
                let holder = spec.holder_identity.unwrap_or_default();
                let expired = spec
                    .renew_time
                    .as_ref()
                    .map(|t| {
                        let age = Utc::now().signed_duration_since(t.0);
                        age.num_seconds() as u64 > self.lease_duration.as_secs() * 2
                    })
                    .unwrap_or(true);
                if holder == self.identity || expired {
                    self.write(existing.metadata.resource_version).await?;
                    Ok(true)
                } else {
                    Ok(false)
                }
            }
            Err(kube::Error::Api(err)) if err.code == 404 => {
                let lease = Lease {
                    metadata: kube::api::ObjectMeta {
                        name: Some(self.name.clone()),
                        ..Default::default()
                    },
                    spec: Some(self.new_spec()),
                };
                self.api.create(&PostParams::default(), &lease).await?;
                Ok(true)
            }
            Err(err) => Err(err),
        }
    }

    pub async fn renew(&self) -> kube::Result<()> {
        self.try_acquire_or_renew().await.map(|_| ())
    }

    /// Gives up the lease immediately, e.g. on graceful shutdown, so a
    /// follower need not wait out a full lease-duration timeout to take over.
    pub async fn release(&self) {
        let patch = serde_json::json!({
            "spec": { "holderIdentity": serde_json::Value::Null }
        });
        let _ = self
            .api
            .patch(
                &self.name,
                &PatchParams::default(),
                &Patch::Merge(&patch),
            )
            .await;
    }

    fn new_spec(&self) -> LeaseSpec {
        LeaseSpec {
            holder_identity: Some(self.identity.clone()),
            lease_duration_seconds: Some(self.lease_duration.as_secs() as i32),
            renew_time: Some(k8s_openapi::apimachinery::pkg::apis::meta::v1::MicroTime(
                Utc::now(),
            )),
            acquire_time: Some(k8s_openapi::apimachinery::pkg::apis::meta::v1::MicroTime(
                Utc::now(),
            )),
            lease_transitions: Some(0),
            ..Default::default()
        }
    }

    async fn write(&self, resource_version: Option<String>) -> kube::Result<()> {
        let mut lease = Lease {
            metadata: kube::api::ObjectMeta {
                name: Some(self.name.clone()),
                resource_version,
                ..Default::default()
            },
            spec: Some(self.new_spec()),
        };
        lease.spec.as_mut().unwrap().lease_transitions = None;
        self.api
            .patch(
                &self.name,
                &PatchParams::apply("fleet-leader-election"),
                &Patch::Apply(&lease),
            )
            .await?;
        Ok(())
    }
}
