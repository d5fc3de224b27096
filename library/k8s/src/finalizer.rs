//! Thin convenience wrapper around [`kube::runtime::finalizer`], scoped to the
//! single finalizer name this workspace uses ([`crate::crd::WORKER_FINALIZER`]).

use futures::future;
use kube::api::Api;
use kube::runtime::finalizer::{self, Event};
use kube::Resource;
use serde::de::DeserializeOwned;
use std::fmt::Debug;
use std::sync::Arc;

/// Runs `cleanup` only on the finalizer-driven deletion event, and `reconcile`
/// otherwise, adding/removing the named finalizer around the object exactly
/// as `kube::runtime::finalizer` already does. Kept as a one-line seam so
/// every controller in this workspace names its finalizer the same way.
pub async fn apply<K, ReconcileFut, CleanupFut, Err>(
    api: &Api<K>,
    finalizer_name: &str,
    obj: Arc<K>,
    reconcile: impl FnOnce(Arc<K>) -> ReconcileFut,
    cleanup: impl FnOnce(Arc<K>) -> CleanupFut,
) -> Result<kube::runtime::controller::Action, finalizer::Error<Err>>
where
    K: Resource + Clone + DeserializeOwned + Debug + Send + Sync + 'static,
    K::DynamicType: Default,
    ReconcileFut: future::Future<Output = Result<kube::runtime::controller::Action, Err>>,
    CleanupFut: future::Future<Output = Result<kube::runtime::controller::Action, Err>>,
    Err: std::error::Error + 'static,
{
    finalizer::finalizer(api, finalizer_name, obj, |event| async {
        match event {
            Event::Apply(obj) => reconcile(obj).await,
            Event::Cleanup(obj) => cleanup(obj).await,
        }
    })
    .await
}
