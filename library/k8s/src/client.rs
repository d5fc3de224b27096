use kube::api::ObjectMeta;
use kube::core::Resource;
use kube::Api;

use crate::errors::ApiError;

/// Returns a namespaced `Api<K>` built from the in-cluster (or kubeconfig,
/// out-of-cluster) configuration.
///
/// This function panics if there is any error encountered while constructing
/// the required configuration object from the environment. A missing or
/// unreachable orchestrator is treated as a catastrophic startup failure —
/// there is no sensible degraded mode to fall back to.
pub async fn new<K>(namespace: &str) -> Api<K>
where
    <K as Resource>::DynamicType: Default,
    K: k8s_openapi::Metadata<Ty = ObjectMeta>,
{
    Api::namespaced(default_client().await, namespace)
}

/// Returns a cluster-scoped `Api<K>`, for resources such as `IdentityConfig`
/// that are not namespaced.
pub async fn new_cluster_scoped<K>() -> Api<K>
where
    <K as Resource>::DynamicType: Default,
    K: k8s_openapi::Metadata<Ty = ObjectMeta>,
{
    Api::all(default_client().await)
}

pub async fn default_client() -> kube::Client {
    kube::Client::try_default()
        .await
        .map_err(ApiError::from)
        .expect("could not build a client from the ambient orchestrator configuration")
}
