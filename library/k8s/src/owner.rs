//! Owner-reference helpers so sub-resources (secrets, config maps,
//! deployments, services, workers) cascade-delete with their parent Pool.

use k8s_openapi::apimachinery::pkg::apis::meta::v1::OwnerReference;
use kube::api::ObjectMeta;
use kube::{Resource, ResourceExt};

/// Builds the single owner reference that should be attached to every
/// resource a controller creates on behalf of `owner`. `controller: true`
/// and `block_owner_deletion: true` mirror how the orchestrator's garbage
/// collector is expected to behave: the child is blocked from outliving
/// the parent.
pub fn owner_reference<K>(owner: &K) -> OwnerReference
where
    K: Resource<DynamicType = ()>,
{
    OwnerReference {
        api_version: K::api_version(&()).to_string(),
        kind: K::kind(&()).to_string(),
        name: owner.name_any(),
        uid: owner.uid().unwrap_or_default(),
        controller: Some(true),
        block_owner_deletion: Some(true),
    }
}

/// Convenience to stamp owner references and a namespace directly onto a
/// freshly built `ObjectMeta`.
pub fn owned_meta<K>(owner: &K, name: String) -> ObjectMeta
where
    K: Resource<DynamicType = ()>,
{
    ObjectMeta {
        name: Some(name),
        namespace: owner.namespace(),
        owner_references: Some(vec![owner_reference(owner)]),
        ..Default::default()
    }
}
