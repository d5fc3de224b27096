//! Builds the single-container pod each Worker is backed by.

use k8s::resource_names;
use k8s::{owner::owned_meta, Pool, Worker, BUILD_DAEMON_PORT};
use k8s_openapi::api::core::v1::{
    Container, ContainerPort, Pod, PodSpec, ResourceRequirements, SecretVolumeSource, Volume,
    VolumeMount,
};
use k8s_openapi::apimachinery::pkg::api::resource::Quantity;
use kube::ResourceExt;
use std::collections::BTreeMap;

const CONFIG_VOLUME: &str = "build-daemon-config";
const TLS_VOLUME: &str = "worker-tls";
const CONFIG_MOUNT_PATH: &str = "/etc/buildkit-fleet/config";
const TLS_MOUNT_PATH: &str = "/etc/buildkit-fleet/tls";

pub fn build_pod(worker: &Worker, pool: &Pool) -> Pod {
    let name = resource_names::worker_pod(&worker.name_any());
    let mut meta = owned_meta(worker, name);
    let mut labels = BTreeMap::new();
    labels.insert(k8s::POOL_LABEL.to_string(), pool.name_any());
    meta.labels = Some(labels);

    let mut resources = ResourceRequirements::default();
    let mut requests = BTreeMap::new();
    if let Some(cpu) = pool.spec.worker_resources.cpu.as_ref() {
        requests.insert("cpu".to_string(), Quantity(cpu.clone()));
    }
    if let Some(memory) = pool.spec.worker_resources.memory.as_ref() {
        requests.insert("memory".to_string(), Quantity(memory.clone()));
    }
    if !requests.is_empty() {
        resources.requests = Some(requests);
    }

    Pod {
        metadata: meta,
        spec: Some(PodSpec {
            restart_policy: Some("Never".to_string()),
            containers: vec![Container {
                name: "build-daemon".to_string(),
                image: Some(pool.spec.build_daemon_image.clone()),
                ports: Some(vec![ContainerPort {
                    container_port: BUILD_DAEMON_PORT,
                    name: Some("build".to_string()),
                    ..Default::default()
                }]),
                resources: Some(resources),
                volume_mounts: Some(vec![
                    VolumeMount {
                        name: CONFIG_VOLUME.to_string(),
                        mount_path: CONFIG_MOUNT_PATH.to_string(),
                        read_only: Some(true),
                        ..Default::default()
                    },
                    VolumeMount {
                        name: TLS_VOLUME.to_string(),
                        mount_path: TLS_MOUNT_PATH.to_string(),
                        read_only: Some(true),
                        ..Default::default()
                    },
                ]),
                ..Default::default()
            }],
            volumes: Some(vec![
                Volume {
                    name: CONFIG_VOLUME.to_string(),
                    config_map: Some(k8s_openapi::api::core::v1::ConfigMapVolumeSource {
                        name: resource_names::config_map(&pool.name_any()),
                        ..Default::default()
                    }),
                    ..Default::default()
                },
                Volume {
                    name: TLS_VOLUME.to_string(),
                    secret: Some(SecretVolumeSource {
                        secret_name: Some(resource_names::worker_secret(&pool.name_any())),
                        ..Default::default()
                    }),
                    ..Default::default()
                },
            ]),
            ..Default::default()
        }),
        ..Default::default()
    }
}
