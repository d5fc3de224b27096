//! Gateway manager (§4.6 step 4): computes the desired Gateway Deployment and
//! Service (exposure kind taken from the Pool spec) and writes them
//! idempotently. Cleans up whichever exposure kind is *not* currently
//! selected, since a Pool can switch `ClusterIp`/`NodePort`/`LoadBalancer`
//! across reconciles and the previous Service type should not linger.

use k8s::owner::owned_meta;
use k8s::resource_names;
use k8s::{Pool, ServiceExposure, POOL_LABEL};
use k8s_openapi::api::apps::v1::{Deployment, DeploymentSpec};
use k8s_openapi::api::core::v1::{
    ConfigMapVolumeSource, Container, ContainerPort, PodSpec, PodTemplateSpec, SecretVolumeSource,
    Service, ServicePort, ServiceSpec, Volume, VolumeMount,
};
use k8s_openapi::apimachinery::pkg::apis::meta::v1::LabelSelector;
use kube::api::{Api, ListParams, Patch, PatchParams};
use kube::ResourceExt;
use log::info;
use result::Result as FleetResult;
use std::collections::BTreeMap;
use term_colors::*;

const CONFIG_VOLUME: &str = "gateway-config";
const TLS_VOLUME: &str = "gateway-tls";
const CONFIG_MOUNT_PATH: &str = "/etc/buildkit-fleet/config";
const TLS_MOUNT_PATH: &str = "/etc/buildkit-fleet/tls";

pub struct GatewayOutcome {
    pub ready: bool,
}

pub async fn reconcile(client: &kube::Client, pool: &Pool) -> FleetResult<GatewayOutcome> {
    let namespace = pool.namespace().unwrap_or_default();
    let pool_name = pool.name_any();
    let deployments: Api<Deployment> = Api::namespaced(client.clone(), &namespace);
    let services: Api<Service> = Api::namespaced(client.clone(), &namespace);

    if !pool.spec.gateway.enabled {
        cleanup_all(&deployments, &services, &pool_name).await?;
        return Ok(GatewayOutcome { ready: false });
    }

    let deployment_name = resource_names::gateway_deployment(&pool_name);
    let deployment = build_deployment(pool);
    deployments
        .patch(
            &deployment_name,
            &PatchParams::apply("fleet-controller-gateway").force(),
            &Patch::Apply(&deployment),
        )
        .await
        .map_err(k8s::errors::ApiError::from)?;

    let service_name = resource_names::gateway_service(&pool_name);
    let service = build_service(pool);
    services
        .patch(
            &service_name,
            &PatchParams::apply("fleet-controller-gateway").force(),
            &Patch::Apply(&service),
        )
        .await
        .map_err(k8s::errors::ApiError::from)?;

    let ready = deployments
        .get(&deployment_name)
        .await
        .map_err(k8s::errors::ApiError::from)?
        .status
        .and_then(|s| s.ready_replicas)
        .unwrap_or(0)
        > 0;

    Ok(GatewayOutcome { ready })
}

async fn cleanup_all(deployments: &Api<Deployment>, services: &Api<Service>, pool_name: &str) -> FleetResult<()> {
    let name = resource_names::gateway_deployment(pool_name);
    if deployments.get(&name).await.is_ok() {
        info!("gateway disabled for pool {}, deleting deployment", cyan(pool_name));
        deployments.delete(&name, &Default::default()).await.map_err(k8s::errors::ApiError::from)?;
    }
    let name = resource_names::gateway_service(pool_name);
    if services.get(&name).await.is_ok() {
        services.delete(&name, &Default::default()).await.map_err(k8s::errors::ApiError::from)?;
    }
    Ok(())
}

fn build_deployment(pool: &Pool) -> Deployment {
    let pool_name = pool.name_any();
    let name = resource_names::gateway_deployment(&pool_name);
    let mut meta = owned_meta(pool, name);
    let mut labels = BTreeMap::new();
    labels.insert(POOL_LABEL.to_string(), pool_name.clone());
    labels.insert("app".to_string(), "buildkit-fleet-gateway".to_string());
    meta.labels = Some(labels.clone());

    let selector = LabelSelector {
        match_labels: Some(labels.clone()),
        ..Default::default()
    };

    Deployment {
        metadata: meta,
        spec: Some(DeploymentSpec {
            replicas: Some(pool.spec.gateway.replicas as i32),
            selector,
            template: PodTemplateSpec {
                metadata: Some(kube::api::ObjectMeta {
                    labels: Some(labels),
                    ..Default::default()
                }),
                spec: Some(PodSpec {
                    containers: vec![Container {
                        name: "gateway".to_string(),
                        image: Some(gateway_image()),
                        ports: Some(vec![ContainerPort {
                            container_port: pool.spec.gateway.port as i32,
                            name: Some("tls".to_string()),
                            ..Default::default()
                        }]),
                        env: Some(vec![
                            k8s_openapi::api::core::v1::EnvVar {
                                name: "POOL_NAMESPACE".to_string(),
                                value: pool.namespace(),
                                ..Default::default()
                            },
                            k8s_openapi::api::core::v1::EnvVar {
                                name: "POOL_NAME".to_string(),
                                value: Some(pool_name.clone()),
                                ..Default::default()
                            },
                        ]),
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
                            config_map: Some(ConfigMapVolumeSource {
                                name: resource_names::config_map(&pool_name),
                                ..Default::default()
                            }),
                            ..Default::default()
                        },
                        Volume {
                            name: TLS_VOLUME.to_string(),
                            secret: Some(SecretVolumeSource {
                                secret_name: Some(resource_names::server_secret(&pool_name)),
                                ..Default::default()
                            }),
                            ..Default::default()
                        },
                    ]),
                    ..Default::default()
                }),
            },
            ..Default::default()
        }),
        status: None,
    }
}

fn build_service(pool: &Pool) -> Service {
    let pool_name = pool.name_any();
    let name = resource_names::gateway_service(&pool_name);
    let mut meta = owned_meta(pool, name);
    let mut selector = BTreeMap::new();
    selector.insert(POOL_LABEL.to_string(), pool_name.clone());
    selector.insert("app".to_string(), "buildkit-fleet-gateway".to_string());
    meta.labels = Some(selector.clone());

    let type_ = match pool.spec.gateway.exposure {
        ServiceExposure::ClusterIp => "ClusterIP",
        ServiceExposure::NodePort => "NodePort",
        ServiceExposure::LoadBalancer => "LoadBalancer",
    };

    Service {
        metadata: meta,
        spec: Some(ServiceSpec {
            type_: Some(type_.to_string()),
            selector: Some(selector),
            ports: Some(vec![ServicePort {
                port: pool.spec.gateway.port as i32,
                target_port: Some(k8s_openapi::apimachinery::pkg::util::intstr::IntOrString::Int(
                    pool.spec.gateway.port as i32,
                )),
                name: Some("tls".to_string()),
                ..Default::default()
            }]),
            ..Default::default()
        }),
        status: None,
    }
}

fn gateway_image() -> String {
    std::env::var("GATEWAY_IMAGE").unwrap_or_else(|_| "buildkit-fleet/gateway:latest".to_string())
}
