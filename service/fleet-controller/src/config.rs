//! Config manager (§4.6 step 3): renders the build daemon's configuration
//! file into a config map owned by the Pool. The build daemon binary is a
//! black-box TCP server (§1 Out of scope) — this manager only needs to hand
//! it the handful of values it cannot infer about its own pod: the port it
//! should bind, and how many peers it may serve concurrently.

use k8s::owner::owned_meta;
use k8s::resource_names;
use k8s::{Pool, BUILD_DAEMON_PORT};
use k8s_openapi::api::core::v1::ConfigMap;
use kube::api::{Api, Patch, PatchParams};
use kube::ResourceExt;
use result::Result as FleetResult;
use std::collections::BTreeMap;

const CONFIG_FILE_KEY: &str = "build-daemon.yaml";

pub async fn reconcile(client: &kube::Client, pool: &Pool) -> FleetResult<()> {
    let namespace = pool.namespace().unwrap_or_default();
    let name = resource_names::config_map(&pool.name_any());
    let api: Api<ConfigMap> = Api::namespaced(client.clone(), &namespace);

    let rendered = render(pool);
    let mut data = BTreeMap::new();
    data.insert(CONFIG_FILE_KEY.to_string(), rendered);

    let config_map = ConfigMap {
        metadata: owned_meta(pool, name.clone()),
        data: Some(data),
        ..Default::default()
    };

    api.patch(
        &name,
        &PatchParams::apply("fleet-controller-config").force(),
        &Patch::Apply(&config_map),
    )
    .await
    .map_err(k8s::errors::ApiError::from)?;

    Ok(())
}

fn render(pool: &Pool) -> String {
    #[derive(serde::Serialize)]
    struct BuildDaemonConfig {
        listen_port: i32,
        pool: String,
        max_concurrent_builds: u32,
    }

    let rendered = BuildDaemonConfig {
        listen_port: BUILD_DAEMON_PORT,
        pool: pool.name_any(),
        // The build daemon serves exactly one job at a time per §3.2's
        // "bound to at most one job at a time" invariant.
        max_concurrent_builds: 1,
    };
    serde_yaml::to_string(&rendered).expect("a plain struct of scalars always serializes")
}

#[cfg(test)]
mod tests {
    use super::*;
    use k8s::{GatewaySettings, PoolSpec, ScalingPolicy, TlsPolicy, WorkerResources};

    fn pool() -> Pool {
        Pool::new(
            "builders",
            PoolSpec {
                scaling: ScalingPolicy::default(),
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
    fn renders_the_build_port_and_pool_name() {
        let rendered = render(&pool());
        assert!(rendered.contains("builders"));
        assert!(rendered.contains(&BUILD_DAEMON_PORT.to_string()));
    }
}
