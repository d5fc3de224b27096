extern crate jemallocator;

// The use of jemalloc (http://jemalloc.net/) as the global allocator is actually QUITE
// important here. The glibc standard allocator cannot handle concurrency nearly as well,
// especially with regard to heap fragmentation.
//
// The Gateway holds one TLS stream pair open per in-flight build for as long as the build
// runs, so its connection count spikes and drains in bursts the same way the orchestrator's
// pod-lifecycle connectors used to. jemalloc idles back down after a burst far better than
// glibc does.
#[global_allocator]
static ALLOC: jemallocator::Jemalloc = jemallocator::Jemalloc;

mod config;
mod lookup;
mod metrics;
mod proxy;
mod token;
mod tls;

use config::Config;
use lookup::LookupClient;
use metrics::Metrics;
use proxy::ProxyContext;
use prometheus_client::registry::Registry;
use std::sync::Arc;
use tokio::sync::watch;

#[macro_use]
extern crate rocket;

struct MetricsState {
    registry: Registry,
}

#[get("/metrics")]
fn metrics_endpoint(state: &rocket::State<MetricsState>) -> String {
    metrics::encode_text(&state.registry)
}

#[get("/healthz")]
fn healthz() -> &'static str {
    "ok"
}

#[tokio::main]
async fn main() {
    std::env::set_var("RUST_LOG_STYLE", "always");
    env_logger::init();

    let config = Config::from_env();

    let mut registry = Registry::default();
    let metrics = Arc::new(Metrics::new(&mut registry));

    let (ca_pem, server_cert_pem, server_key_pem) = identity::secret::read_tls_bundle(
        &config.cluster_ca_namespace,
        &k8s::resource_names::server_secret(&config.pool_name),
    )
    .await
    .expect("this pool's server TLS secret to exist by the time the Gateway starts");

    let (_, worker_cert_pem, worker_key_pem) = identity::secret::read_tls_bundle(
        &config.cluster_ca_namespace,
        &k8s::resource_names::worker_secret(&config.pool_name),
    )
    .await
    .expect("this pool's worker TLS secret to exist by the time the Gateway starts");

    let ca_roots = tls::root_store(&ca_pem).expect("the cluster CA to be a valid trust root");

    let inbound = tls::TlsBundle {
        ca_pem: ca_pem.clone(),
        cert_pem: server_cert_pem,
        key_pem: server_key_pem,
    };
    let outbound = tls::TlsBundle {
        ca_pem,
        cert_pem: worker_cert_pem,
        key_pem: worker_key_pem,
    };

    let server_config = tls::server_config(&inbound, &ca_roots).expect("the inbound TLS config to build");
    let client_config = tls::client_config(&outbound, &ca_roots).expect("the outbound TLS config to build");

    let proxy_ctx = Arc::new(ProxyContext {
        acceptor: tokio_rustls::TlsAcceptor::from(server_config),
        client_config,
        lookup: LookupClient::new(config.allocation_api_url.clone()),
        metrics: metrics.clone(),
    });

    let (shutdown_tx, shutdown_rx) = watch::channel(false);

    let metrics_server = tokio::spawn(serve_metrics(config.metrics_addr.clone(), registry));

    let proxy_listen_addr = config.listen_addr.clone();
    let proxy_task = tokio::spawn(async move {
        if let Err(err) = proxy::serve(&proxy_listen_addr, proxy_ctx, shutdown_rx).await {
            log::error!("gateway accept loop exited with an error: {err}");
        }
    });

    tokio::signal::ctrl_c().await.expect("the process to be able to install a SIGINT handler");
    log::info!("gateway received shutdown signal, draining connections");
    let _ = shutdown_tx.send(true);

    let _ = proxy_task.await;
    metrics_server.abort();
}

async fn serve_metrics(addr: String, registry: Registry) {
    let state = MetricsState { registry };
    let config = rocket::Config {
        address: addr.split(':').next().unwrap().parse().expect("a valid metrics listen address"),
        port: addr.rsplit(':').next().unwrap().parse().expect("a valid metrics listen port"),
        ..rocket::Config::default()
    };
    let outcome = rocket::custom(config)
        .manage(state)
        .mount("/", routes![metrics_endpoint, healthz])
        .ignite()
        .await
        .expect("rocket to ignite")
        .launch()
        .await;
    if let Err(err) = outcome {
        log::error!("metrics server exited with an error: {err}");
    }
}
