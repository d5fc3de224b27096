mod podspec;
mod reconcile;
mod requeue;

use k8s::leader::LeaseLock;
use k8s_openapi::api::coordination::v1::Lease;
use kube::api::Api;
use log::info;
use term_colors::*;

const LEASE_NAME: &str = "worker-controller-leader";

#[tokio::main]
async fn main() {
    std::env::set_var("RUST_LOG_STYLE", "always");
    env_logger::init();

    let client = kube::Client::try_default()
        .await
        .expect("a kubeconfig or in-cluster service account to be available");

    let identity = names::uuid();
    let leases: Api<Lease> = Api::namespaced(client.clone(), &k8s::controller_namespace());
    let lock = LeaseLock::new(leases, LEASE_NAME, identity.clone());

    info!("{} as {}, waiting for leadership", bold("worker-controller starting"), cyan(&identity));
    lock.acquire().await;

    let renewal = {
        let lock_client = client.clone();
        let leases: Api<Lease> = Api::namespaced(lock_client, &k8s::controller_namespace());
        let lock = LeaseLock::new(leases, LEASE_NAME, identity);
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(std::time::Duration::from_secs(5));
            loop {
                ticker.tick().await;
                if let Err(err) = lock.renew().await {
                    log::warn!("failed to renew leadership lease: {}", err);
                }
            }
        })
    };

    reconcile::run(client).await;
    renewal.abort();
}
