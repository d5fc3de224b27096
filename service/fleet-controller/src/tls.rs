//! TLS manager (§4.6 step 2 / §4.1): reissues the fleet's server keypair
//! (terminated by the Gateway) and worker-side keypair (the shared identity
//! used for Gateway↔Worker mTLS) whenever `should-rotate` says so, or
//! unconditionally when a secret is missing outright.

use chrono::{DateTime, Duration as ChronoDuration, Utc};
use identity::{secret, CertRequest};
use k8s::resource_names;
use k8s::Pool;
use kube::ResourceExt;
use log::info;
use result::Result as FleetResult;
use term_colors::*;

/// What survives a TLS manager pass, folded into `PoolStatus` by the status
/// manager. The window reported is always the server cert's, per §3.1's
/// "server certificate validity window" status field.
pub struct TlsOutcome {
    pub server_cert_not_before: DateTime<Utc>,
    pub server_cert_not_after: DateTime<Utc>,
}

pub async fn reconcile(pool: &Pool) -> FleetResult<TlsOutcome> {
    let ca_namespace = k8s::controller_namespace();
    let ca = secret::ensure_ca(&ca_namespace, resource_names::CLUSTER_CA_SECRET).await?;
    let (ca_pem, _) = ca.to_pem();

    let namespace = pool.namespace().unwrap_or_default();
    let pool_name = pool.name_any();
    let duration = ChronoDuration::seconds(pool.spec.tls.server_cert_duration_secs as i64);
    let renew_before = ChronoDuration::seconds(pool.spec.tls.rotate_before_secs as i64);
    let now = Utc::now();

    let server_secret_name = resource_names::server_secret(&pool_name);
    let server_dns = gateway_dns_names(&pool_name, &namespace);
    let server = reissue_if_due(
        &namespace,
        &server_secret_name,
        pool,
        &ca,
        &ca_pem,
        renew_before,
        now,
        CertRequest {
            common_name: server_dns[0].clone(),
            dns_names: server_dns,
            ip_addresses: vec![],
            organization: "buildkit-fleet".to_string(),
            duration,
            is_server: true,
            is_client: false,
        },
    )
    .await?;

    let worker_secret_name = resource_names::worker_secret(&pool_name);
    let worker_dns = worker_dns_names(&pool_name, &namespace);
    reissue_if_due(
        &namespace,
        &worker_secret_name,
        pool,
        &ca,
        &ca_pem,
        renew_before,
        now,
        CertRequest {
            common_name: worker_dns[0].clone(),
            dns_names: worker_dns,
            ip_addresses: vec![],
            organization: "buildkit-fleet".to_string(),
            duration,
            is_server: true,
            is_client: true,
        },
    )
    .await?;

    Ok(TlsOutcome {
        server_cert_not_before: server.0,
        server_cert_not_after: server.1,
    })
}

#[allow(clippy::too_many_arguments)]
async fn reissue_if_due(
    namespace: &str,
    secret_name: &str,
    pool: &Pool,
    ca: &identity::CertAuthority,
    ca_pem: &str,
    renew_before: ChronoDuration,
    now: DateTime<Utc>,
    request: CertRequest,
) -> FleetResult<(DateTime<Utc>, DateTime<Utc>)> {
    if let Ok(existing_pem) = secret::read_tls_cert_pem(namespace, secret_name).await {
        let info = identity::parse::parse(&existing_pem)?;
        if !identity::should_rotate(&info, renew_before, now) {
            return Ok((info.not_before, info.not_after));
        }
    }

    info!("reissuing TLS secret {} (CN {})", cyan(secret_name), &request.common_name);
    let issued = ca.issue(&request)?;
    secret::write_tls_secret(namespace, secret_name, pool, ca_pem, &issued).await?;
    Ok((issued.not_before, issued.not_after))
}

fn gateway_dns_names(pool: &str, namespace: &str) -> Vec<String> {
    let svc = resource_names::gateway_service(pool);
    vec![
        format!("{}.{}.svc", svc, namespace),
        format!("{}.{}.svc.cluster.local", svc, namespace),
    ]
}

fn worker_dns_names(pool: &str, namespace: &str) -> Vec<String> {
    vec![
        format!("{}-worker.{}.pod", pool, namespace),
        format!("*.{}.pod.cluster.local", namespace),
    ]
}
