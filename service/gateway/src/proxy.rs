//! The per-connection protocol described in §4.3:
//!
//! 1. Accept a TCP connection and perform a TLS handshake requiring a client
//!    certificate.
//! 2. Extract the allocation token from the certificate's CN or SAN.
//! 3. Resolve the token to a worker endpoint via the Allocation API.
//! 4. Dial the worker over mTLS (chain-verified, hostname-agnostic).
//! 5. Shuttle bytes bidirectionally until either side closes.
//!
//! Any failure before step 5 is counted, logged at `warn!`, and the
//! connection is dropped; nothing is sent back to the caller, since the
//! protocol being proxied (BuildKit's own) owns the wire format from the
//! first byte on.

use crate::lookup::LookupClient;
use crate::metrics::{Metrics, Outcome};
use crate::token;
use log::{info, warn};
use rustls::pki_types::ServerName;
use rustls::ClientConfig;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Instant;
use tokio::io::AsyncWriteExt;
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::watch;
use tokio_rustls::{TlsAcceptor, TlsConnector};

pub struct ProxyContext {
    pub acceptor: TlsAcceptor,
    pub client_config: Arc<ClientConfig>,
    pub lookup: LookupClient,
    pub metrics: Arc<Metrics>,
}

/// Runs the accept loop until `shutdown` is signalled, then stops accepting
/// new connections and returns. In-flight connections are not forcibly
/// closed: each proxied task runs to its own natural end (worker or caller
/// closing their side).
pub async fn serve(
    listen_addr: &str,
    ctx: Arc<ProxyContext>,
    mut shutdown: watch::Receiver<bool>,
) -> std::io::Result<()> {
    let listener = TcpListener::bind(listen_addr).await?;
    info!("gateway listening for BuildKit connections on {listen_addr}");

    loop {
        tokio::select! {
            accepted = listener.accept() => {
                let (stream, peer) = accepted?;
                let ctx = ctx.clone();
                tokio::spawn(async move {
                    handle_connection(stream, peer, ctx).await;
                });
            }
            _ = shutdown.changed() => {
                if *shutdown.borrow() {
                    info!("gateway accept loop stopping on shutdown signal");
                    return Ok(());
                }
            }
        }
    }
}

async fn handle_connection(stream: TcpStream, peer: SocketAddr, ctx: Arc<ProxyContext>) {
    ctx.metrics.connection_started();
    let started = Instant::now();
    let outcome = run_connection(stream, peer, &ctx).await;
    let elapsed = started.elapsed().as_secs_f64();
    ctx.metrics.connection_finished(elapsed);

    match &outcome {
        Ok(()) => ctx.metrics.record(Outcome::Success),
        Err((outcome, reason)) => {
            warn!("connection from {peer} failed: {reason}");
            ctx.metrics.record(outcome.clone());
        }
    }
}

async fn run_connection(stream: TcpStream, peer: SocketAddr, ctx: &ProxyContext) -> Result<(), (Outcome, String)> {
    let tls_stream = ctx.acceptor.accept(stream).await.map_err(|err| {
        if err.kind() == std::io::ErrorKind::InvalidData {
            (Outcome::NonTls, format!("TLS handshake with {peer}: {err}"))
        } else {
            (Outcome::HandshakeFailed, format!("TLS handshake with {peer}: {err}"))
        }
    })?;

    let peer_certs = tls_stream
        .get_ref()
        .1
        .peer_certificates()
        .ok_or_else(|| (Outcome::NoCert, format!("{peer} presented no client certificate")))?;

    let leaf = peer_certs
        .first()
        .ok_or_else(|| (Outcome::NoCert, format!("{peer} presented an empty certificate chain")))?;

    let allocation_token = token::extract_allocation_token(leaf)
        .map_err(|err| (Outcome::NoToken, format!("{peer}: {err}")))?;

    let resolved = ctx
        .lookup
        .lookup(&allocation_token)
        .await
        .map_err(|err| (Outcome::LookupFailed, format!("looking up token for {peer}: {err}")))?;

    let worker_stream = dial_worker(&resolved.worker_endpoint, &ctx.client_config)
        .await
        .map_err(|err| (Outcome::WorkerConnectFailed, format!("dialing worker {}: {err}", resolved.worker_name)))?;

    let mut caller_stream = tls_stream;
    let mut worker_stream = worker_stream;
    match tokio::io::copy_bidirectional(&mut caller_stream, &mut worker_stream).await {
        Ok((to_worker, to_caller)) => {
            info!(
                "proxied {peer} -> worker {} ({}): {to_worker} bytes out, {to_caller} bytes back",
                resolved.worker_name, resolved.pool
            );
        }
        Err(err) => {
            // Either side closing mid-stream is the normal end of a build;
            // only genuinely unexpected I/O errors are worth a warning.
            if err.kind() != std::io::ErrorKind::UnexpectedEof && err.kind() != std::io::ErrorKind::ConnectionReset {
                warn!("error proxying {peer} <-> worker {}: {err}", resolved.worker_name);
            }
        }
    }

    let _ = caller_stream.shutdown().await;
    Ok(())
}

async fn dial_worker(
    endpoint: &str,
    client_config: &Arc<ClientConfig>,
) -> std::io::Result<tokio_rustls::client::TlsStream<TcpStream>> {
    let tcp = TcpStream::connect(endpoint).await?;
    let host = endpoint.rsplit_once(':').map(|(host, _)| host).unwrap_or(endpoint);
    let server_name = ServerName::try_from(host.to_string())
        .map_err(|err| std::io::Error::new(std::io::ErrorKind::InvalidInput, err))?;
    let connector = TlsConnector::from(client_config.clone());
    connector.connect(server_name, tcp).await
}
