//! Reads and writes the orchestrator secrets that back the cluster CA and
//! per-fleet certificate bundles. Field names match the orchestrator-native
//! TLS secret convention (`tls.crt`/`tls.key`) wherever a secret carries a
//! leaf cert, plus a `ca.crt` entry so consumers never need a second fetch
//! to validate a peer.

use crate::ca::CertAuthority;
use crate::IssuedCert;
use error::*;
use k8s::client;
use k8s::Pool;
use k8s_openapi::api::core::v1::Secret;
use k8s_openapi::ByteString;
use kube::api::{Patch, PatchParams, PostParams};
use result::Result as FleetResult;
use std::collections::BTreeMap;

const FIELD_CA_CRT: &str = "ca.crt";
const FIELD_CA_KEY: &str = "ca.key";
const FIELD_TLS_CRT: &str = "tls.crt";
const FIELD_TLS_KEY: &str = "tls.key";
const FIELD_CLIENT_CRT: &str = "client.crt";
const FIELD_CLIENT_KEY: &str = "client.key";

fn field(secret: &Secret, key: &str) -> FleetResult<String> {
    secret
        .data
        .as_ref()
        .and_then(|data| data.get(key))
        .map(|ByteString(bytes)| String::from_utf8_lossy(bytes).into_owned())
        .ok_or_else(|| {
            MissingSecretField {
                field: key.to_string(),
            }
            .into()
        })
}

fn data_of(fields: Vec<(&str, String)>) -> BTreeMap<String, ByteString> {
    fields
        .into_iter()
        .map(|(k, v)| (k.to_string(), ByteString(v.into_bytes())))
        .collect()
}

/// Loads the cluster CA secret, creating it on first run. A conflict on
/// create (another replica of the Fleet Controller won the race) is not an
/// error: the secret is simply re-read.
pub async fn ensure_ca(namespace: &str, name: &str) -> FleetResult<CertAuthority> {
    let api = client::new::<Secret>(namespace).await;

    match api.get(name).await {
        Ok(secret) => {
            let cert_pem = field(&secret, FIELD_CA_CRT)?;
            let key_pem = field(&secret, FIELD_CA_KEY)?;
            CertAuthority::from_pem(&cert_pem, &key_pem)
        }
        Err(kube::Error::Api(err)) if err.code == 404 => {
            let ca = CertAuthority::generate()?;
            let (cert_pem, key_pem) = ca.to_pem();
            let secret = new_secret(
                name,
                None,
                data_of(vec![(FIELD_CA_CRT, cert_pem), (FIELD_CA_KEY, key_pem)]),
            );
            match api.create(&PostParams::default(), &secret).await {
                Ok(_) => Ok(ca),
                Err(kube::Error::Api(err)) if err.code == 409 => {
                    let secret = api.get(name).await.map_err(k8s::errors::ApiError::from)?;
                    let cert_pem = field(&secret, FIELD_CA_CRT)?;
                    let key_pem = field(&secret, FIELD_CA_KEY)?;
                    CertAuthority::from_pem(&cert_pem, &key_pem)
                }
                Err(source) => Err(k8s::errors::ApiError::from(source).into()),
            }
        }
        Err(source) => Err(k8s::errors::ApiError::from(source).into()),
    }
}

/// Writes (creates or server-side-applies) a server/worker-side TLS secret:
/// `ca.crt` + `tls.crt` + `tls.key`, owned by the Pool it belongs to so it
/// cascade-deletes with it.
pub async fn write_tls_secret(
    namespace: &str,
    name: &str,
    owner: &Pool,
    ca_pem: &str,
    issued: &IssuedCert,
) -> FleetResult<()> {
    let data = data_of(vec![
        (FIELD_CA_CRT, ca_pem.to_string()),
        (FIELD_TLS_CRT, issued.cert_pem.clone()),
        (FIELD_TLS_KEY, issued.key_pem.clone()),
    ]);
    apply(namespace, name, Some(owner), data).await
}

/// Writes a client bundle secret (returned to callers of `/certs/request`
/// for operator-side verification): `ca.crt` + `client.crt` + `client.key`,
/// owned by the Pool it belongs to so it cascade-deletes with it.
pub async fn write_client_secret(
    namespace: &str,
    name: &str,
    owner: &Pool,
    ca_pem: &str,
    issued: &IssuedCert,
) -> FleetResult<()> {
    let data = data_of(vec![
        (FIELD_CA_CRT, ca_pem.to_string()),
        (FIELD_CLIENT_CRT, issued.cert_pem.clone()),
        (FIELD_CLIENT_KEY, issued.key_pem.clone()),
    ]);
    apply(namespace, name, Some(owner), data).await
}

/// Reads back a previously written TLS secret's `tls.crt` PEM, for the
/// rotation predicate to parse.
pub async fn read_tls_cert_pem(namespace: &str, name: &str) -> FleetResult<String> {
    let api = client::new::<Secret>(namespace).await;
    let secret = api.get(name).await.map_err(k8s::errors::ApiError::from)?;
    field(&secret, FIELD_TLS_CRT)
}

/// Reads a full `ca.crt`/`tls.crt`/`tls.key` bundle back out of a previously
/// written TLS secret, for processes (the Gateway) that terminate or
/// originate TLS themselves rather than just inspecting expiry.
pub async fn read_tls_bundle(namespace: &str, name: &str) -> FleetResult<(String, String, String)> {
    let api = client::new::<Secret>(namespace).await;
    let secret = api.get(name).await.map_err(k8s::errors::ApiError::from)?;
    Ok((
        field(&secret, FIELD_CA_CRT)?,
        field(&secret, FIELD_TLS_CRT)?,
        field(&secret, FIELD_TLS_KEY)?,
    ))
}

async fn apply(namespace: &str, name: &str, owner: Option<&Pool>, data: BTreeMap<String, ByteString>) -> FleetResult<()> {
    let api = client::new::<Secret>(namespace).await;
    let secret = new_secret(name, owner, data);
    let patch = Patch::Apply(&secret);
    let params = PatchParams::apply("fleet-identity-store").force();
    api.patch(name, &params, &patch)
        .await
        .map_err(k8s::errors::ApiError::from)?;
    Ok(())
}

/// Per spec §3.5 these are opaque secrets, not the orchestrator's own
/// `kubernetes.io/tls` kind — that type is schema-validated to require both
/// `tls.crt` and `tls.key`, which the cluster CA secret (`ca.crt`/`ca.key`
/// only) and the client bundle (`client.crt`/`client.key`) don't satisfy.
fn new_secret(name: &str, owner: Option<&Pool>, data: BTreeMap<String, ByteString>) -> Secret {
    let owner_references = owner.map(|pool| vec![k8s::owner::owner_reference(pool)]);
    Secret {
        metadata: kube::api::ObjectMeta {
            name: Some(name.to_string()),
            owner_references,
            ..Default::default()
        },
        type_: Some("Opaque".to_string()),
        data: Some(data),
        ..Default::default()
    }
}

#[derive(Error, FleetError, Kind, HttpCode, Debug)]
#[code(Status::InternalServerError)]
#[error("secret is missing required field '{field}'")]
pub struct MissingSecretField {
    field: String,
}
