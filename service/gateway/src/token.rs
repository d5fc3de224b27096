//! Pulls an allocation token, or a bare server identity, out of a leaf
//! certificate's DER bytes. §6.4: a caller cert's CN is `alloc:<token>`, or
//! the token rides in a URI SAN `buildkit://allocation/<token>`.

use error::*;
use result::Result as FleetResult;
use rustls::pki_types::{CertificateDer, ServerName};
use x509_parser::extensions::GeneralName;
use x509_parser::prelude::{FromDer, X509Certificate};

const CN_TOKEN_PREFIX: &str = "alloc:";
const URI_SCHEME: &str = "buildkit://allocation/";

/// Extracts the allocation token carried by a client certificate presented
/// to the inbound listener.
pub fn extract_allocation_token(der: &CertificateDer<'_>) -> FleetResult<String> {
    let (_, cert) = X509Certificate::from_der(der.as_ref()).map_err(|source| NoToken {
        reason: format!("failed to parse client certificate: {source}"),
    })?;

    if let Some(cn) = common_name(&cert) {
        if let Some(token) = cn.strip_prefix(CN_TOKEN_PREFIX) {
            return Ok(token.to_string());
        }
    }

    if let Some(uri) = subject_alt_uri(&cert) {
        if let Some(token) = uri.strip_prefix(URI_SCHEME) {
            return Ok(token.to_string());
        }
    }

    Err(NoToken {
        reason: "client certificate carries neither an `alloc:` CN nor a `buildkit://allocation/` SAN".to_string(),
    }
    .into())
}

/// A `ServerName` built from a certificate's own identity (DNS SAN first,
/// falling back to its CN), used by the chain-only outbound verifier so the
/// hostname check it performs internally always matches the cert it was
/// just handed.
pub fn leaf_identity(der: &CertificateDer<'_>) -> FleetResult<ServerName<'static>> {
    let (_, cert) = X509Certificate::from_der(der.as_ref()).map_err(|source| NoToken {
        reason: format!("failed to parse worker certificate: {source}"),
    })?;

    let name = dns_san(&cert).or_else(|| common_name(&cert)).ok_or_else(|| NoToken {
        reason: "worker certificate carries no DNS SAN or CN to verify against".to_string(),
    })?;

    ServerName::try_from(name.clone()).map(|sn| sn.to_owned()).map_err(|source| {
        NoToken {
            reason: format!("'{name}' is not a valid TLS server name: {source}"),
        }
        .into()
    })
}

fn common_name(cert: &X509Certificate) -> Option<String> {
    cert.subject().iter_common_name().next().and_then(|cn| cn.as_str().ok()).map(|s| s.to_string())
}

fn dns_san(cert: &X509Certificate) -> Option<String> {
    let ext = cert.subject_alternative_name().ok().flatten()?;
    ext.value.general_names.iter().find_map(|name| match name {
        GeneralName::DNSName(dns) => Some(dns.to_string()),
        _ => None,
    })
}

fn subject_alt_uri(cert: &X509Certificate) -> Option<String> {
    let ext = cert.subject_alternative_name().ok().flatten()?;
    ext.value.general_names.iter().find_map(|name| match name {
        GeneralName::URI(uri) => Some(uri.to_string()),
        _ => None,
    })
}

#[derive(Error, FleetError, Kind, HttpCode, Debug)]
#[code(Status::Unauthorized)]
#[error("could not extract an allocation token from the peer certificate: {reason}")]
pub struct NoToken {
    reason: String,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rejects_garbage_der() {
        let der = CertificateDer::from(vec![0u8; 8]);
        assert!(extract_allocation_token(&der).is_err());
    }
}
