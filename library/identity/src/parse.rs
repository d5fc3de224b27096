//! Extracts validity information out of stored certificate PEM so the Fleet
//! Controller's TLS manager can decide whether a secret needs rotating
//! without keeping its own copy of the issuance parameters.

use chrono::{DateTime, Utc};
use error::*;
use result::Result as FleetResult;
use x509_parser::prelude::*;

pub struct CertInfo {
    pub not_before: DateTime<Utc>,
    pub not_after: DateTime<Utc>,
    pub renewal_time: DateTime<Utc>,
}

/// Parses a single PEM-encoded certificate and extracts its validity window.
/// `renewal_time` is the midpoint between `not_before` and `not_after`,
/// matching the halfway heuristic common to ACME-style clients; the
/// authoritative rotation decision still goes through `should_rotate`, which
/// takes an explicit `renew_before` window instead of trusting this field
/// blindly.
pub fn parse(pem: &str) -> FleetResult<CertInfo> {
    let (_, pem_block) = x509_parser::pem::parse_x509_pem(pem.as_bytes()).map_err(|source| CertParseFailed {
        source: source.to_string(),
    })?;
    let cert = pem_block.parse_x509().map_err(|source| CertParseFailed {
        source: source.to_string(),
    })?;

    let not_before = DateTime::from_timestamp(cert.validity().not_before.timestamp(), 0)
        .ok_or_else(|| OutOfRangeTimestamp {
            field: "notBefore".to_string(),
        })?;
    let not_after = DateTime::from_timestamp(cert.validity().not_after.timestamp(), 0)
        .ok_or_else(|| OutOfRangeTimestamp {
            field: "notAfter".to_string(),
        })?;
    let renewal_time = not_before + (not_after - not_before) / 2;

    Ok(CertInfo {
        not_before,
        not_after,
        renewal_time,
    })
}

#[derive(Error, FleetError, Kind, HttpCode, Debug)]
#[code(Status::InternalServerError)]
#[error("failed to parse stored certificate PEM: {source}")]
pub struct CertParseFailed {
    source: String,
}

#[derive(Error, FleetError, Kind, HttpCode, Debug)]
#[code(Status::InternalServerError)]
#[error("certificate field '{field}' is out of the representable timestamp range")]
pub struct OutOfRangeTimestamp {
    field: String,
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ca::CertAuthority;
    use crate::CertRequest;
    use chrono::Duration;

    #[test]
    fn parses_a_freshly_issued_leaf() {
        let ca = CertAuthority::generate().unwrap();
        let issued = ca
            .issue(&CertRequest {
                common_name: "worker.pool-a.svc".to_string(),
                dns_names: vec!["worker.pool-a.svc".to_string()],
                ip_addresses: vec![],
                organization: String::new(),
                duration: Duration::days(30),
                is_server: true,
                is_client: false,
            })
            .unwrap();

        let info = parse(&issued.cert_pem).unwrap();
        assert!(info.not_after > info.not_before);
        assert!(info.renewal_time > info.not_before);
        assert!(info.renewal_time < info.not_after);
    }

    #[test]
    fn rejects_garbage_pem() {
        assert!(parse("not a certificate").is_err());
    }
}
