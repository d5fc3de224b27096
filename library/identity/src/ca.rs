use crate::CertRequest;
use chrono::{DateTime, Utc};
use error::*;
use rcgen::{
    BasicConstraints, Certificate, CertificateParams, DistinguishedName, DnType, ExtendedKeyUsagePurpose,
    IsCa, KeyPair, KeyUsagePurpose, SanType, PKCS_ECDSA_P256_SHA256,
};
use result::Result as FleetResult;

pub struct CertAuthority {
    pub cert: Certificate,
    pub key: KeyPair,
}

pub struct IssuedCert {
    pub cert_pem: String,
    pub key_pem: String,
    pub not_before: DateTime<Utc>,
    pub not_after: DateTime<Utc>,
}

impl CertAuthority {
    /// Generates a brand-new ECDSA P-256 CA valid for ten years, per the
    /// Identity Store's `ensure-ca` contract.
    pub fn generate() -> FleetResult<Self> {
        let key = KeyPair::generate_for(&PKCS_ECDSA_P256_SHA256).map_err(|source| KeyGenerationFailed {
            source: source.to_string(),
        })?;
        let mut params = CertificateParams::new(Vec::<String>::new()).map_err(|source| CertGenerationFailed {
            op: "building CA parameters".to_string(),
            source: source.to_string(),
        })?;
        let mut dn = DistinguishedName::new();
        dn.push(DnType::CommonName, "buildkit-fleet-ca");
        params.distinguished_name = dn;
        params.is_ca = IsCa::Ca(BasicConstraints::Unconstrained);
        params.key_usages = vec![KeyUsagePurpose::KeyCertSign, KeyUsagePurpose::CrlSign];
        params.not_before = rcgen::date_time_ymd(2020, 1, 1);
        params.not_after = ten_years_from_now();
        let cert = params
            .self_signed(&key)
            .map_err(|source| CertGenerationFailed {
                op: "self-signing the cluster CA".to_string(),
                source: source.to_string(),
            })?;
        Ok(CertAuthority { cert, key })
    }

    pub fn to_pem(&self) -> (String, String) {
        (self.cert.pem(), self.key.serialize_pem())
    }

    pub fn from_pem(cert_pem: &str, key_pem: &str) -> FleetResult<Self> {
        let key = KeyPair::from_pem(key_pem).map_err(|source| CertParseFailed {
            field: "ca.key".to_string(),
            source: source.to_string(),
        })?;
        let params = CertificateParams::from_ca_cert_pem(cert_pem).map_err(|source| CertParseFailed {
            field: "ca.crt".to_string(),
            source: source.to_string(),
        })?;
        let cert = params
            .self_signed(&key)
            .map_err(|source| CertGenerationFailed {
                op: "reconstituting the cluster CA from its stored PEM".to_string(),
                source: source.to_string(),
            })?;
        Ok(CertAuthority { cert, key })
    }

    /// Issues a leaf certificate signed by this CA per `request`.
    pub fn issue(&self, request: &CertRequest) -> FleetResult<IssuedCert> {
        let key = KeyPair::generate_for(&PKCS_ECDSA_P256_SHA256).map_err(|source| KeyGenerationFailed {
            source: source.to_string(),
        })?;
        let mut sans = request
            .dns_names
            .iter()
            .cloned()
            .map(SanType::DnsName)
            .collect::<Result<Vec<_>, _>>()
            .map_err(|source| CertGenerationFailed {
                op: "parsing requested DNS SANs".to_string(),
                source: source.to_string(),
            })?;
        sans.extend(request.ip_addresses.iter().cloned().map(SanType::IpAddress));

        let mut params = CertificateParams::new(Vec::<String>::new()).map_err(|source| CertGenerationFailed {
            op: "building leaf certificate parameters".to_string(),
            source: source.to_string(),
        })?;
        let mut dn = DistinguishedName::new();
        dn.push(DnType::CommonName, request.common_name.as_str());
        if !request.organization.is_empty() {
            dn.push(DnType::OrganizationName, request.organization.as_str());
        }
        params.distinguished_name = dn;
        params.subject_alt_names = sans;
        params.is_ca = IsCa::NoCa;
        params.not_before = now_minus_skew();
        params.not_after = now_plus(request.duration);
        let mut eku = Vec::new();
        if request.is_server {
            eku.push(ExtendedKeyUsagePurpose::ServerAuth);
        }
        if request.is_client {
            eku.push(ExtendedKeyUsagePurpose::ClientAuth);
        }
        params.extended_key_usages = eku;

        let cert = params
            .signed_by(&key, &self.cert, &self.key)
            .map_err(|source| CertGenerationFailed {
                op: format!("signing leaf certificate for '{}'", request.common_name),
                source: source.to_string(),
            })?;

        Ok(IssuedCert {
            cert_pem: cert.pem(),
            key_pem: key.serialize_pem(),
            not_before: chrono_from_rcgen(params.not_before),
            not_after: chrono_from_rcgen(params.not_after),
        })
    }
}

use time::{Duration as TimeDuration, OffsetDateTime};

fn ten_years_from_now() -> OffsetDateTime {
    now_plus(chrono::Duration::days(3650))
}

fn now_plus(duration: chrono::Duration) -> OffsetDateTime {
    OffsetDateTime::now_utc() + TimeDuration::seconds(duration.num_seconds())
}

fn now_minus_skew() -> OffsetDateTime {
    OffsetDateTime::now_utc() - TimeDuration::minutes(5)
}

fn chrono_from_rcgen(t: OffsetDateTime) -> DateTime<Utc> {
    DateTime::from_timestamp(t.unix_timestamp(), 0).unwrap_or_else(Utc::now)
}

#[derive(Error, FleetError, Kind, HttpCode, Debug)]
#[code(Status::InternalServerError)]
#[error("failed to generate a fresh ECDSA P-256 keypair: {source}")]
pub struct KeyGenerationFailed {
    source: String,
}

#[derive(Error, FleetError, Kind, HttpCode, Debug)]
#[code(Status::InternalServerError)]
#[error("failed while {op}: {source}")]
pub struct CertGenerationFailed {
    op: String,
    source: String,
}

#[derive(Error, FleetError, Kind, HttpCode, Debug)]
#[code(Status::InternalServerError)]
#[error("failed to parse stored certificate material in field '{field}': {source}")]
pub struct CertParseFailed {
    field: String,
    source: String,
}
