//! Cluster-local certificate authority: ECDSA P-256 keypairs, CA persistence
//! in an orchestrator secret, leaf issuance, and the rotation predicate the
//! Fleet Controller's TLS manager consults on every reconcile.

pub mod ca;
pub mod parse;
pub mod secret;

use chrono::{DateTime, Duration, Utc};

pub use ca::{CertAuthority, IssuedCert};
pub use parse::CertInfo;

/// What the caller wants minted. `duration` defaults are applied by the
/// caller (the Fleet Controller knows the Pool's TLS policy); this library
/// never invents a default cert lifetime of its own.
pub struct CertRequest {
    pub common_name: String,
    pub dns_names: Vec<String>,
    pub ip_addresses: Vec<std::net::IpAddr>,
    pub organization: String,
    pub duration: Duration,
    pub is_server: bool,
    pub is_client: bool,
}

/// `true` iff `now + renew_before >= not_after`. A missing secret is always
/// "yes, rotate" — that predicate lives at the call site, not here, since it
/// depends on whether the secret could be read at all.
pub fn should_rotate(info: &CertInfo, renew_before: Duration, now: DateTime<Utc>) -> bool {
    now + renew_before >= info.not_after
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rotates_when_inside_window() {
        let now = Utc::now();
        let info = CertInfo {
            not_before: now - Duration::days(335),
            not_after: now + Duration::days(10),
            renewal_time: now - Duration::days(152),
        };
        assert!(should_rotate(&info, Duration::days(30), now));
    }

    #[test]
    fn does_not_rotate_when_far_from_expiry() {
        let now = Utc::now();
        let info = CertInfo {
            not_before: now - Duration::days(30),
            not_after: now + Duration::days(335),
            renewal_time: now + Duration::days(152),
        };
        assert!(!should_rotate(&info, Duration::days(30), now));
    }
}
