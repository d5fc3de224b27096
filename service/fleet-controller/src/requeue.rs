//! Pure arithmetic for §4.6's requeue rule: the minimum of the 30s
//! status-update cadence and `time-until-cert-renewal − min-requeue`,
//! itself clamped to `[1h, 24h]`. Split into two functions so the clamp
//! behavior is directly testable even though, in the steady state, the
//! 30s status cadence is almost always the smaller of the two.

use chrono::{DateTime, Duration, Utc};
use std::time::Duration as StdDuration;

pub const STATUS_UPDATE_INTERVAL: StdDuration = StdDuration::from_secs(30);
pub const MIN_REQUEUE: Duration = Duration::hours(1);
pub const MAX_REQUEUE: Duration = Duration::hours(24);
pub const STUCK_THRESHOLD: Duration = Duration::minutes(10);

/// `cert_renewal_due` is the instant `should_rotate` starts returning true
/// for the fleet's server certificate (`not_after - renew_before`).
pub fn next_requeue(now: DateTime<Utc>, cert_renewal_due: DateTime<Utc>) -> StdDuration {
    let renewal_component = renewal_component(now, cert_renewal_due);
    STATUS_UPDATE_INTERVAL.min(renewal_component)
}

fn renewal_component(now: DateTime<Utc>, cert_renewal_due: DateTime<Utc>) -> StdDuration {
    let until_renewal = (cert_renewal_due - now - MIN_REQUEUE)
        .to_std()
        .unwrap_or(StdDuration::from_secs(0));
    until_renewal.clamp(
        MIN_REQUEUE.to_std().unwrap(),
        MAX_REQUEUE.to_std().unwrap(),
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn status_cadence_dominates_when_renewal_is_far_off() {
        let now = Utc::now();
        let due = now + Duration::days(300);
        assert_eq!(next_requeue(now, due), STATUS_UPDATE_INTERVAL);
    }

    #[test]
    fn renewal_component_floors_at_one_hour() {
        let now = Utc::now();
        let due = now + Duration::minutes(5);
        assert_eq!(renewal_component(now, due), MIN_REQUEUE.to_std().unwrap());
    }

    #[test]
    fn renewal_component_caps_at_one_day() {
        let now = Utc::now();
        let due = now + Duration::days(400);
        assert_eq!(renewal_component(now, due), MAX_REQUEUE.to_std().unwrap());
    }
}
