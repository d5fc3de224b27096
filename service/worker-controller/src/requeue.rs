//! Pure arithmetic for `§4.5`'s requeue rule: `min(status-update-interval,
//! time-until-expiry + 1s)`. Kept as a standalone function so the
//! arithmetic can be unit-tested without spinning up a reconcile.

use chrono::{DateTime, Duration, Utc};
use std::time::Duration as StdDuration;

pub const STATUS_UPDATE_INTERVAL: StdDuration = StdDuration::from_secs(30);
pub const STUCK_THRESHOLD: Duration = Duration::minutes(10);

/// `expires_at` is `None` for workers with no live allocation — in that case
/// the ordinary status-update cadence applies.
pub fn next_requeue(now: DateTime<Utc>, expires_at: Option<DateTime<Utc>>) -> StdDuration {
    match expires_at {
        None => STATUS_UPDATE_INTERVAL,
        Some(expires_at) => {
            let until_expiry = (expires_at - now + Duration::seconds(1))
                .to_std()
                .unwrap_or(StdDuration::from_secs(0));
            until_expiry.min(STATUS_UPDATE_INTERVAL)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_to_status_interval_with_no_allocation() {
        assert_eq!(next_requeue(Utc::now(), None), STATUS_UPDATE_INTERVAL);
    }

    #[test]
    fn shortens_to_expiry_when_sooner() {
        let now = Utc::now();
        let expires = now + Duration::seconds(5);
        let got = next_requeue(now, Some(expires));
        assert!(got <= StdDuration::from_secs(6));
    }

    #[test]
    fn never_exceeds_status_interval() {
        let now = Utc::now();
        let expires = now + Duration::hours(1);
        assert_eq!(next_requeue(now, Some(expires)), STATUS_UPDATE_INTERVAL);
    }
}
