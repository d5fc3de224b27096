//! Pure scaling and victim-selection functions owned by the Fleet
//! Controller's worker manager. Nothing in this crate performs I/O — every
//! function takes the current time as an argument so the arithmetic stays
//! deterministic and unit-testable without a clock.

use chrono::{DateTime, Duration, Utc};
use cron::Schedule;
use error::*;
use result::Result as FleetResult;
use std::str::FromStr;

/// `desired = clamp(min + allocated, 0, max)`.
pub fn desired(min: u32, max: u32, allocated: u32) -> u32 {
    (min + allocated).min(max)
}

/// `needed = max(0, desired - (ready + provisioning))`.
pub fn needed(desired: u32, ready: u32, provisioning: u32) -> u32 {
    desired.saturating_sub(ready + provisioning)
}

/// True when a `min: 0` pool has been idle (no activity, no allocated
/// workers) for longer than `scale_down_delay`. Scale-down never considers
/// allocated workers, so the caller should only invoke this once
/// `allocated == 0`.
pub fn should_scale_down_to_zero(
    min: u32,
    idle_since: Option<DateTime<Utc>>,
    now: DateTime<Utc>,
    scale_down_delay: Duration,
) -> bool {
    if min != 0 {
        return false;
    }
    match idle_since {
        Some(since) => now - since >= scale_down_delay,
        None => false,
    }
}

/// True if `cron_expr` has a scheduled occurrence within two minutes of
/// `now`, forcing `desired = 0` regardless of `min`.
pub fn cron_forces_zero(cron_expr: &str, now: DateTime<Utc>) -> FleetResult<bool> {
    // The `cron` crate requires a leading seconds field; the declarative
    // schedule in a Pool's spec is the ordinary 5-field unix form, so a
    // zero-seconds field is prepended before parsing.
    let normalized = match cron_expr.split_whitespace().count() {
        5 => format!("0 {}", cron_expr),
        _ => cron_expr.to_string(),
    };
    let schedule = Schedule::from_str(&normalized).map_err(|source| InvalidCronExpression {
        expression: cron_expr.to_string(),
        source: source.to_string(),
    })?;
    let window = Duration::minutes(2);
    let candidate = schedule.after(&(now - window)).next();
    Ok(candidate
        .map(|fire| (fire - now).num_seconds().abs() <= window.num_seconds())
        .unwrap_or(false))
}

/// Given idle workers paired with their age-ordering key (oldest first, e.g.
/// `ready_at` or `created_at`), returns the names of the oldest `excess` of
/// them — the victims to delete on scale-down.
pub fn select_scale_down_victims<'a>(
    mut idle: Vec<(&'a str, DateTime<Utc>)>,
    excess: usize,
) -> Vec<&'a str> {
    idle.sort_by_key(|(_, age)| *age);
    idle.into_iter().take(excess).map(|(name, _)| name).collect()
}

#[derive(Error, FleetError, Kind, HttpCode, Debug)]
#[code(Status::InternalServerError)]
#[error("the scale-to-zero cron expression '{expression}' is invalid: {source}")]
pub struct InvalidCronExpression {
    expression: String,
    source: String,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn desired_clamps_to_max() {
        assert_eq!(desired(1, 3, 10), 3);
        assert_eq!(desired(0, 3, 2), 2);
        assert_eq!(desired(2, 3, 0), 2);
    }

    #[test]
    fn needed_never_negative() {
        assert_eq!(needed(2, 5, 0), 0);
        assert_eq!(needed(5, 2, 1), 2);
    }

    #[test]
    fn scale_down_requires_zero_min() {
        let now = Utc::now();
        assert!(!should_scale_down_to_zero(
            1,
            Some(now - Duration::hours(1)),
            now,
            Duration::minutes(5)
        ));
        assert!(should_scale_down_to_zero(
            0,
            Some(now - Duration::hours(1)),
            now,
            Duration::minutes(5)
        ));
        assert!(!should_scale_down_to_zero(0, None, now, Duration::minutes(5)));
    }

    #[test]
    fn every_minute_cron_always_forces_zero() {
        let now = Utc::now();
        assert!(cron_forces_zero("* * * * * *", now).unwrap());
    }

    #[test]
    fn invalid_cron_is_an_error() {
        assert!(cron_forces_zero("not a cron expression", Utc::now()).is_err());
    }

    #[test]
    fn victims_are_oldest_first() {
        let now = Utc::now();
        let idle = vec![
            ("newest", now),
            ("oldest", now - Duration::hours(2)),
            ("middle", now - Duration::hours(1)),
        ];
        assert_eq!(select_scale_down_victims(idle, 2), vec!["oldest", "middle"]);
    }
}
