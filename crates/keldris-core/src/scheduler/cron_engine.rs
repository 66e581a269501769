//! Cron evaluation (component C6).
//!
//! Schedules use the 6-field "seconds" cron format (`sec min hour dom month
//! dow`), which the `cron` crate parses directly. A tick is "due" for a
//! schedule when at least one scheduled occurrence falls in
//! `(last_tick, now]` — this makes evaluation robust to a dispatcher tick
//! interval coarser than one second without ever double-firing the same
//! occurrence.

use std::str::FromStr;

use chrono::{DateTime, Utc};
use cron::Schedule as CronSchedule;

use crate::error::SchedulerError;

/// Parse a 6-field cron expression.
///
/// # Errors
///
/// Returns [`SchedulerError::InvalidCron`] if the expression does not parse.
pub fn parse(expression: &str) -> Result<CronSchedule, SchedulerError> {
    CronSchedule::from_str(expression).map_err(|e| SchedulerError::InvalidCron(e.to_string()))
}

/// True if `schedule` has at least one occurrence in `(last_tick, now]`.
#[must_use]
pub fn is_due(schedule: &CronSchedule, last_tick: DateTime<Utc>, now: DateTime<Utc>) -> bool {
    schedule.after(&last_tick).take_while(|occurrence| *occurrence <= now).next().is_some()
}

/// The next occurrence strictly after `after`, if the expression has one.
#[must_use]
pub fn next_occurrence(schedule: &CronSchedule, after: DateTime<Utc>) -> Option<DateTime<Utc>> {
    schedule.after(&after).next()
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn rejects_malformed_expression() {
        assert!(parse("not a cron expression").is_err());
    }

    #[test]
    fn every_minute_is_due_after_sixty_seconds() {
        let schedule = parse("0 * * * * *").unwrap();
        let last_tick = DateTime::parse_from_rfc3339("2026-01-01T00:00:00Z").unwrap().with_timezone(&Utc);
        let now = last_tick + chrono::Duration::seconds(61);
        assert!(is_due(&schedule, last_tick, now));
    }

    #[test]
    fn not_due_before_next_occurrence() {
        let schedule = parse("0 0 3 * * *").unwrap();
        let last_tick = DateTime::parse_from_rfc3339("2026-01-01T00:00:00Z").unwrap().with_timezone(&Utc);
        let now = last_tick + chrono::Duration::hours(1);
        assert!(!is_due(&schedule, last_tick, now));
    }

    #[test]
    fn next_occurrence_is_strictly_after() {
        let schedule = parse("0 0 3 * * *").unwrap();
        let after = DateTime::parse_from_rfc3339("2026-01-01T03:00:00Z").unwrap().with_timezone(&Utc);
        let next = next_occurrence(&schedule, after).unwrap();
        assert!(next > after);
    }
}
