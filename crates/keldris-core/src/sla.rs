//! SLA compliance tracking (component C11).
//!
//! For one `(SlaDefinition, assignment, period)` triple, three independent
//! dimensions are computed — RPO, RTO, uptime — each producing a compliance
//! flag and, when non-compliant, a breach record.

use chrono::{DateTime, Utc};
use uuid::Uuid;

use crate::models::{SlaBreach, SlaCompliance, SlaDefinition};

/// The facts needed to compute compliance for one assignment over one
/// period; storage-agnostic so the caller assembles it from whatever
/// queries make sense for their backend.
#[derive(Debug, Clone)]
pub struct AssignmentFacts {
    pub assignment_id: Uuid,
    /// Minutes since the latest successful backup, or `None` if there has
    /// never been one.
    pub minutes_since_last_backup: Option<i64>,
    /// Duration of the latest restore in minutes, or `None` if none has run.
    pub last_restore_minutes: Option<i64>,
    pub uptime_percentage: f64,
}

/// Compute compliance and any breaches for one assignment against one SLA
/// definition over `period_start..period_end`.
#[must_use]
pub fn evaluate(sla: &SlaDefinition, facts: &AssignmentFacts, period_start: DateTime<Utc>, period_end: DateTime<Utc>, now_id: Uuid) -> (SlaCompliance, Vec<SlaBreach>) {
    let mut breaches = Vec::new();

    let rpo_compliant = match sla.rpo_minutes {
        None => true,
        Some(limit) => match facts.minutes_since_last_backup {
            None => false,
            Some(minutes) => minutes <= limit,
        },
    };
    if !rpo_compliant {
        breaches.push(SlaBreach {
            id: Uuid::new_v4(),
            compliance_id: now_id,
            dimension: "rpo".to_owned(),
            expected_value: sla.rpo_minutes.unwrap_or(0) as f64,
            actual_value: facts.minutes_since_last_backup.unwrap_or(-1) as f64,
            description: describe_rpo(sla, facts),
        });
    }

    // A missing restore is compliant by assumption — there was nothing to
    // fail to restore within.
    let rto_compliant = match (sla.rto_minutes, facts.last_restore_minutes) {
        (None, _) | (_, None) => true,
        (Some(limit), Some(actual)) => actual <= limit,
    };
    if !rto_compliant {
        breaches.push(SlaBreach {
            id: Uuid::new_v4(),
            compliance_id: now_id,
            dimension: "rto".to_owned(),
            expected_value: sla.rto_minutes.unwrap_or(0) as f64,
            actual_value: facts.last_restore_minutes.unwrap_or(0) as f64,
            description: "latest restore exceeded the configured RTO".to_owned(),
        });
    }

    let uptime_compliant = match sla.uptime_percentage {
        None => true,
        Some(required) => facts.uptime_percentage >= required,
    };
    if !uptime_compliant {
        breaches.push(SlaBreach {
            id: Uuid::new_v4(),
            compliance_id: now_id,
            dimension: "uptime".to_owned(),
            expected_value: sla.uptime_percentage.unwrap_or(0.0),
            actual_value: facts.uptime_percentage,
            description: "uptime over the period fell below the configured threshold".to_owned(),
        });
    }

    let compliance = SlaCompliance {
        id: now_id,
        sla_id: sla.id,
        assignment_id: facts.assignment_id,
        period_start,
        period_end,
        rpo_compliant,
        rto_compliant,
        uptime_compliant,
    };

    (compliance, breaches)
}

fn describe_rpo(sla: &SlaDefinition, facts: &AssignmentFacts) -> String {
    match facts.minutes_since_last_backup {
        None => "no successful backup exists for this assignment".to_owned(),
        Some(minutes) => format!("last successful backup was {minutes} minutes ago, exceeding the {}-minute RPO", sla.rpo_minutes.unwrap_or(0)),
    }
}

/// Aggregate compliance records into a monthly report: per-SLA compliance
/// rate, total breach count, and breaches still open (unresolved — callers
/// pass only the subset they consider active).
#[derive(Debug, Clone, Default, PartialEq)]
pub struct MonthlyReport {
    pub compliance_rate_percent: f64,
    pub total_breaches: usize,
    pub active_breaches: usize,
}

#[must_use]
pub fn build_monthly_report(compliance_records: &[SlaCompliance], all_breaches: &[SlaBreach], active_breach_ids: &[Uuid]) -> MonthlyReport {
    let total = compliance_records.len();
    let compliant = compliance_records.iter().filter(|c| c.is_fully_compliant()).count();
    let compliance_rate_percent = if total == 0 { 100.0 } else { (compliant as f64 / total as f64) * 100.0 };

    MonthlyReport {
        compliance_rate_percent,
        total_breaches: all_breaches.len(),
        active_breaches: all_breaches.iter().filter(|b| active_breach_ids.contains(&b.id)).count(),
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    fn sample_sla() -> SlaDefinition {
        SlaDefinition { id: Uuid::new_v4(), org_id: Uuid::new_v4(), name: "gold".to_owned(), rpo_minutes: Some(60), rto_minutes: Some(120), uptime_percentage: Some(99.9), active: true }
    }

    fn period() -> (DateTime<Utc>, DateTime<Utc>) {
        let start = DateTime::parse_from_rfc3339("2026-01-01T00:00:00Z").unwrap().with_timezone(&Utc);
        (start, start + chrono::Duration::days(30))
    }

    #[test]
    fn fully_compliant_assignment_has_no_breaches() {
        let sla = sample_sla();
        let facts = AssignmentFacts { assignment_id: Uuid::new_v4(), minutes_since_last_backup: Some(10), last_restore_minutes: Some(30), uptime_percentage: 99.95 };
        let (start, end) = period();
        let (compliance, breaches) = evaluate(&sla, &facts, start, end, Uuid::new_v4());

        assert!(compliance.is_fully_compliant());
        assert!(breaches.is_empty());
    }

    #[test]
    fn missing_backup_is_rpo_non_compliant() {
        let sla = sample_sla();
        let facts = AssignmentFacts { assignment_id: Uuid::new_v4(), minutes_since_last_backup: None, last_restore_minutes: None, uptime_percentage: 100.0 };
        let (start, end) = period();
        let (compliance, breaches) = evaluate(&sla, &facts, start, end, Uuid::new_v4());

        assert!(!compliance.rpo_compliant);
        assert_eq!(breaches.iter().filter(|b| b.dimension == "rpo").count(), 1);
    }

    #[test]
    fn missing_restore_is_compliant_by_assumption() {
        let sla = sample_sla();
        let facts = AssignmentFacts { assignment_id: Uuid::new_v4(), minutes_since_last_backup: Some(5), last_restore_minutes: None, uptime_percentage: 100.0 };
        let (start, end) = period();
        let (compliance, _) = evaluate(&sla, &facts, start, end, Uuid::new_v4());

        assert!(compliance.rto_compliant);
    }

    #[test]
    fn uptime_below_threshold_breaches() {
        let sla = sample_sla();
        let facts = AssignmentFacts { assignment_id: Uuid::new_v4(), minutes_since_last_backup: Some(5), last_restore_minutes: None, uptime_percentage: 95.0 };
        let (start, end) = period();
        let (compliance, breaches) = evaluate(&sla, &facts, start, end, Uuid::new_v4());

        assert!(!compliance.uptime_compliant);
        assert!(breaches.iter().any(|b| b.dimension == "uptime"));
    }

    #[test]
    fn monthly_report_aggregates_compliance_rate() {
        let (start, end) = period();
        let compliant = SlaCompliance { id: Uuid::new_v4(), sla_id: Uuid::new_v4(), assignment_id: Uuid::new_v4(), period_start: start, period_end: end, rpo_compliant: true, rto_compliant: true, uptime_compliant: true };
        let non_compliant = SlaCompliance { rpo_compliant: false, ..compliant.clone() };

        let report = build_monthly_report(&[compliant, non_compliant], &[], &[]);
        assert!((report.compliance_rate_percent - 50.0).abs() < f64::EPSILON);
    }

    #[test]
    fn empty_compliance_set_reports_full_rate() {
        let report = build_monthly_report(&[], &[], &[]);
        assert!((report.compliance_rate_percent - 100.0).abs() < f64::EPSILON);
    }
}
