//! Backup dispatch (component C6).
//!
//! Ordering within a single schedule run is fixed: maintenance-gate →
//! concurrency-gate → repository-selection → backup → retention. Each stage
//! is exposed as its own function so the ordering is visible at the call
//! site in [`dispatch_one`] rather than buried in a single monolith.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use uuid::Uuid;

use crate::error::SchedulerError;
use crate::models::{Agent, Backup, BackupStatus, BackupWindow, Policy, Schedule, ScheduleTarget};
use crate::scheduler::restic::{BackupRequest, ResolvedRepository, ResticDriver, RetentionResult};

/// Maximum retry attempts for a transient restic failure, absent a
/// schedule-specific override.
const DEFAULT_MAX_RETRIES: u32 = 5;
const BASE_BACKOFF_SECONDS: u64 = 10;
const MAX_BACKOFF_SECONDS: u64 = 600;

#[async_trait]
pub trait MaintenanceGate: Send + Sync {
    async fn is_active(&self, org_id: Uuid) -> bool;
}

#[async_trait]
pub trait BackupStore: Send + Sync {
    async fn running_count_for_org(&self, org_id: Uuid) -> Result<u32, String>;
    async fn insert(&self, backup: Backup) -> Result<(), String>;
    async fn update(&self, backup: &Backup) -> Result<(), String>;
}

#[async_trait]
pub trait AgentDirectory: Send + Sync {
    async fn resolve_targets(&self, target: ScheduleTarget) -> Result<Vec<Agent>, String>;
}

/// Result of attempting to dispatch one `(schedule, agent)` pair.
#[derive(Debug)]
pub enum DispatchOutcome {
    SkippedMaintenance,
    Queued,
    OutsideBackupWindow,
    NoHealthyRepository,
    Started { backup: Backup, retention: Option<RetentionResult> },
    Failed { backup: Backup },
}

/// Pick the first enabled candidate (ascending priority) whose repository
/// passes a health check.
pub async fn select_repository(
    driver: &dyn ResticDriver,
    candidates: &[crate::models::ScheduleRepository],
    resolve: &dyn Fn(Uuid) -> Option<ResolvedRepository>,
) -> Option<(Uuid, ResolvedRepository)> {
    let mut sorted: Vec<_> = candidates.iter().filter(|c| c.enabled).collect();
    sorted.sort_by_key(|c| c.priority);

    for candidate in sorted {
        let Some(resolved) = resolve(candidate.repo_id) else { continue };
        if driver.health_check(&resolved).await {
            return Some((candidate.repo_id, resolved));
        }
    }
    None
}

/// True if `now` falls inside `window` and is not in `excluded_hours`.
#[must_use]
pub fn within_backup_window(window: Option<&BackupWindow>, excluded_hours: &[i16], now: DateTime<Utc>) -> bool {
    use chrono::{Datelike, Timelike};

    let hour = i16::try_from(now.hour()).unwrap_or(0);
    if excluded_hours.contains(&hour) {
        return false;
    }

    let Some(window) = window else { return true };

    let day = now.weekday().num_days_from_sunday() as u8;
    if !window.days_of_week.is_empty() && !window.days_of_week.contains(&day) {
        return false;
    }

    let hour = now.hour() as u8;
    if window.start_hour <= window.end_hour {
        window.start_hour <= hour && hour < window.end_hour
    } else {
        // Window wraps past midnight, e.g. 22-6.
        hour >= window.start_hour || hour < window.end_hour
    }
}

/// Capped exponential backoff for retry attempt `attempt` (1-indexed).
#[must_use]
pub fn backoff_for_attempt(attempt: u32) -> std::time::Duration {
    let seconds = BASE_BACKOFF_SECONDS.saturating_mul(2u64.saturating_pow(attempt.saturating_sub(1)));
    std::time::Duration::from_secs(seconds.min(MAX_BACKOFF_SECONDS))
}

/// Whether a failed attempt should be retried, given its 1-indexed attempt
/// number and the schedule's configured retry limit (falling back to the
/// default when unset).
#[must_use]
pub fn should_retry(attempt: u32, max_retries: Option<u32>, retryable: bool) -> bool {
    retryable && attempt < max_retries.unwrap_or(DEFAULT_MAX_RETRIES)
}

/// Dispatch one `(schedule, agent)` pair through the full gate pipeline.
///
/// `resolve_repo` and `policy` are supplied by the caller (already loaded
/// from storage) so this function stays free of any storage dependency
/// beyond the narrow traits above.
pub async fn dispatch_one(
    maintenance_gate: &dyn MaintenanceGate,
    backup_store: &dyn BackupStore,
    driver: &dyn ResticDriver,
    org_id: Uuid,
    max_concurrent_backups: Option<i32>,
    schedule: &Schedule,
    agent: &Agent,
    policy: Option<&Policy>,
    backup_window: Option<&BackupWindow>,
    resolve_repo: &dyn Fn(Uuid) -> Option<ResolvedRepository>,
    now: DateTime<Utc>,
) -> Result<DispatchOutcome, SchedulerError> {
    if maintenance_gate.is_active(org_id).await {
        return Ok(DispatchOutcome::SkippedMaintenance);
    }

    let effective = schedule.effective(policy);

    if !within_backup_window(backup_window, &effective.excluded_hours, now) {
        return Ok(DispatchOutcome::OutsideBackupWindow);
    }

    let running = backup_store.running_count_for_org(org_id).await.map_err(SchedulerError::Store)?;
    if let Some(max) = max_concurrent_backups {
        if running >= max as u32 {
            return Ok(DispatchOutcome::Queued);
        }
    }

    let Some((repo_id, resolved)) = select_repository(driver, &schedule.repositories, resolve_repo).await else {
        return Ok(DispatchOutcome::NoHealthyRepository);
    };

    let mut backup = Backup {
        id: Uuid::new_v4(),
        schedule_id: schedule.id,
        agent_id: agent.id,
        repo_id,
        status: BackupStatus::Running,
        snapshot_id: None,
        started_at: now,
        finished_at: None,
        size_bytes: None,
        error_message: None,
    };
    backup_store.insert(backup.clone()).await.map_err(SchedulerError::Store)?;

    let request = BackupRequest {
        paths: effective.paths,
        excludes: effective.excludes,
        bandwidth_limit_kb: effective.bandwidth_limit_kb,
        repository: resolved.clone(),
    };

    match driver.backup(&request).await {
        Ok(summary) => {
            backup.transition(BackupStatus::Completed).map_err(|_| SchedulerError::Store("invalid status transition".to_owned()))?;
            backup.snapshot_id = Some(summary.snapshot_id);
            backup.size_bytes = Some(summary.total_bytes_processed);
            backup.finished_at = Some(now);
            backup_store.update(&backup).await.map_err(SchedulerError::Store)?;

            let retention = if effective.retention_policy.is_valid() {
                Some(driver.forget(&resolved, &effective.retention_policy, false).await?)
            } else {
                None
            };

            Ok(DispatchOutcome::Started { backup, retention })
        }
        Err(err) => {
            backup.transition(BackupStatus::Failed).map_err(|_| SchedulerError::Store("invalid status transition".to_owned()))?;
            backup.error_message = Some(err.to_string());
            backup.finished_at = Some(now);
            backup_store.update(&backup).await.map_err(SchedulerError::Store)?;
            Ok(DispatchOutcome::Failed { backup })
        }
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use crate::models::RetentionPolicy;

    #[test]
    fn backoff_grows_and_caps() {
        assert_eq!(backoff_for_attempt(1), std::time::Duration::from_secs(10));
        assert_eq!(backoff_for_attempt(2), std::time::Duration::from_secs(20));
        assert_eq!(backoff_for_attempt(10), std::time::Duration::from_secs(MAX_BACKOFF_SECONDS));
    }

    #[test]
    fn should_retry_respects_limit_and_retryability() {
        assert!(should_retry(1, Some(3), true));
        assert!(!should_retry(3, Some(3), true));
        assert!(!should_retry(1, Some(3), false));
    }

    #[test]
    fn window_excludes_hour_regardless_of_window_presence() {
        let now = DateTime::parse_from_rfc3339("2026-01-05T14:00:00Z").unwrap().with_timezone(&Utc);
        assert!(!within_backup_window(None, &[14], now));
    }

    #[test]
    fn no_window_and_not_excluded_allows_any_hour() {
        let now = DateTime::parse_from_rfc3339("2026-01-05T14:00:00Z").unwrap().with_timezone(&Utc);
        assert!(within_backup_window(None, &[], now));
    }

    #[test]
    fn window_restricts_to_configured_hours() {
        let window = BackupWindow { start_hour: 22, end_hour: 6, days_of_week: vec![] };
        let inside = DateTime::parse_from_rfc3339("2026-01-05T23:00:00Z").unwrap().with_timezone(&Utc);
        let outside = DateTime::parse_from_rfc3339("2026-01-05T12:00:00Z").unwrap().with_timezone(&Utc);
        assert!(within_backup_window(Some(&window), &[], inside));
        assert!(!within_backup_window(Some(&window), &[], outside));
    }

    #[test]
    fn window_restricts_days_of_week() {
        // 2026-01-05 is a Monday (day 1); restrict to Sundays (0) only.
        let window = BackupWindow { start_hour: 0, end_hour: 23, days_of_week: vec![0] };
        let monday = DateTime::parse_from_rfc3339("2026-01-05T10:00:00Z").unwrap().with_timezone(&Utc);
        assert!(!within_backup_window(Some(&window), &[], monday));
    }

    struct AlwaysInactive;
    #[async_trait]
    impl MaintenanceGate for AlwaysInactive {
        async fn is_active(&self, _org_id: Uuid) -> bool {
            false
        }
    }

    struct AlwaysActive;
    #[async_trait]
    impl MaintenanceGate for AlwaysActive {
        async fn is_active(&self, _org_id: Uuid) -> bool {
            true
        }
    }

    #[derive(Default)]
    struct FakeBackupStore {
        running: std::sync::atomic::AtomicU32,
        inserted: tokio::sync::Mutex<Vec<Backup>>,
    }

    #[async_trait]
    impl BackupStore for FakeBackupStore {
        async fn running_count_for_org(&self, _org_id: Uuid) -> Result<u32, String> {
            Ok(self.running.load(std::sync::atomic::Ordering::SeqCst))
        }
        async fn insert(&self, backup: Backup) -> Result<(), String> {
            self.inserted.lock().await.push(backup);
            Ok(())
        }
        async fn update(&self, backup: &Backup) -> Result<(), String> {
            let mut guard = self.inserted.lock().await;
            if let Some(existing) = guard.iter_mut().find(|b| b.id == backup.id) {
                *existing = backup.clone();
            }
            Ok(())
        }
    }

    struct FakeDriver {
        healthy: bool,
        backup_ok: bool,
    }

    #[async_trait]
    impl ResticDriver for FakeDriver {
        async fn backup(&self, _request: &BackupRequest) -> Result<crate::scheduler::restic::ResticBackupSummary, SchedulerError> {
            if self.backup_ok {
                Ok(crate::scheduler::restic::ResticBackupSummary { snapshot_id: "snap1".to_owned(), total_bytes_processed: 1024 })
            } else {
                Err(SchedulerError::ResticFailed("boom".to_owned()))
            }
        }
        async fn forget(&self, _repository: &ResolvedRepository, _policy: &RetentionPolicy, _prune: bool) -> Result<RetentionResult, SchedulerError> {
            Ok(RetentionResult::default())
        }
        async fn health_check(&self, _repository: &ResolvedRepository) -> bool {
            self.healthy
        }
    }

    fn sample_schedule() -> Schedule {
        Schedule {
            id: Uuid::new_v4(),
            org_id: Uuid::new_v4(),
            target: ScheduleTarget::Agent(Uuid::new_v4()),
            policy_id: None,
            cron: "0 0 * * * *".to_owned(),
            paths: vec!["/data".to_owned()],
            excludes: vec![],
            retention_policy: RetentionPolicy { keep_last: 5, ..Default::default() },
            repositories: vec![crate::models::ScheduleRepository { repo_id: Uuid::new_v4(), priority: 0, enabled: true }],
            enabled: true,
            backup_type: crate::models::BackupType::Full,
        }
    }

    fn sample_agent() -> Agent {
        Agent {
            id: Uuid::new_v4(),
            org_id: Uuid::new_v4(),
            hostname: "host-a".to_owned(),
            api_key_hash: "h".to_owned(),
            status: crate::models::AgentStatus::Active,
            os_info: "linux".to_owned(),
            debug_mode: false,
            network_mounts: vec![],
        }
    }

    #[tokio::test]
    async fn maintenance_window_skips_dispatch() {
        let store = FakeBackupStore::default();
        let driver = FakeDriver { healthy: true, backup_ok: true };
        let schedule = sample_schedule();
        let agent = sample_agent();

        let outcome = dispatch_one(
            &AlwaysActive, &store, &driver, schedule.org_id, None, &schedule, &agent, None, None,
            &|repo_id| Some(ResolvedRepository { repo_type: crate::models::RepositoryType::Local, connection_string: repo_id.to_string(), password: "x".to_owned() }),
            Utc::now(),
        )
        .await
        .unwrap();

        assert!(matches!(outcome, DispatchOutcome::SkippedMaintenance));
    }

    #[tokio::test]
    async fn concurrency_gate_queues_when_full() {
        let store = FakeBackupStore::default();
        store.running.store(2, std::sync::atomic::Ordering::SeqCst);
        let driver = FakeDriver { healthy: true, backup_ok: true };
        let schedule = sample_schedule();
        let agent = sample_agent();

        let outcome = dispatch_one(
            &AlwaysInactive, &store, &driver, schedule.org_id, Some(2), &schedule, &agent, None, None,
            &|repo_id| Some(ResolvedRepository { repo_type: crate::models::RepositoryType::Local, connection_string: repo_id.to_string(), password: "x".to_owned() }),
            Utc::now(),
        )
        .await
        .unwrap();

        assert!(matches!(outcome, DispatchOutcome::Queued));
    }

    #[tokio::test]
    async fn no_healthy_repository_fails_selection() {
        let store = FakeBackupStore::default();
        let driver = FakeDriver { healthy: false, backup_ok: true };
        let schedule = sample_schedule();
        let agent = sample_agent();

        let outcome = dispatch_one(
            &AlwaysInactive, &store, &driver, schedule.org_id, None, &schedule, &agent, None, None,
            &|repo_id| Some(ResolvedRepository { repo_type: crate::models::RepositoryType::Local, connection_string: repo_id.to_string(), password: "x".to_owned() }),
            Utc::now(),
        )
        .await
        .unwrap();

        assert!(matches!(outcome, DispatchOutcome::NoHealthyRepository));
    }

    #[tokio::test]
    async fn successful_backup_runs_retention_and_completes() {
        let store = FakeBackupStore::default();
        let driver = FakeDriver { healthy: true, backup_ok: true };
        let schedule = sample_schedule();
        let agent = sample_agent();

        let outcome = dispatch_one(
            &AlwaysInactive, &store, &driver, schedule.org_id, None, &schedule, &agent, None, None,
            &|repo_id| Some(ResolvedRepository { repo_type: crate::models::RepositoryType::Local, connection_string: repo_id.to_string(), password: "x".to_owned() }),
            Utc::now(),
        )
        .await
        .unwrap();

        match outcome {
            DispatchOutcome::Started { backup, retention } => {
                assert_eq!(backup.status, BackupStatus::Completed);
                assert!(retention.is_some());
            }
            other => panic!("expected Started, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn failed_backup_transitions_to_failed() {
        let store = FakeBackupStore::default();
        let driver = FakeDriver { healthy: true, backup_ok: false };
        let schedule = sample_schedule();
        let agent = sample_agent();

        let outcome = dispatch_one(
            &AlwaysInactive, &store, &driver, schedule.org_id, None, &schedule, &agent, None, None,
            &|repo_id| Some(ResolvedRepository { repo_type: crate::models::RepositoryType::Local, connection_string: repo_id.to_string(), password: "x".to_owned() }),
            Utc::now(),
        )
        .await
        .unwrap();

        match outcome {
            DispatchOutcome::Failed { backup } => assert_eq!(backup.status, BackupStatus::Failed),
            other => panic!("expected Failed, got {other:?}"),
        }
    }
}
