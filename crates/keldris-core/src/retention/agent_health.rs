//! Agent-health history retention scheduler (component C7).
//!
//! A daily 03:00-UTC job deletes agent-health rows older than the configured
//! horizon (default 90 days). A manual trigger is permitted concurrently
//! with the scheduled run; a `running` flag (guarded the same way the
//! teacher guards its single-flight state) prevents two sweeps from racing
//! each other, while still letting the caller observe that a sweep is
//! already in progress rather than blocking on it.

use chrono::{DateTime, Utc};
use tokio::sync::RwLock;

const DEFAULT_RETENTION_DAYS: i64 = 90;

/// Narrow store interface for the agent-health sweep.
#[async_trait::async_trait]
pub trait AgentHealthStore: Send + Sync {
    /// Delete rows with a timestamp older than `cutoff`, returning the
    /// number of rows removed.
    async fn delete_older_than(&self, cutoff: DateTime<Utc>) -> Result<u64, String>;
}

pub struct AgentHealthRetentionScheduler {
    retention_days: i64,
    running: RwLock<bool>,
}

impl Default for AgentHealthRetentionScheduler {
    fn default() -> Self {
        Self::new(DEFAULT_RETENTION_DAYS)
    }
}

impl AgentHealthRetentionScheduler {
    #[must_use]
    pub fn new(retention_days: i64) -> Self {
        Self { retention_days, running: RwLock::new(false) }
    }

    /// Run a sweep if one is not already in progress. Returns `None` when a
    /// concurrent sweep is already running rather than queuing behind it.
    pub async fn run_sweep(&self, store: &dyn AgentHealthStore, now: DateTime<Utc>) -> Option<Result<u64, String>> {
        {
            let mut guard = self.running.write().await;
            if *guard {
                return None;
            }
            *guard = true;
        }

        let cutoff = now - chrono::Duration::days(self.retention_days);
        let result = store.delete_older_than(cutoff).await;

        *self.running.write().await = false;
        Some(result)
    }

    #[must_use]
    pub async fn is_running(&self) -> bool {
        *self.running.read().await
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU64, Ordering};

    struct FakeStore {
        last_cutoff: std::sync::Mutex<Option<DateTime<Utc>>>,
        deleted: AtomicU64,
    }

    #[async_trait::async_trait]
    impl AgentHealthStore for FakeStore {
        async fn delete_older_than(&self, cutoff: DateTime<Utc>) -> Result<u64, String> {
            *self.last_cutoff.lock().unwrap() = Some(cutoff);
            Ok(self.deleted.load(Ordering::SeqCst))
        }
    }

    #[tokio::test]
    async fn sweep_uses_configured_retention_horizon() {
        let scheduler = AgentHealthRetentionScheduler::new(30);
        let store = FakeStore { last_cutoff: std::sync::Mutex::new(None), deleted: AtomicU64::new(4) };
        let now = Utc::now();

        let result = scheduler.run_sweep(&store, now).await.unwrap().unwrap();
        assert_eq!(result, 4);

        let cutoff = store.last_cutoff.lock().unwrap().unwrap();
        assert_eq!(cutoff, now - chrono::Duration::days(30));
    }

    #[tokio::test]
    async fn default_horizon_is_ninety_days() {
        let scheduler = AgentHealthRetentionScheduler::default();
        let store = FakeStore { last_cutoff: std::sync::Mutex::new(None), deleted: AtomicU64::new(0) };
        let now = Utc::now();
        scheduler.run_sweep(&store, now).await.unwrap().unwrap();
        assert_eq!(store.last_cutoff.lock().unwrap().unwrap(), now - chrono::Duration::days(90));
    }

    #[tokio::test]
    async fn is_running_reflects_flag_state_after_sweep() {
        let scheduler = AgentHealthRetentionScheduler::default();
        let store = FakeStore { last_cutoff: std::sync::Mutex::new(None), deleted: AtomicU64::new(0) };
        assert!(!scheduler.is_running().await);
        scheduler.run_sweep(&store, Utc::now()).await.unwrap().unwrap();
        assert!(!scheduler.is_running().await);
    }
}
