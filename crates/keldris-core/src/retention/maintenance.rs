//! Maintenance-window cache and notifier (component C7).
//!
//! A cached `orgId -> active windows` map is refreshed on a timer and on
//! explicit notification; reads take the cache's reader lock, so
//! `is_maintenance_active` never blocks on the same I/O that populates the
//! cache. Never hold the writer lock across the database query that
//! produces a fresh snapshot.

use std::collections::HashMap;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use tokio::sync::RwLock;
use uuid::Uuid;

use crate::models::MaintenanceWindow;
use crate::scheduler::dispatcher::MaintenanceGate;

/// Reader-writer-locked cache of each org's maintenance windows.
pub struct MaintenanceCache {
    windows: RwLock<HashMap<Uuid, Vec<MaintenanceWindow>>>,
}

impl Default for MaintenanceCache {
    fn default() -> Self {
        Self::new()
    }
}

impl MaintenanceCache {
    #[must_use]
    pub fn new() -> Self {
        Self { windows: RwLock::new(HashMap::new()) }
    }

    /// Replace the entire cache with a freshly loaded snapshot. Callers
    /// build `snapshot` from storage *before* calling this, so the writer
    /// lock is only held for the swap.
    pub async fn refresh(&self, snapshot: HashMap<Uuid, Vec<MaintenanceWindow>>) {
        let mut guard = self.windows.write().await;
        *guard = snapshot;
    }

    /// O(active-windows) scan under the reader lock.
    #[must_use]
    pub async fn is_maintenance_active(&self, org_id: Uuid, now: DateTime<Utc>) -> bool {
        self.active_window(org_id, now).await.is_some()
    }

    /// The first currently-active window for `org_id`, by insertion order.
    #[must_use]
    pub async fn active_window(&self, org_id: Uuid, now: DateTime<Utc>) -> Option<MaintenanceWindow> {
        let guard = self.windows.read().await;
        guard.get(&org_id)?.iter().find(|w| w.is_active_at(now)).cloned()
    }
}

#[async_trait]
impl MaintenanceGate for MaintenanceCache {
    async fn is_active(&self, org_id: Uuid) -> bool {
        self.is_maintenance_active(org_id, Utc::now()).await
    }
}

/// Narrow store interface for the notifier pass.
#[async_trait]
pub trait MaintenanceNotificationStore: Send + Sync {
    /// Windows not yet notified whose `notify_before_minutes` threshold has
    /// arrived, across all orgs.
    async fn pending_notifications(&self, now: DateTime<Utc>) -> Result<Vec<MaintenanceWindow>, String>;
    /// Mark a window notified. Implementations should persist this under the
    /// same transaction as emitting the notification, to avoid a duplicate
    /// send on retry.
    async fn mark_notified(&self, id: Uuid) -> Result<(), String>;
}

/// Scan for windows due for a pre-start notification, emit via `notify`, and
/// mark each sent. Returns the ids that were notified.
pub async fn run_notification_pass(
    store: &dyn MaintenanceNotificationStore,
    notify: &dyn Fn(&MaintenanceWindow),
    now: DateTime<Utc>,
) -> Result<Vec<Uuid>, String> {
    let pending = store.pending_notifications(now).await?;
    let mut notified = Vec::with_capacity(pending.len());

    for window in &pending {
        if !window.should_notify_at(now) {
            continue;
        }
        notify(window);
        store.mark_notified(window.id).await?;
        notified.push(window.id);
    }

    Ok(notified)
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use std::sync::Mutex;

    fn window(org_id: Uuid, starts_at: DateTime<Utc>, ends_at: DateTime<Utc>, notify_before_minutes: i32, notification_sent: bool) -> MaintenanceWindow {
        MaintenanceWindow { id: Uuid::new_v4(), org_id, title: "maintenance".to_owned(), starts_at, ends_at, notify_before_minutes, notification_sent }
    }

    #[tokio::test]
    async fn active_window_found_within_bounds() {
        let cache = MaintenanceCache::new();
        let org = Uuid::new_v4();
        let now = Utc::now();
        let w = window(org, now - chrono::Duration::minutes(5), now + chrono::Duration::minutes(5), 0, false);
        cache.refresh(HashMap::from([(org, vec![w])])).await;

        assert!(cache.is_maintenance_active(org, now).await);
    }

    #[tokio::test]
    async fn no_window_for_unknown_org() {
        let cache = MaintenanceCache::new();
        assert!(!cache.is_maintenance_active(Uuid::new_v4(), Utc::now()).await);
    }

    #[tokio::test]
    async fn refresh_replaces_stale_entries() {
        let cache = MaintenanceCache::new();
        let org = Uuid::new_v4();
        let now = Utc::now();
        let stale = window(org, now - chrono::Duration::hours(2), now - chrono::Duration::hours(1), 0, false);
        cache.refresh(HashMap::from([(org, vec![stale])])).await;
        assert!(!cache.is_maintenance_active(org, now).await);

        let fresh = window(org, now - chrono::Duration::minutes(1), now + chrono::Duration::minutes(1), 0, false);
        cache.refresh(HashMap::from([(org, vec![fresh])])).await;
        assert!(cache.is_maintenance_active(org, now).await);
    }

    #[derive(Default)]
    struct FakeNotificationStore {
        windows: Mutex<Vec<MaintenanceWindow>>,
    }

    #[async_trait]
    impl MaintenanceNotificationStore for FakeNotificationStore {
        async fn pending_notifications(&self, _now: DateTime<Utc>) -> Result<Vec<MaintenanceWindow>, String> {
            Ok(self.windows.lock().unwrap().iter().filter(|w| !w.notification_sent).cloned().collect())
        }
        async fn mark_notified(&self, id: Uuid) -> Result<(), String> {
            if let Some(w) = self.windows.lock().unwrap().iter_mut().find(|w| w.id == id) {
                w.notification_sent = true;
            }
            Ok(())
        }
    }

    #[tokio::test]
    async fn notification_pass_fires_and_marks_sent() {
        let now = Utc::now();
        let w = window(Uuid::new_v4(), now + chrono::Duration::minutes(5), now + chrono::Duration::hours(1), 10, false);
        let store = FakeNotificationStore { windows: Mutex::new(vec![w.clone()]) };

        let fired = std::sync::Mutex::new(Vec::new());
        let notified = run_notification_pass(&store, &|window| fired.lock().unwrap().push(window.id), now).await.unwrap();

        assert_eq!(notified, vec![w.id]);
        assert_eq!(fired.lock().unwrap().as_slice(), [w.id]);
    }

    #[tokio::test]
    async fn already_notified_is_not_refired() {
        let now = Utc::now();
        let w = window(Uuid::new_v4(), now + chrono::Duration::minutes(1), now + chrono::Duration::hours(1), 10, true);
        let store = FakeNotificationStore { windows: Mutex::new(vec![w]) };

        let notified = run_notification_pass(&store, &|_| panic!("should not fire"), now).await.unwrap();
        assert!(notified.is_empty());
    }
}
