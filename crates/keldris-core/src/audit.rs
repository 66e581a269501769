//! Append-only audit log writer.
//!
//! Audit writes are best-effort: a storage failure is logged and swallowed
//! rather than propagated, so a broken audit sink never fails the operation
//! it was recording.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde_json::Value;
use uuid::Uuid;

use crate::models::AuditLog;

#[async_trait]
pub trait AuditStore: Send + Sync {
    async fn insert(&self, entry: AuditLog) -> Result<(), String>;
}

/// One audit event to record, before the store-agnostic fields (`id`,
/// `timestamp`) are filled in.
#[derive(Debug, Clone)]
pub struct AuditEvent {
    pub org_id: Uuid,
    pub user_id: Option<Uuid>,
    pub acted_on_behalf_of: Option<Uuid>,
    pub action: String,
    pub resource: String,
    pub result: String,
    pub ip: String,
    pub user_agent: String,
    pub details: Value,
}

/// Record one audit event. Failures are logged at `warn` and swallowed —
/// callers never see an audit-store outage as their own operation failing.
pub async fn record(store: &dyn AuditStore, event: AuditEvent, now: DateTime<Utc>) {
    let entry = AuditLog {
        id: Uuid::new_v4(),
        org_id: event.org_id,
        user_id: event.user_id,
        acted_on_behalf_of: event.acted_on_behalf_of,
        action: event.action.clone(),
        resource: event.resource.clone(),
        result: event.result.clone(),
        ip: event.ip,
        user_agent: event.user_agent,
        details: event.details,
        timestamp: now,
    };

    if let Err(e) = store.insert(entry).await {
        tracing::warn!(error = %e, action = %event.action, resource = %event.resource, "failed to write audit log entry");
    }
}
