//! Shared application state for the Keldris server.
//!
//! A single [`AppState`] is constructed at startup and shared across all
//! request handlers via `Arc`. Concrete database-backed implementations of
//! the store traits (`BackupStore`, `WebhookDeliveryStore`, `DbBackupStore`,
//! …) are a database-driver concern left to the deployment; this struct
//! holds them as trait objects so the core components never know which
//! storage backend is plugged in.

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use tokio::sync::RwLock;
use uuid::Uuid;

use keldris_core::dbbackup::{DbBackupConfig, DbBackupStore, PgDumpRunner};
use keldris_core::identity::oidc::OidcProviderHolder;
use keldris_core::identity::session::SessionStore;
use keldris_core::logstore::LogStore;
use keldris_core::models::{MaintenanceWindow, WebhookEndpoint};
use keldris_core::retention::agent_health::{AgentHealthRetentionScheduler, AgentHealthStore};
use keldris_core::retention::maintenance::MaintenanceCache;
use keldris_core::scheduler::dispatcher::{AgentDirectory, BackupStore};
use keldris_core::webhook::dispatcher::{WebhookDeliveryStore, WebhookTransport};

use crate::config::Config;

/// Supplies the current set of enabled webhook endpoints for a retry pass.
/// A thin query boundary over whatever database layer a deployment plugs
/// in — `keldris-core` only knows how to dispatch to endpoints once handed
/// to it, not how to list them.
#[async_trait]
pub trait WebhookEndpointDirectory: Send + Sync {
    async fn enabled_endpoints(&self) -> Result<HashMap<Uuid, WebhookEndpoint>, String>;
}

/// Supplies the current maintenance-window snapshot used to refresh
/// [`MaintenanceCache`].
#[async_trait]
pub trait MaintenanceWindowDirectory: Send + Sync {
    async fn active_windows_by_org(&self, now: DateTime<Utc>) -> Result<HashMap<Uuid, Vec<MaintenanceWindow>>, String>;
}

/// Shared application state passed to all HTTP handlers and background
/// workers.
pub struct AppState {
    pub config: Config,

    /// Session cookie store; holds the signing/encryption secret behind a
    /// reader-writer lock so it can be rotated without holding the lock
    /// across I/O.
    pub sessions: Arc<SessionStore>,
    /// Cached OIDC provider, hot-reloadable via `swap`.
    pub oidc_provider: Arc<OidcProviderHolder>,
    /// Active maintenance windows per organization.
    pub maintenance: Arc<MaintenanceCache>,
    /// Ring-buffered in-memory log store.
    pub logs: Arc<LogStore>,
    /// Single-flight guard around the agent-health retention sweep.
    pub agent_health_retention: Arc<AgentHealthRetentionScheduler>,

    /// HTTP client shared by the webhook transport and OIDC discovery —
    /// built once so connection pools are reused.
    pub http_client: reqwest::Client,
    pub webhook_transport: Arc<dyn WebhookTransport>,

    /// Persistence boundaries. `None` until a concrete backend is wired in
    /// by the deployment; core components treat an absent store the same
    /// way they treat a store error (logged, best-effort paths swallow it).
    pub backup_store: RwLock<Option<Arc<dyn BackupStore>>>,
    pub agent_directory: RwLock<Option<Arc<dyn AgentDirectory>>>,
    pub webhook_store: RwLock<Option<Arc<dyn WebhookDeliveryStore>>>,
    pub webhook_endpoints: RwLock<Option<Arc<dyn WebhookEndpointDirectory>>>,
    pub maintenance_directory: RwLock<Option<Arc<dyn MaintenanceWindowDirectory>>>,
    pub agent_health_store: RwLock<Option<Arc<dyn AgentHealthStore>>>,
    pub db_backup_store: RwLock<Option<Arc<dyn DbBackupStore>>>,
    pub db_backup_runner: RwLock<Option<Arc<dyn PgDumpRunner>>>,
    pub db_backup_config: DbBackupConfig,
}

impl std::fmt::Debug for AppState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AppState").finish_non_exhaustive()
    }
}
