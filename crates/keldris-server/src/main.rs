//! Keldris server entry point.
//!
//! Bootstraps configuration and shared state, then runs the background
//! workers the concurrency model describes: the webhook retry pass (every
//! 10 s), the maintenance-window cache refresh, the database-backup cron
//! tick, and the agent-health retention sweep. The HTTP router/handler
//! layer itself is out of scope for this crate.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::{watch, RwLock};
use tracing::{info, warn};

use keldris_core::dbbackup::{self, DbBackupConfig};
use keldris_core::identity::oidc::OidcProviderHolder;
use keldris_core::identity::session::{SessionConfig, SessionStore};
use keldris_core::logstore::LogStore;
use keldris_core::retention::agent_health::AgentHealthRetentionScheduler;
use keldris_core::retention::maintenance::MaintenanceCache;
use keldris_core::webhook::dispatcher::{self, default_pool_size};

use keldris_server::config::Config;
use keldris_server::state::AppState;
use keldris_server::webhook_transport::ReqwestWebhookTransport;

const WEBHOOK_RETRY_POLL: Duration = Duration::from_secs(10);
const MAINTENANCE_REFRESH_POLL: Duration = Duration::from_secs(30);
const AGENT_HEALTH_SWEEP_POLL: Duration = Duration::from_secs(3600);
const WEBHOOK_RETRY_BATCH: usize = 100;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let config = match Config::from_env() {
        Ok(config) => config,
        Err(e) => return Err(fatal_startup_error(e)),
    };

    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(&config.log_level)))
        .json()
        .init();

    info!(bind_addr = %config.http_bind_addr, oidc_enabled = config.oidc.is_some(), "keldris starting");

    let state = Arc::new(build_state(config)?);

    let (shutdown_tx, shutdown_rx) = watch::channel(false);

    let webhook_handle = tokio::spawn(webhook_retry_worker(Arc::clone(&state), shutdown_rx.clone()));
    let maintenance_handle = tokio::spawn(maintenance_refresh_worker(Arc::clone(&state), shutdown_rx.clone()));
    let agent_health_handle = tokio::spawn(agent_health_retention_worker(Arc::clone(&state), shutdown_rx.clone()));
    let db_backup_handle = tokio::spawn(db_backup_worker(Arc::clone(&state), shutdown_rx));

    shutdown_signal().await;
    info!("shutdown signal received, stopping background workers");
    let _ = shutdown_tx.send(true);

    let _ = tokio::time::timeout(Duration::from_secs(10), async {
        let _ = tokio::join!(webhook_handle, maintenance_handle, agent_health_handle, db_backup_handle);
    })
    .await;

    info!("keldris stopped");
    Ok(())
}

/// Uses `eprintln` because structured logging is not yet available.
#[allow(clippy::print_stderr)]
fn fatal_startup_error(err: keldris_server::config::ConfigError) -> anyhow::Error {
    eprintln!("fatal startup error: {err}");
    anyhow::anyhow!(err)
}

fn build_state(config: Config) -> anyhow::Result<AppState> {
    let sessions = Arc::new(SessionStore::new(&config.session_secret, SessionConfig { max_age: Duration::from_secs(12 * 3600), idle_timeout: Duration::from_secs(30 * 60), secure_cookie: true })?);

    let db_backup_config = DbBackupConfig { backup_dir: config.db_backup_dir.clone(), cron: config.db_backup_cron.clone(), retention_days: config.db_backup_retention_days, ..DbBackupConfig::default() };

    Ok(AppState {
        config,
        sessions,
        oidc_provider: Arc::new(OidcProviderHolder::new()),
        maintenance: Arc::new(MaintenanceCache::new()),
        logs: Arc::new(LogStore::new(10_000, chrono::Duration::days(7))),
        agent_health_retention: Arc::new(AgentHealthRetentionScheduler::default()),
        http_client: reqwest::Client::new(),
        webhook_transport: Arc::new(ReqwestWebhookTransport::new()),
        backup_store: RwLock::new(None),
        agent_directory: RwLock::new(None),
        webhook_store: RwLock::new(None),
        webhook_endpoints: RwLock::new(None),
        maintenance_directory: RwLock::new(None),
        agent_health_store: RwLock::new(None),
        db_backup_store: RwLock::new(None),
        db_backup_runner: RwLock::new(None),
        db_backup_config,
    })
}

/// Poll every 10 s for deliveries due for retry and dispatch them through a
/// bounded worker pool, per the concurrency model's worker-pool contract.
async fn webhook_retry_worker(state: Arc<AppState>, mut shutdown: watch::Receiver<bool>) {
    let mut interval = tokio::time::interval(WEBHOOK_RETRY_POLL);
    info!("webhook retry worker started");

    loop {
        tokio::select! {
            _ = interval.tick() => {
                let store = state.webhook_store.read().await.clone();
                let directory = state.webhook_endpoints.read().await.clone();
                let (Some(store), Some(directory)) = (store, directory) else {
                    continue;
                };

                let endpoints = match directory.enabled_endpoints().await {
                    Ok(endpoints) => endpoints,
                    Err(e) => {
                        warn!(error = %e, "failed to list webhook endpoints for retry pass");
                        continue;
                    }
                };

                let result = dispatcher::run_retry_pass(Arc::clone(&state.webhook_transport), store, &endpoints, default_pool_size(), WEBHOOK_RETRY_BATCH, chrono::Utc::now()).await;
                if let Err(e) = result {
                    warn!(error = %e, "webhook retry pass failed");
                }
            }
            _ = shutdown.changed() => {
                info!("webhook retry worker shutting down");
                return;
            }
        }
    }
}

/// Refresh the maintenance-window cache on a fixed poll, since the cache
/// itself has no way to know when the underlying windows change.
async fn maintenance_refresh_worker(state: Arc<AppState>, mut shutdown: watch::Receiver<bool>) {
    let mut interval = tokio::time::interval(MAINTENANCE_REFRESH_POLL);
    info!("maintenance window refresh worker started");

    loop {
        tokio::select! {
            _ = interval.tick() => {
                let Some(directory) = state.maintenance_directory.read().await.clone() else {
                    continue;
                };

                match directory.active_windows_by_org(chrono::Utc::now()).await {
                    Ok(snapshot) => state.maintenance.refresh(snapshot).await,
                    Err(e) => warn!(error = %e, "failed to refresh maintenance window cache"),
                }
            }
            _ = shutdown.changed() => {
                info!("maintenance window refresh worker shutting down");
                return;
            }
        }
    }
}

/// Hourly single-flight sweep of expired agent-health rows.
async fn agent_health_retention_worker(state: Arc<AppState>, mut shutdown: watch::Receiver<bool>) {
    let mut interval = tokio::time::interval(AGENT_HEALTH_SWEEP_POLL);
    info!("agent health retention worker started");

    loop {
        tokio::select! {
            _ = interval.tick() => {
                let Some(store) = state.agent_health_store.read().await.clone() else {
                    continue;
                };

                match state.agent_health_retention.run_sweep(store.as_ref(), chrono::Utc::now()).await {
                    Some(Ok(deleted)) => info!(deleted, "agent health retention sweep complete"),
                    Some(Err(e)) => warn!(error = %e, "agent health retention sweep failed"),
                    None => {}
                }
            }
            _ = shutdown.changed() => {
                info!("agent health retention worker shutting down");
                return;
            }
        }
    }
}

/// Cron-driven database backup: ticks every minute and runs the pipeline
/// once the configured schedule is due, then sweeps expired backups.
async fn db_backup_worker(state: Arc<AppState>, mut shutdown: watch::Receiver<bool>) {
    let Ok(schedule) = keldris_core::scheduler::cron_engine::parse(&state.db_backup_config.cron) else {
        warn!(cron = %state.db_backup_config.cron, "invalid database backup cron expression, worker disabled");
        return;
    };

    let mut interval = tokio::time::interval(Duration::from_secs(60));
    let mut last_tick = chrono::Utc::now();
    info!("database backup worker started");

    loop {
        tokio::select! {
            _ = interval.tick() => {
                let now = chrono::Utc::now();
                if !keldris_core::scheduler::cron_engine::is_due(&schedule, last_tick, now) {
                    last_tick = now;
                    continue;
                }
                last_tick = now;

                let store = state.db_backup_store.read().await.clone();
                let runner = state.db_backup_runner.read().await.clone();
                let (Some(store), Some(runner)) = (store, runner) else {
                    continue;
                };

                match master_key(&state) {
                    Ok(key) => match dbbackup::run_backup(runner.as_ref(), &state.db_backup_config, &key, now).await {
                        Ok(record) => {
                            if let Err(e) = store.insert(record).await {
                                warn!(error = %e, "failed to persist database backup record");
                            }
                        }
                        Err(e) => warn!(error = %e, "database backup run failed"),
                    },
                    Err(e) => warn!(error = %e, "invalid master key, skipping database backup"),
                }

                if let Err(e) = dbbackup::run_retention_sweep(store.as_ref(), &state.db_backup_config, now).await {
                    warn!(error = %e, "database backup retention sweep failed");
                }
            }
            _ = shutdown.changed() => {
                info!("database backup worker shutting down");
                return;
            }
        }
    }
}

fn master_key(state: &AppState) -> Result<keldris_core::crypto::MasterKey, keldris_core::error::CryptoError> {
    keldris_core::crypto::MasterKey::from_bytes(&state.config.master_key)
}

async fn shutdown_signal() {
    let ctrl_c = async {
        tokio::signal::ctrl_c().await.ok();
    };

    #[cfg(unix)]
    let terminate = async {
        if let Ok(mut sig) = tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            sig.recv().await;
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        () = ctrl_c => {},
        () = terminate => {},
    }
}
