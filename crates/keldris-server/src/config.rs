//! Server configuration for Keldris.
//!
//! Loads configuration from environment variables. Unlike most knobs here,
//! `SESSION_SECRET` and `MASTER_KEY` are mandatory: a missing or malformed
//! value fails startup (exit code 1) rather than falling back to a default,
//! since both gate cryptographic material.

use base64::Engine;

/// Server configuration, loaded once at startup.
#[derive(Clone)]
pub struct Config {
    pub database_url: Option<String>,
    /// Raw session-signing secret, already base64-decoded. At least 32 bytes.
    pub session_secret: Vec<u8>,
    /// Raw AES-256-GCM master key, already base64-decoded. Exactly 32 bytes.
    pub master_key: Vec<u8>,
    pub oidc: Option<OidcConfig>,
    pub http_bind_addr: String,
    pub db_backup_dir: String,
    pub db_backup_cron: String,
    pub db_backup_retention_days: i64,
    pub log_level: String,
}

#[derive(Clone)]
pub struct OidcConfig {
    pub issuer: String,
    pub client_id: String,
    pub client_secret: String,
    pub redirect_url: String,
}

/// Errors that can occur while loading configuration from the environment.
/// Every variant here is a fatal startup error per the exit-code
/// contract (0 = normal shutdown, 1 = fatal startup error).
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("SESSION_SECRET is not set")]
    MissingSessionSecret,

    #[error("SESSION_SECRET is not valid base64: {0}")]
    InvalidSessionSecretEncoding(String),

    #[error("SESSION_SECRET decodes to {actual} bytes, need at least 32")]
    SessionSecretTooShort { actual: usize },

    #[error("MASTER_KEY is not set")]
    MissingMasterKey,

    #[error("MASTER_KEY is not valid base64: {0}")]
    InvalidMasterKeyEncoding(String),

    #[error("MASTER_KEY decodes to {actual} bytes, need exactly 32")]
    InvalidMasterKeyLength { actual: usize },
}

impl Config {
    /// Load configuration from the environment.
    ///
    /// Environment variables:
    /// - `DATABASE_URL` — Postgres DSN.
    /// - `SESSION_SECRET` — base64-encoded, decodes to ≥ 32 raw bytes.
    /// - `MASTER_KEY` — base64-encoded, decodes to exactly 32 raw bytes.
    /// - `OIDC_ISSUER`, `OIDC_CLIENT_ID`, `OIDC_CLIENT_SECRET`, `OIDC_REDIRECT_URL`
    ///   — optional as a group; if `OIDC_ISSUER` is unset, OIDC is disabled
    ///   (password-only login).
    /// - `HTTP_BIND_ADDR` — default `:8080`.
    /// - `DB_BACKUP_DIR` — default `/var/lib/keldris/backups`.
    /// - `DB_BACKUP_CRON` — default `0 0 2 * * *`.
    /// - `DB_BACKUP_RETENTION_DAYS` — default `30`.
    /// - `KELDRIS_LOG_LEVEL` — default `info`.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError`] if `SESSION_SECRET` or `MASTER_KEY` is
    /// missing or malformed.
    pub fn from_env() -> Result<Self, ConfigError> {
        let database_url = std::env::var("DATABASE_URL").ok();

        let session_secret_raw = std::env::var("SESSION_SECRET").map_err(|_| ConfigError::MissingSessionSecret)?;
        let session_secret = base64::engine::general_purpose::STANDARD
            .decode(session_secret_raw)
            .map_err(|e| ConfigError::InvalidSessionSecretEncoding(e.to_string()))?;
        if session_secret.len() < 32 {
            return Err(ConfigError::SessionSecretTooShort { actual: session_secret.len() });
        }

        let master_key_raw = std::env::var("MASTER_KEY").map_err(|_| ConfigError::MissingMasterKey)?;
        let master_key = base64::engine::general_purpose::STANDARD
            .decode(master_key_raw)
            .map_err(|e| ConfigError::InvalidMasterKeyEncoding(e.to_string()))?;
        if master_key.len() != 32 {
            return Err(ConfigError::InvalidMasterKeyLength { actual: master_key.len() });
        }

        let oidc = std::env::var("OIDC_ISSUER").ok().map(|issuer| OidcConfig {
            issuer,
            client_id: std::env::var("OIDC_CLIENT_ID").unwrap_or_default(),
            client_secret: std::env::var("OIDC_CLIENT_SECRET").unwrap_or_default(),
            redirect_url: std::env::var("OIDC_REDIRECT_URL").unwrap_or_default(),
        });

        let http_bind_addr = std::env::var("HTTP_BIND_ADDR").unwrap_or_else(|_| ":8080".to_owned());

        let db_backup_dir = std::env::var("DB_BACKUP_DIR").unwrap_or_else(|_| "/var/lib/keldris/backups".to_owned());
        let db_backup_cron = std::env::var("DB_BACKUP_CRON").unwrap_or_else(|_| "0 0 2 * * *".to_owned());
        let db_backup_retention_days = std::env::var("DB_BACKUP_RETENTION_DAYS")
            .ok()
            .and_then(|v| v.parse().ok())
            .unwrap_or(30);

        let log_level = std::env::var("KELDRIS_LOG_LEVEL").unwrap_or_else(|_| "info".to_owned());

        Ok(Self {
            database_url,
            session_secret,
            master_key,
            oidc,
            http_bind_addr,
            db_backup_dir,
            db_backup_cron,
            db_backup_retention_days,
            log_level,
        })
    }
}
