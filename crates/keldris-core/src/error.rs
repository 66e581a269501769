//! Error types for `keldris-core`.
//!
//! One enum per component, following the `zvault-core::error`
//! convention: each variant carries enough context to diagnose the problem,
//! and crypto-adjacent errors never include key material.

/// Errors from API-key validation, session handling, OIDC, impersonation,
/// and agent registration (component C1).
#[derive(Debug, thiserror::Error)]
pub enum IdentityError {
    #[error("invalid credentials")]
    InvalidCredentials,

    #[error("account is disabled")]
    AccountDisabled,

    #[error("OIDC discovery failed: {0}")]
    OidcDiscoveryFailed(String),

    #[error("OIDC token verification failed: {0}")]
    OidcVerifyFailed(String),

    #[error("no ID token in OIDC response")]
    MissingIdToken,

    #[error("session idle timeout exceeded")]
    SessionIdleExpired,

    #[error("session absolute lifetime exceeded")]
    SessionAbsoluteExpired,

    #[error("session secret must be at least 32 bytes")]
    WeakSessionSecret,

    #[error("registration code invalid or expired")]
    RegistrationCodeInvalid,

    #[error("store error: {0}")]
    Store(String),
}

/// Errors from the RBAC layer (component C2).
#[derive(Debug, thiserror::Error)]
pub enum AuthzError {
    #[error("no membership for this organization")]
    NoMembership,

    #[error("permission denied: {0}")]
    Denied(String),
}

/// Errors from password policy, history, and reset (component C3).
#[derive(Debug, thiserror::Error)]
pub enum PasswordError {
    #[error("password does not satisfy policy: {0:?}")]
    PolicyViolation(Vec<String>),

    #[error("password matches a recently used password")]
    ReusesHistory,

    #[error("reset token expired")]
    TokenExpired,

    #[error("reset token already used")]
    TokenAlreadyUsed,

    #[error("reset token invalid")]
    TokenInvalid,

    #[error("rate limited")]
    RateLimited,

    #[error("account authenticates via OIDC only")]
    OidcOnlyAccount,

    #[error("store error: {0}")]
    Store(String),
}

/// Errors from email verification (component C4).
#[derive(Debug, thiserror::Error)]
pub enum VerificationError {
    #[error("verification token expired")]
    TokenExpired,

    #[error("verification token already used")]
    TokenAlreadyUsed,

    #[error("verification token invalid")]
    TokenInvalid,

    #[error("maximum active verification tokens reached")]
    TooManyActiveTokens,

    #[error("store error: {0}")]
    Store(String),
}

/// Errors from the scheduler and dispatcher (component C6).
#[derive(Debug, thiserror::Error)]
pub enum SchedulerError {
    #[error("invalid cron expression: {0}")]
    InvalidCron(String),

    #[error("no repository candidate passed a health check")]
    NoHealthyRepository,

    #[error("restic invocation failed: {0}")]
    ResticFailed(String),

    #[error("restic invocation timed out")]
    Timeout,

    #[error("backup run was canceled")]
    Canceled,

    #[error("invalid retention policy: at least one keep field must be non-zero")]
    InvalidRetentionPolicy,

    #[error("store error: {0}")]
    Store(String),
}

/// Errors from the webhook dispatcher (component C8).
#[derive(Debug, thiserror::Error)]
pub enum WebhookError {
    #[error("delivery request failed: {0}")]
    RequestFailed(String),

    #[error("delivery timed out")]
    Timeout,

    #[error("no endpoints subscribed to event {0}")]
    NoSubscribers(String),

    #[error("store error: {0}")]
    Store(String),
}

/// Errors from the migration engine (component C9).
#[derive(Debug, thiserror::Error)]
pub enum MigrationError {
    #[error("unrecognized export header")]
    BadHeader,

    #[error("decryption requires an export key")]
    MissingExportKey,

    #[error("decryption failed: {0}")]
    DecryptionFailed(String),

    #[error("unsupported format version: {0}")]
    UnsupportedVersion(String),

    #[error("conflict on {entity} '{key}'")]
    Conflict { entity: String, key: String },

    #[error("{entity} references unknown {referenced_entity} '{key}'")]
    UnknownReference { entity: String, referenced_entity: String, key: String },

    #[error("store error: {0}")]
    Store(String),
}

/// Errors from the database-backup engine (component C10).
#[derive(Debug, thiserror::Error)]
pub enum DbBackupError {
    #[error("pg_dump failed: {0}")]
    DumpFailed(String),

    #[error("pg_dump timed out")]
    Timeout,

    #[error("checksum mismatch: expected {expected}, got {actual}")]
    ChecksumMismatch { expected: String, actual: String },

    #[error("decryption failed: {0}")]
    DecryptionFailed(String),

    #[error("verification marker not found in decompressed output")]
    VerificationMarkerMissing,

    #[error("I/O error: {0}")]
    Io(String),

    #[error("store error: {0}")]
    Store(String),
}

/// Errors from the crypto primitives shared across components.
#[derive(Debug, thiserror::Error)]
pub enum CryptoError {
    #[error("encryption failed: {reason}")]
    Encryption { reason: String },

    #[error("decryption failed: {reason}")]
    Decryption { reason: String },

    #[error("ciphertext too short: expected at least {expected} bytes, got {actual}")]
    CiphertextTooShort { expected: usize, actual: usize },

    #[error("master key must be exactly 32 bytes, got {actual}")]
    InvalidKeyLength { actual: usize },
}

impl From<std::io::Error> for DbBackupError {
    fn from(err: std::io::Error) -> Self {
        Self::Io(err.to_string())
    }
}
