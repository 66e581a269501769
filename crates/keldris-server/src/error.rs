//! HTTP error mapping for the Keldris server.
//!
//! Maps domain errors from `keldris-core` onto the error kinds the API layer
//! surfaces: `Unauthorized`, `Forbidden`, `NotFound`, `Conflict`,
//! `RateLimited`, `Validation`, `Timeout`, `Internal`. Detail messages are
//! carried on every variant; the caller (router layer, out of scope here)
//! is responsible for redacting them for non-authenticated clients.

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use serde::Serialize;

use keldris_core::error::{AuthzError, CryptoError, DbBackupError, IdentityError, MigrationError, PasswordError, SchedulerError, VerificationError, WebhookError};

/// Application-level error kind, mirroring the taxonomy in the error
/// handling design: one kind per HTTP status family.
#[derive(Debug)]
pub enum AppError {
    Unauthorized(String),
    Forbidden(String),
    NotFound(String),
    Conflict(String),
    RateLimited(String),
    Validation(String),
    Timeout(String),
    Internal(String),
}

#[derive(Serialize)]
struct ErrorBody {
    error: &'static str,
    message: String,
}

impl AppError {
    #[must_use]
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Unauthorized(_) => "unauthorized",
            Self::Forbidden(_) => "forbidden",
            Self::NotFound(_) => "not_found",
            Self::Conflict(_) => "conflict",
            Self::RateLimited(_) => "rate_limited",
            Self::Validation(_) => "validation",
            Self::Timeout(_) => "timeout",
            Self::Internal(_) => "internal_error",
        }
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let status = match &self {
            Self::Unauthorized(_) => StatusCode::UNAUTHORIZED,
            Self::Forbidden(_) => StatusCode::FORBIDDEN,
            Self::NotFound(_) => StatusCode::NOT_FOUND,
            Self::Conflict(_) => StatusCode::CONFLICT,
            Self::RateLimited(_) => StatusCode::TOO_MANY_REQUESTS,
            Self::Validation(_) => StatusCode::BAD_REQUEST,
            Self::Timeout(_) => StatusCode::GATEWAY_TIMEOUT,
            Self::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        };
        let error = self.kind();
        let message = match self {
            Self::Unauthorized(m) | Self::Forbidden(m) | Self::NotFound(m) | Self::Conflict(m) | Self::RateLimited(m) | Self::Validation(m) | Self::Timeout(m) | Self::Internal(m) => m,
        };

        (status, axum::Json(ErrorBody { error, message })).into_response()
    }
}

impl From<IdentityError> for AppError {
    fn from(err: IdentityError) -> Self {
        match err {
            IdentityError::InvalidCredentials | IdentityError::MissingIdToken | IdentityError::OidcVerifyFailed(_) => Self::Unauthorized("invalid credentials".to_owned()),
            IdentityError::AccountDisabled => Self::Forbidden(err.to_string()),
            IdentityError::SessionIdleExpired | IdentityError::SessionAbsoluteExpired => Self::Unauthorized("session expired".to_owned()),
            IdentityError::RegistrationCodeInvalid => Self::Unauthorized("invalid registration code".to_owned()),
            IdentityError::OidcDiscoveryFailed(_) => Self::Internal(err.to_string()),
            IdentityError::WeakSessionSecret | IdentityError::Store(_) => Self::Internal(err.to_string()),
        }
    }
}

impl From<AuthzError> for AppError {
    fn from(err: AuthzError) -> Self {
        match err {
            AuthzError::NoMembership => Self::Forbidden("no membership for this organization".to_owned()),
            AuthzError::Denied(_) => Self::Forbidden(err.to_string()),
        }
    }
}

impl From<PasswordError> for AppError {
    fn from(err: PasswordError) -> Self {
        match err {
            PasswordError::PolicyViolation(_) | PasswordError::ReusesHistory => Self::Validation(err.to_string()),
            PasswordError::TokenExpired | PasswordError::TokenAlreadyUsed | PasswordError::TokenInvalid => Self::Unauthorized("reset token invalid".to_owned()),
            PasswordError::RateLimited => Self::RateLimited(err.to_string()),
            PasswordError::OidcOnlyAccount => Self::Validation(err.to_string()),
            PasswordError::Store(_) => Self::Internal(err.to_string()),
        }
    }
}

impl From<VerificationError> for AppError {
    fn from(err: VerificationError) -> Self {
        match err {
            VerificationError::TokenExpired | VerificationError::TokenAlreadyUsed | VerificationError::TokenInvalid => Self::Unauthorized("verification token invalid".to_owned()),
            VerificationError::TooManyActiveTokens => Self::Validation(err.to_string()),
            VerificationError::Store(_) => Self::Internal(err.to_string()),
        }
    }
}

impl From<SchedulerError> for AppError {
    fn from(err: SchedulerError) -> Self {
        match err {
            SchedulerError::InvalidCron(_) | SchedulerError::InvalidRetentionPolicy => Self::Validation(err.to_string()),
            SchedulerError::NoHealthyRepository => Self::Conflict(err.to_string()),
            SchedulerError::Timeout => Self::Timeout(err.to_string()),
            SchedulerError::Canceled => Self::Internal(err.to_string()),
            SchedulerError::ResticFailed(_) | SchedulerError::Store(_) => Self::Internal(err.to_string()),
        }
    }
}

impl From<WebhookError> for AppError {
    fn from(err: WebhookError) -> Self {
        match err {
            WebhookError::NoSubscribers(_) => Self::NotFound(err.to_string()),
            WebhookError::Timeout => Self::Timeout(err.to_string()),
            WebhookError::RequestFailed(_) | WebhookError::Store(_) => Self::Internal(err.to_string()),
        }
    }
}

impl From<MigrationError> for AppError {
    fn from(err: MigrationError) -> Self {
        match err {
            MigrationError::Conflict { .. } => Self::Conflict(err.to_string()),
            MigrationError::BadHeader | MigrationError::MissingExportKey | MigrationError::UnsupportedVersion(_) | MigrationError::DecryptionFailed(_) => Self::Validation(err.to_string()),
            MigrationError::Store(_) => Self::Internal(err.to_string()),
        }
    }
}

impl From<DbBackupError> for AppError {
    fn from(err: DbBackupError) -> Self {
        match err {
            DbBackupError::Timeout => Self::Timeout(err.to_string()),
            DbBackupError::ChecksumMismatch { .. } | DbBackupError::VerificationMarkerMissing | DbBackupError::DecryptionFailed(_) => Self::Validation(err.to_string()),
            DbBackupError::DumpFailed(_) | DbBackupError::Io(_) | DbBackupError::Store(_) => Self::Internal(err.to_string()),
        }
    }
}

impl From<CryptoError> for AppError {
    fn from(err: CryptoError) -> Self {
        Self::Internal(err.to_string())
    }
}
