//! Password reset flow (component C3).
//!
//! Two layers of rate limiting apply — per-email (3/15min) and per-IP
//! (5/15min) — and counters increment **even when the email is unknown**, so
//! response timing and counters cannot be used to enumerate users.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use uuid::Uuid;

use crate::crypto;
use crate::error::PasswordError;
use crate::models::PasswordResetToken;

const EMAIL_LIMIT: u32 = 3;
const IP_LIMIT: u32 = 5;
const WINDOW_MINUTES: i64 = 15;
const TOKEN_TTL_HOURS: i64 = 1;

/// A sliding-window rate limiter keyed by an arbitrary string (email or IP).
#[async_trait]
pub trait RateLimiter: Send + Sync {
    /// Record one hit for `key` at `now` and return the number of hits
    /// within the trailing `window`.
    async fn record_and_count(&self, key: &str, window: chrono::Duration, now: DateTime<Utc>) -> Result<u32, String>;
}

/// Narrow store interface for password reset tokens.
#[async_trait]
pub trait PasswordResetStore: Send + Sync {
    async fn insert(&self, token: PasswordResetToken) -> Result<(), String>;
    async fn find_by_hash(&self, token_hash: &str) -> Result<Option<PasswordResetToken>, String>;
    async fn invalidate_all_for_user(&self, user_id: Uuid) -> Result<(), String>;
    async fn mark_used(&self, id: Uuid, used_at: DateTime<Utc>) -> Result<(), String>;
}

/// Minimal user projection needed by the reset flow.
#[derive(Debug, Clone)]
pub struct ResetCandidate {
    pub user_id: Uuid,
    pub is_oidc_only: bool,
}

/// Outcome of a reset request: `Some` only when a token was actually minted
/// (known, password-auth account). The HTTP-facing caller must return the
/// same uniform success response regardless, to prevent enumeration.
pub type ResetRequestOutcome = Option<(PasswordResetToken, String)>;

/// Request a password reset for `email`.
///
/// Rate-limit counters for both `email` and `ip` are incremented
/// unconditionally, before the account lookup — this is what makes the
/// counters independent of whether the account exists (spec §8 invariant).
///
/// # Errors
///
/// - `PasswordError::RateLimited` if either counter exceeds its window limit.
/// - `PasswordError::Store` on a store-layer failure.
pub async fn request_reset(
    store: &dyn PasswordResetStore,
    limiter: &dyn RateLimiter,
    email: &str,
    ip: &str,
    user_agent: &str,
    candidate: Option<ResetCandidate>,
    now: DateTime<Utc>,
) -> Result<ResetRequestOutcome, PasswordError> {
    let window = chrono::Duration::minutes(WINDOW_MINUTES);

    let email_count = limiter.record_and_count(email, window, now).await.map_err(PasswordError::Store)?;
    let ip_count = limiter.record_and_count(ip, window, now).await.map_err(PasswordError::Store)?;

    if email_count > EMAIL_LIMIT || ip_count > IP_LIMIT {
        return Err(PasswordError::RateLimited);
    }

    let Some(candidate) = candidate else {
        // Unknown email: success-with-no-effect.
        return Ok(None);
    };
    if candidate.is_oidc_only {
        // OIDC-only account: success-with-no-effect.
        return Ok(None);
    }

    let plaintext_token = hex::encode(crypto::random_bytes(32));
    let token_hash = crypto::sha256_hex(plaintext_token.as_bytes());

    store.invalidate_all_for_user(candidate.user_id).await.map_err(PasswordError::Store)?;

    let record = PasswordResetToken {
        id: Uuid::new_v4(),
        user_id: candidate.user_id,
        token_hash,
        expires_at: now + chrono::Duration::hours(TOKEN_TTL_HOURS),
        used_at: None,
        ip: ip.to_owned(),
        user_agent: user_agent.to_owned(),
    };
    store.insert(record.clone()).await.map_err(PasswordError::Store)?;

    Ok(Some((record, plaintext_token)))
}

/// Validate a presented reset token without redeeming it.
///
/// # Errors
///
/// - `PasswordError::TokenInvalid` if no token matches.
/// - `PasswordError::TokenAlreadyUsed` / `TokenExpired` accordingly.
pub async fn validate_token(
    store: &dyn PasswordResetStore,
    plaintext_token: &str,
    now: DateTime<Utc>,
) -> Result<PasswordResetToken, PasswordError> {
    let hash = crypto::sha256_hex(plaintext_token.as_bytes());
    let token = store.find_by_hash(&hash).await.map_err(PasswordError::Store)?.ok_or(PasswordError::TokenInvalid)?;

    if token.used_at.is_some() {
        return Err(PasswordError::TokenAlreadyUsed);
    }
    if now > token.expires_at {
        return Err(PasswordError::TokenExpired);
    }

    Ok(token)
}

/// Redeem a validated token: mark it used and invalidate all other
/// outstanding tokens for the user. The caller is responsible for applying
/// the new password (policy + history validated) before calling this.
///
/// # Errors
///
/// Propagates [`validate_token`]'s errors, plus `PasswordError::Store`.
pub async fn redeem(
    store: &dyn PasswordResetStore,
    plaintext_token: &str,
    now: DateTime<Utc>,
) -> Result<PasswordResetToken, PasswordError> {
    let token = validate_token(store, plaintext_token, now).await?;
    store.mark_used(token.id, now).await.map_err(PasswordError::Store)?;
    store.invalidate_all_for_user(token.user_id).await.map_err(PasswordError::Store)?;
    Ok(token)
}
