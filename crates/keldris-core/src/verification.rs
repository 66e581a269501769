//! Email verification (component C4).
//!
//! One-shot 32-byte URL-safe base64 tokens, stored only as a SHA-256 hex
//! hash, expiring after 24 hours. At most 5 active tokens per user; issuing a
//! 6th fails until older tokens expire or are used. Only applies to non-OIDC
//! accounts that are not yet verified.

use async_trait::async_trait;
use base64::Engine;
use chrono::{DateTime, Utc};
use uuid::Uuid;

use crate::crypto;
use crate::error::VerificationError;
use crate::models::EmailVerificationToken;

const TOKEN_TTL_HOURS: i64 = 24;
const MAX_ACTIVE_TOKENS: usize = 5;

/// Narrow store interface for email verification tokens.
#[async_trait]
pub trait VerificationStore: Send + Sync {
    async fn count_active(&self, user_id: Uuid, now: DateTime<Utc>) -> Result<usize, String>;
    async fn insert(&self, token: EmailVerificationToken) -> Result<(), String>;
    async fn find_by_hash(&self, token_hash: &str) -> Result<Option<EmailVerificationToken>, String>;
    async fn mark_used(&self, id: Uuid, used_at: DateTime<Utc>) -> Result<(), String>;
}

/// Minimal account projection needed to decide eligibility.
#[derive(Debug, Clone, Copy)]
pub struct VerificationCandidate {
    pub is_oidc_only: bool,
    pub already_verified: bool,
}

/// Issue a new verification token for `user_id`, if eligible.
///
/// Returns `None` when the account is OIDC-only or already verified —
/// issuing is a silent no-op in those cases, not an error, since the caller
/// typically triggers this from a generic "resend verification" action.
///
/// # Errors
///
/// - `VerificationError::TooManyActiveTokens` if 5 unexpired, unused tokens
///   already exist.
/// - `VerificationError::Store` on a store-layer failure.
pub async fn issue(
    store: &dyn VerificationStore,
    user_id: Uuid,
    candidate: VerificationCandidate,
    now: DateTime<Utc>,
) -> Result<Option<(EmailVerificationToken, String)>, VerificationError> {
    if candidate.is_oidc_only || candidate.already_verified {
        return Ok(None);
    }

    let active = store.count_active(user_id, now).await.map_err(VerificationError::Store)?;
    if active >= MAX_ACTIVE_TOKENS {
        return Err(VerificationError::TooManyActiveTokens);
    }

    let plaintext_token = base64::engine::general_purpose::URL_SAFE_NO_PAD.encode(crypto::random_bytes(32));
    let token_hash = crypto::sha256_hex(plaintext_token.as_bytes());

    let record = EmailVerificationToken {
        id: Uuid::new_v4(),
        user_id,
        token_hash,
        expires_at: now + chrono::Duration::hours(TOKEN_TTL_HOURS),
        used_at: None,
    };
    store.insert(record.clone()).await.map_err(VerificationError::Store)?;

    Ok(Some((record, plaintext_token)))
}

/// Redeem a presented verification token: mark it used. The caller applies
/// the `User.email_verified` flip after this returns successfully.
///
/// # Errors
///
/// - `VerificationError::TokenInvalid` if no token matches the hash.
/// - `VerificationError::TokenAlreadyUsed` if already redeemed.
/// - `VerificationError::TokenExpired` if past `expires_at`.
pub async fn redeem(
    store: &dyn VerificationStore,
    plaintext_token: &str,
    now: DateTime<Utc>,
) -> Result<EmailVerificationToken, VerificationError> {
    let hash = crypto::sha256_hex(plaintext_token.as_bytes());
    let token = store.find_by_hash(&hash).await.map_err(VerificationError::Store)?.ok_or(VerificationError::TokenInvalid)?;

    if token.used_at.is_some() {
        return Err(VerificationError::TokenAlreadyUsed);
    }
    if now > token.expires_at {
        return Err(VerificationError::TokenExpired);
    }

    store.mark_used(token.id, now).await.map_err(VerificationError::Store)?;
    Ok(token)
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use std::collections::HashMap;
    use tokio::sync::Mutex;

    #[derive(Default)]
    struct FakeStore {
        by_id: Mutex<HashMap<Uuid, EmailVerificationToken>>,
    }

    #[async_trait]
    impl VerificationStore for FakeStore {
        async fn count_active(&self, user_id: Uuid, now: DateTime<Utc>) -> Result<usize, String> {
            let guard = self.by_id.lock().await;
            Ok(guard.values().filter(|t| t.user_id == user_id && t.used_at.is_none() && t.expires_at > now).count())
        }
        async fn insert(&self, token: EmailVerificationToken) -> Result<(), String> {
            self.by_id.lock().await.insert(token.id, token);
            Ok(())
        }
        async fn find_by_hash(&self, token_hash: &str) -> Result<Option<EmailVerificationToken>, String> {
            Ok(self.by_id.lock().await.values().find(|t| t.token_hash == token_hash).cloned())
        }
        async fn mark_used(&self, id: Uuid, used_at: DateTime<Utc>) -> Result<(), String> {
            if let Some(token) = self.by_id.lock().await.get_mut(&id) {
                token.used_at = Some(used_at);
            }
            Ok(())
        }
    }

    #[tokio::test]
    async fn oidc_only_and_already_verified_are_silent_no_ops() {
        let store = FakeStore::default();
        let now = Utc::now();
        let user = Uuid::new_v4();

        let oidc = issue(&store, user, VerificationCandidate { is_oidc_only: true, already_verified: false }, now).await.unwrap();
        assert!(oidc.is_none());

        let verified = issue(&store, user, VerificationCandidate { is_oidc_only: false, already_verified: true }, now).await.unwrap();
        assert!(verified.is_none());
    }

    #[tokio::test]
    async fn sixth_active_token_is_rejected() {
        let store = FakeStore::default();
        let now = Utc::now();
        let user = Uuid::new_v4();
        let candidate = VerificationCandidate { is_oidc_only: false, already_verified: false };

        for _ in 0..MAX_ACTIVE_TOKENS {
            issue(&store, user, candidate, now).await.unwrap();
        }
        let err = issue(&store, user, candidate, now).await.unwrap_err();
        assert!(matches!(err, VerificationError::TooManyActiveTokens));
    }

    #[tokio::test]
    async fn redeem_round_trip() {
        let store = FakeStore::default();
        let now = Utc::now();
        let user = Uuid::new_v4();
        let candidate = VerificationCandidate { is_oidc_only: false, already_verified: false };

        let (_, plaintext) = issue(&store, user, candidate, now).await.unwrap().unwrap();
        let redeemed = redeem(&store, &plaintext, now).await.unwrap();
        assert_eq!(redeemed.user_id, user);

        let err = redeem(&store, &plaintext, now).await.unwrap_err();
        assert!(matches!(err, VerificationError::TokenAlreadyUsed));
    }

    #[tokio::test]
    async fn expired_token_rejected() {
        let store = FakeStore::default();
        let now = Utc::now();
        let user = Uuid::new_v4();
        let candidate = VerificationCandidate { is_oidc_only: false, already_verified: false };

        let (_, plaintext) = issue(&store, user, candidate, now).await.unwrap().unwrap();
        let later = now + chrono::Duration::hours(25);
        let err = redeem(&store, &plaintext, later).await.unwrap_err();
        assert!(matches!(err, VerificationError::TokenExpired));
    }

    #[tokio::test]
    async fn expired_tokens_do_not_count_toward_active_limit() {
        let store = FakeStore::default();
        let now = Utc::now();
        let user = Uuid::new_v4();
        let candidate = VerificationCandidate { is_oidc_only: false, already_verified: false };

        for _ in 0..MAX_ACTIVE_TOKENS {
            issue(&store, user, candidate, now).await.unwrap();
        }
        let later = now + chrono::Duration::hours(25);
        // All prior tokens are expired by `later`, so issuing again succeeds.
        assert!(issue(&store, user, candidate, later).await.unwrap().is_some());
    }
}
