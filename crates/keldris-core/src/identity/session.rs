//! Session store: opaque signed+encrypted cookies (component C1).
//!
//! Two expirations apply: `max_age` (absolute cookie lifetime, measured from
//! `authenticated_at`) and `idle_timeout` (sliding, measured against
//! `last_activity`). `idle_timeout = 0` disables the sliding check.
//!
//! The secret is held behind a `tokio::sync::RwLock` so it can be hot-swapped
//! (e.g. on secret rotation) without holding the lock across any I/O — the
//! same discipline applied to `OIDCProvider`.

use std::sync::Arc;
use std::time::Duration as StdDuration;

use chrono::{DateTime, Utc};
use tokio::sync::RwLock;

use crate::crypto::{self, MasterKey};
use crate::error::IdentityError;
use crate::models::SessionState;

const MIN_SECRET_LEN: usize = 32;

/// Cookie attributes the HTTP layer must apply when setting the session
/// cookie. The router/handler layer is out of scope for this crate, but the
/// attributes it must honor are part of this component's contract.
#[derive(Debug, Clone, Copy)]
pub struct CookieAttributes {
    pub http_only: bool,
    pub secure: bool,
    pub same_site_lax: bool,
    pub path: &'static str,
}

impl Default for CookieAttributes {
    fn default() -> Self {
        Self {
            http_only: true,
            secure: true,
            same_site_lax: true,
            path: "/",
        }
    }
}

/// Configuration for the session store.
#[derive(Debug, Clone, Copy)]
pub struct SessionConfig {
    /// Absolute cookie lifetime from `authenticated_at`.
    pub max_age: StdDuration,
    /// Sliding idle timeout against `last_activity`. Zero disables the
    /// sliding check entirely.
    pub idle_timeout: StdDuration,
    pub secure_cookie: bool,
}

/// Session store guarding the signing/encryption secret behind a reader
/// writer lock so it can be rotated without holding the lock across I/O.
pub struct SessionStore {
    secret: RwLock<Arc<MasterKey>>,
    config: SessionConfig,
}

impl SessionStore {
    /// Create a new session store.
    ///
    /// # Errors
    ///
    /// Returns [`IdentityError::WeakSessionSecret`] if `secret` is shorter
    /// than 32 bytes.
    pub fn new(secret: &[u8], config: SessionConfig) -> Result<Self, IdentityError> {
        if secret.len() < MIN_SECRET_LEN {
            return Err(IdentityError::WeakSessionSecret);
        }
        // Derive a 32-byte AES key regardless of the raw secret's length.
        let derived = crypto::sha256_hex(secret);
        let key_bytes = hex::decode(derived).map_err(|e| IdentityError::Store(e.to_string()))?;
        let key = MasterKey::from_bytes(&key_bytes).map_err(|e| IdentityError::Store(e.to_string()))?;

        Ok(Self {
            secret: RwLock::new(Arc::new(key)),
            config,
        })
    }

    /// Rotate the signing/encryption secret. Existing cookies signed under
    /// the old secret become unreadable — callers should force re-login.
    ///
    /// # Errors
    ///
    /// Returns [`IdentityError::WeakSessionSecret`] if `secret` is shorter
    /// than 32 bytes.
    pub async fn rotate_secret(&self, secret: &[u8]) -> Result<(), IdentityError> {
        if secret.len() < MIN_SECRET_LEN {
            return Err(IdentityError::WeakSessionSecret);
        }
        let derived = crypto::sha256_hex(secret);
        let key_bytes = hex::decode(derived).map_err(|e| IdentityError::Store(e.to_string()))?;
        let key = MasterKey::from_bytes(&key_bytes).map_err(|e| IdentityError::Store(e.to_string()))?;

        let mut guard = self.secret.write().await;
        *guard = Arc::new(key);
        Ok(())
    }

    #[must_use]
    pub fn cookie_attributes(&self) -> CookieAttributes {
        CookieAttributes {
            secure: self.config.secure_cookie,
            ..CookieAttributes::default()
        }
    }

    /// Encode a session into an opaque base64 cookie value.
    ///
    /// # Errors
    ///
    /// Returns `IdentityError::Store` on serialization or encryption failure.
    pub async fn encode(&self, session: &SessionState) -> Result<String, IdentityError> {
        let key = Arc::clone(&*self.secret.read().await);
        let json = serde_json::to_vec(session).map_err(|e| IdentityError::Store(e.to_string()))?;
        let blob = crypto::encrypt(&key, &json).map_err(|e| IdentityError::Store(e.to_string()))?;
        Ok(base64::Engine::encode(&base64::engine::general_purpose::STANDARD, blob))
    }

    /// Decode an opaque cookie value into a session, without checking
    /// expirations. See [`Self::get_user`] for the full authenticated path.
    ///
    /// # Errors
    ///
    /// Returns `IdentityError::Store` if the value cannot be decoded,
    /// decrypted, or deserialized.
    async fn decode(&self, cookie_value: &str) -> Result<SessionState, IdentityError> {
        let key = Arc::clone(&*self.secret.read().await);
        let blob = base64::Engine::decode(&base64::engine::general_purpose::STANDARD, cookie_value)
            .map_err(|e| IdentityError::Store(e.to_string()))?;
        let json = crypto::decrypt(&key, &blob).map_err(|e| IdentityError::Store(e.to_string()))?;
        serde_json::from_slice(&json).map_err(|e| IdentityError::Store(e.to_string()))
    }

    /// Validate a cookie and return the (possibly idle-refreshed) session.
    ///
    /// Checks the absolute `max_age` against `authenticated_at`, then — if
    /// sliding is enabled (`idle_timeout != 0`) — checks `last_activity`
    /// and bumps it to `now`.
    ///
    /// # Errors
    ///
    /// - `IdentityError::SessionAbsoluteExpired` if `max_age` has elapsed.
    /// - `IdentityError::SessionIdleExpired` if `idle_timeout` has elapsed.
    /// - `IdentityError::Store` on decode failure.
    pub async fn get_user(
        &self,
        cookie_value: &str,
        now: DateTime<Utc>,
    ) -> Result<SessionState, IdentityError> {
        let mut session = self.decode(cookie_value).await?;

        let max_age = chrono::Duration::from_std(self.config.max_age)
            .map_err(|e| IdentityError::Store(e.to_string()))?;
        if now > session.authenticated_at + max_age {
            return Err(IdentityError::SessionAbsoluteExpired);
        }

        if !self.config.idle_timeout.is_zero() {
            let idle = chrono::Duration::from_std(self.config.idle_timeout)
                .map_err(|e| IdentityError::Store(e.to_string()))?;
            if now > session.last_activity + idle {
                return Err(IdentityError::SessionIdleExpired);
            }
            session.last_activity = now;
        }

        Ok(session)
    }

    /// Whether a cookie currently represents an authenticated, unexpired
    /// session, without mutating `last_activity`.
    pub async fn is_authenticated(&self, cookie_value: &str, now: DateTime<Utc>) -> bool {
        self.get_user(cookie_value, now).await.is_ok()
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use crate::models::OrgRole;
    use uuid::Uuid;

    fn session_at(now: DateTime<Utc>) -> SessionState {
        SessionState {
            user_id: Uuid::new_v4(),
            oidc_subject: None,
            email: "u@example.com".to_owned(),
            name: "U".to_owned(),
            current_org_id: Uuid::new_v4(),
            current_org_role: OrgRole::Member,
            authenticated_at: now,
            last_activity: now,
            is_superuser: false,
            impersonating: None,
            impersonation: None,
        }
    }

    fn config(idle_secs: u64) -> SessionConfig {
        SessionConfig {
            max_age: StdDuration::from_secs(3600),
            idle_timeout: StdDuration::from_secs(idle_secs),
            secure_cookie: true,
        }
    }

    #[tokio::test]
    async fn creation_fails_below_32_bytes_succeeds_at_32() {
        assert!(SessionStore::new(&[0u8; 31], config(60)).is_err());
        assert!(SessionStore::new(&[0u8; 32], config(60)).is_ok());
    }

    #[tokio::test]
    async fn idle_timeout_expires_session() {
        let store = SessionStore::new(&[9u8; 32], config(1)).unwrap();
        let now = Utc::now();
        let session = session_at(now);
        let cookie = store.encode(&session).await.unwrap();

        assert!(store.get_user(&cookie, now).await.is_ok());

        let later = now + chrono::Duration::milliseconds(1100);
        let err = store.get_user(&cookie, later).await.unwrap_err();
        assert!(matches!(err, IdentityError::SessionIdleExpired));
    }

    #[tokio::test]
    async fn idle_timeout_zero_disables_sliding_check() {
        let store = SessionStore::new(&[9u8; 32], config(0)).unwrap();
        let now = Utc::now();
        let cookie = store.encode(&session_at(now)).await.unwrap();

        let far_future = now + chrono::Duration::minutes(30);
        assert!(store.get_user(&cookie, far_future).await.is_ok());
    }

    #[tokio::test]
    async fn absolute_expiry_triggers_independent_of_idle() {
        let store = SessionStore::new(&[9u8; 32], config(0)).unwrap();
        let now = Utc::now();
        let cookie = store.encode(&session_at(now)).await.unwrap();

        let after_max_age = now + chrono::Duration::hours(2);
        let err = store.get_user(&cookie, after_max_age).await.unwrap_err();
        assert!(matches!(err, IdentityError::SessionAbsoluteExpired));
    }

    #[tokio::test]
    async fn touching_within_window_keeps_session_alive() {
        let store = SessionStore::new(&[9u8; 32], config(5)).unwrap();
        let now = Utc::now();
        let mut cookie = store.encode(&session_at(now)).await.unwrap();

        for step in 1..5 {
            let t = now + chrono::Duration::seconds(step * 3);
            let session = store.get_user(&cookie, t).await.unwrap();
            cookie = store.encode(&session).await.unwrap();
        }
        assert!(store.is_authenticated(&cookie, now + chrono::Duration::seconds(15)).await);
    }
}
