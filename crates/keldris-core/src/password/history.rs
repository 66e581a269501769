//! Password history enforcement (component C3).
//!
//! Before accepting a new password, compare the plaintext against the last
//! `history_count` entries using the bcrypt verifier; reject on any match.
//! On acceptance, prepend the new hash and prune to `history_count`.

use async_trait::async_trait;
use uuid::Uuid;

use crate::error::PasswordError;
use crate::models::PasswordHistoryEntry;

/// Narrow store interface for password history.
#[async_trait]
pub trait PasswordHistoryStore: Send + Sync {
    /// Most-recent-first entries for `user_id`.
    async fn recent(&self, user_id: Uuid, limit: u32) -> Result<Vec<PasswordHistoryEntry>, String>;
    async fn prepend(&self, entry: PasswordHistoryEntry) -> Result<(), String>;
    /// Prune to the newest `keep` entries.
    async fn prune(&self, user_id: Uuid, keep: u32) -> Result<(), String>;
}

/// Hash a plaintext password for storage.
///
/// # Errors
///
/// Returns `PasswordError::Store` if the bcrypt hashing primitive fails
/// (e.g. the cost parameter is out of range).
pub fn hash_password(plaintext: &str) -> Result<String, PasswordError> {
    bcrypt::hash(plaintext, bcrypt::DEFAULT_COST).map_err(|e| PasswordError::Store(e.to_string()))
}

/// Reject `candidate` if it matches any of the last `history_count`
/// passwords for `user_id`.
///
/// # Errors
///
/// - `PasswordError::ReusesHistory` if a match is found.
/// - `PasswordError::Store` on a store-layer failure.
pub async fn check_not_reused(
    store: &dyn PasswordHistoryStore,
    user_id: Uuid,
    candidate: &str,
    history_count: u32,
) -> Result<(), PasswordError> {
    let recent = store.recent(user_id, history_count).await.map_err(PasswordError::Store)?;

    for entry in &recent {
        let matches = bcrypt::verify(candidate, &entry.password_hash).map_err(|e| PasswordError::Store(e.to_string()))?;
        if matches {
            return Err(PasswordError::ReusesHistory);
        }
    }

    Ok(())
}

/// Record a newly accepted password hash and prune history to
/// `history_count` entries.
///
/// # Errors
///
/// Returns `PasswordError::Store` on a store-layer failure.
pub async fn record_accepted(
    store: &dyn PasswordHistoryStore,
    user_id: Uuid,
    new_hash: String,
    history_count: u32,
    now: chrono::DateTime<chrono::Utc>,
) -> Result<(), PasswordError> {
    store
        .prepend(PasswordHistoryEntry { id: Uuid::new_v4(), user_id, password_hash: new_hash, created_at: now })
        .await
        .map_err(PasswordError::Store)?;
    store.prune(user_id, history_count).await.map_err(PasswordError::Store)?;
    Ok(())
}
