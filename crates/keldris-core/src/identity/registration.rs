//! Agent registration-code flow (component C1).
//!
//! A member with the right permission requests a code; the server generates
//! 8 characters from a reduced, unambiguous alphabet using a cryptographic
//! RNG and persists it with `expires_at = now + 10min`. Agents present the
//! code plus a desired hostname; the server marks the code used atomically
//! with agent creation.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use rand::Rng;
use uuid::Uuid;

use crate::error::IdentityError;
use crate::models::RegistrationCode;

/// 31 unambiguous uppercase characters: no `I`, `O`, `0`, `1`.
const CODE_ALPHABET: &[u8] = b"ABCDEFGHJKMNPQRSTUVWXYZ23456789";
const CODE_LEN: usize = 8;
const TTL_MINUTES: i64 = 10;

/// Narrow store interface for registration codes.
#[async_trait]
pub trait RegistrationCodeStore: Send + Sync {
    async fn insert(&self, code: RegistrationCode) -> Result<(), String>;
    async fn find_by_code(&self, code: &str) -> Result<Option<RegistrationCode>, String>;
    /// Atomically mark the code used and associate it with the created
    /// agent. Implementations must perform this in a single transaction
    /// with the agent insert.
    async fn mark_used(&self, id: Uuid, agent_id: Uuid, used_at: DateTime<Utc>) -> Result<(), String>;
}

/// Generate an 8-character code over the reduced alphabet using a
/// cryptographic RNG.
#[must_use]
pub fn generate_code() -> String {
    let mut rng = rand::thread_rng();
    (0..CODE_LEN)
        .map(|_| CODE_ALPHABET[rng.gen_range(0..CODE_ALPHABET.len())] as char)
        .collect()
}

/// Normalize operator/agent-supplied code input: uppercase, trimmed.
#[must_use]
pub fn normalize_code(input: &str) -> String {
    input.trim().to_uppercase()
}

/// Issue a new registration code for `org_id`/`issuer_user_id`.
///
/// # Errors
///
/// Returns `IdentityError::Store` on a store-layer failure.
pub async fn issue(
    store: &dyn RegistrationCodeStore,
    org_id: Uuid,
    issuer_user_id: Uuid,
    hostname: Option<String>,
    now: DateTime<Utc>,
) -> Result<RegistrationCode, IdentityError> {
    let code = RegistrationCode {
        id: Uuid::new_v4(),
        org_id,
        issuer_user_id,
        code: generate_code(),
        hostname,
        issued_at: now,
        expires_at: now + chrono::Duration::minutes(TTL_MINUTES),
        used_at: None,
        used_by_agent_id: None,
    };

    store.insert(code.clone()).await.map_err(IdentityError::Store)?;
    Ok(code)
}

/// Redeem a code presented by an enrolling agent. Returns the code record
/// if it is unused and unexpired at `now`; the caller is responsible for
/// creating the agent and calling [`RegistrationCodeStore::mark_used`] in
/// the same transaction.
///
/// # Errors
///
/// Returns `IdentityError::RegistrationCodeInvalid` if the code does not
/// exist, is already used, or has expired.
pub async fn redeem(
    store: &dyn RegistrationCodeStore,
    raw_code: &str,
    now: DateTime<Utc>,
) -> Result<RegistrationCode, IdentityError> {
    let normalized = normalize_code(raw_code);
    let code = store
        .find_by_code(&normalized)
        .await
        .map_err(IdentityError::Store)?
        .ok_or(IdentityError::RegistrationCodeInvalid)?;

    if code.used_at.is_some() || now > code.expires_at {
        return Err(IdentityError::RegistrationCodeInvalid);
    }

    Ok(code)
}
