//! API-key validation for agents (component C1).
//!
//! Keys have the literal form `kld_` followed by 64 lowercase hex characters.
//! Validation is: shape check, SHA-256 the plaintext, look up an agent by
//! hash, reject disabled agents. Comparisons against the stored hash use
//! constant-time byte comparison.

use async_trait::async_trait;
use uuid::Uuid;

use crate::crypto;
use crate::models::{Agent, AgentStatus};

const KEY_PREFIX: &str = "kld_";
const HEX_LEN: usize = 64;

/// Narrow store interface for agent lookups by API-key hash.
///
/// Production code implements this against Postgres; tests implement it
/// against an in-memory fake. See spec §9 "Store interfaces".
#[async_trait]
pub trait AgentLookup: Send + Sync {
    async fn find_by_api_key_hash(&self, hash: &str) -> Result<Option<Agent>, String>;
}

/// Generate a new plaintext agent API key: `kld_` + 64 lowercase hex chars.
#[must_use]
pub fn generate_api_key() -> String {
    let bytes = crypto::random_bytes(32);
    format!("{KEY_PREFIX}{}", hex::encode(bytes))
}

/// Hash a plaintext API key with SHA-256, hex-encoded, for storage/lookup.
#[must_use]
pub fn hash_api_key(key: &str) -> String {
    crypto::sha256_hex(key.as_bytes())
}

/// Check that a string has the canonical `kld_<64 hex>` shape.
#[must_use]
pub fn is_well_formed(key: &str) -> bool {
    match key.strip_prefix(KEY_PREFIX) {
        Some(hex_part) => hex_part.len() == HEX_LEN && hex_part.bytes().all(|b| b.is_ascii_hexdigit()),
        None => false,
    }
}

/// Validate a plaintext API key against the agent store.
///
/// Returns `Ok(None)` ("no identity, no error") when the format is wrong,
/// no agent exists for the hash, or the agent is disabled — the caller
/// cannot distinguish these cases, which prevents key-format oracle attacks.
///
/// # Errors
///
/// Returns `Err` only on a store-layer failure (e.g. database unreachable).
pub async fn validate(lookup: &dyn AgentLookup, key: &str) -> Result<Option<Agent>, String> {
    if !is_well_formed(key) {
        return Ok(None);
    }

    let hash = hash_api_key(key);
    let Some(agent) = lookup.find_by_api_key_hash(&hash).await? else {
        return Ok(None);
    };

    // Constant-time re-check of the hash even though the lookup already
    // matched by hash — guards against a lookup implementation that does a
    // prefix or case-insensitive match internally.
    if !crypto::constant_time_eq_str(&hash, &agent.api_key_hash) {
        return Ok(None);
    }

    if agent.status == AgentStatus::Disabled {
        return Ok(None);
    }

    Ok(Some(agent))
}

/// Extract a bearer token from an `Authorization` header value.
///
/// Strips the `Bearer` scheme case-insensitively, trims surrounding
/// whitespace, and returns `None` for any other scheme.
#[must_use]
pub fn extract_bearer_token(header_value: &str) -> Option<&str> {
    let trimmed = header_value.trim();
    let (scheme, rest) = trimmed.split_once(' ')?;
    if scheme.eq_ignore_ascii_case("bearer") {
        Some(rest.trim())
    } else {
        None
    }
}
