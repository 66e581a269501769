//! OIDC login flow (component C1).
//!
//! An [`OidcProviderHolder`] caches a verified provider instance behind a
//! reader-writer lock; settings updates construct a new provider and
//! atomically swap the pointer — never holding the lock across the
//! construction's network I/O, matching the treatment of
//! `OIDCProvider` in `zvault-server::state`.

use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tokio::sync::RwLock;

use crate::crypto;
use crate::error::IdentityError;

/// Static provider configuration, as discovered from the issuer's
/// `.well-known/openid-configuration` document.
#[derive(Debug, Clone)]
pub struct OidcProvider {
    pub issuer: String,
    pub client_id: String,
    pub client_secret: String,
    pub redirect_url: String,
    pub authorization_endpoint: String,
    pub token_endpoint: String,
    pub jwks_uri: String,
}

/// Recognized claim names carrying group membership, in lookup order.
pub const GROUP_CLAIM_NAMES: &[&str] = &["groups", "group", "cognito:groups", "roles", "memberOf"];

/// A JSON value coming from an arbitrary claim, generalized into one of the
/// shapes OIDC providers actually send for group claims: a bare string, a
/// list, or something this implementation does not model.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum ClaimValue {
    String(String),
    StringList(Vec<String>),
    Unknown(serde_json::Value),
}

impl ClaimValue {
    /// Coerce any recognized claim shape into a flat list of group names.
    /// A mixed array silently drops non-string entries rather than failing
    /// the whole login.
    #[must_use]
    pub fn into_groups(self) -> Vec<String> {
        match self {
            Self::String(s) => vec![s],
            Self::StringList(list) => list,
            Self::Unknown(serde_json::Value::Array(items)) => items
                .into_iter()
                .filter_map(|v| v.as_str().map(ToOwned::to_owned))
                .collect(),
            Self::Unknown(_) => Vec::new(),
        }
    }
}

/// Extract group claims from a decoded ID-token claim set, checking each
/// recognized claim name in order and returning the first that is present.
#[must_use]
pub fn extract_groups(claims: &serde_json::Map<String, serde_json::Value>) -> Vec<String> {
    for name in GROUP_CLAIM_NAMES {
        if let Some(value) = claims.get(*name) {
            let claim: ClaimValue = serde_json::from_value(value.clone())
                .unwrap_or(ClaimValue::Unknown(value.clone()));
            let groups = claim.into_groups();
            if !groups.is_empty() {
                return groups;
            }
        }
    }
    Vec::new()
}

/// Identity extracted from a verified ID token.
#[derive(Debug, Clone)]
pub struct OidcIdentity {
    pub subject: String,
    pub email: Option<String>,
    pub name: Option<String>,
    pub groups: Vec<String>,
}

/// Holds the currently active provider behind a reader-writer lock so hot
/// reload never blocks in-flight logins for longer than the pointer swap.
pub struct OidcProviderHolder {
    current: RwLock<Option<Arc<OidcProvider>>>,
}

impl Default for OidcProviderHolder {
    fn default() -> Self {
        Self::new()
    }
}

impl OidcProviderHolder {
    #[must_use]
    pub fn new() -> Self {
        Self { current: RwLock::new(None) }
    }

    #[must_use]
    pub async fn current(&self) -> Option<Arc<OidcProvider>> {
        self.current.read().await.clone()
    }

    /// Atomically swap in a newly constructed provider. Callers must build
    /// `provider` (performing any discovery I/O) *before* calling this —
    /// the lock is only held for the pointer assignment.
    pub async fn swap(&self, provider: OidcProvider) {
        let mut guard = self.current.write().await;
        *guard = Some(Arc::new(provider));
    }
}

/// Generate the 32-byte cryptographically random `state` parameter stored
/// in the session across the login redirect.
#[must_use]
pub fn generate_state() -> String {
    hex::encode(crypto::random_bytes(32))
}

/// Build the provider's authorization URL for the login redirect.
#[must_use]
pub fn build_authorize_url(provider: &OidcProvider, state: &str) -> String {
    format!(
        "{}?response_type=code&client_id={}&redirect_uri={}&scope={}&state={}",
        provider.authorization_endpoint,
        urlencode(&provider.client_id),
        urlencode(&provider.redirect_url),
        urlencode("openid email profile"),
        urlencode(state),
    )
}

fn urlencode(value: &str) -> String {
    let mut out = String::with_capacity(value.len());
    for byte in value.bytes() {
        match byte {
            b'A'..=b'Z' | b'a'..=b'z' | b'0'..=b'9' | b'-' | b'_' | b'.' | b'~' => {
                out.push(byte as char);
            }
            other => out.push_str(&format!("%{other:02X}")),
        }
    }
    out
}

/// Validate that a returned `state` matches the one we stored in the
/// session, and clear it from the session either way (retrieve-and-clear).
///
/// # Errors
///
/// Returns [`IdentityError::OidcVerifyFailed`] if the values differ.
pub fn verify_state(stored: &str, returned: &str) -> Result<(), IdentityError> {
    if crypto::constant_time_eq_str(stored, returned) {
        Ok(())
    } else {
        Err(IdentityError::OidcVerifyFailed("state mismatch".to_owned()))
    }
}
