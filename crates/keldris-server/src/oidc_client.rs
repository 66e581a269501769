//! OIDC discovery, token exchange, and ID-token verification.
//!
//! The network boundary `keldris-core::identity::oidc` deliberately stays
//! free of: discovery fetches `.well-known/openid-configuration`, exchange
//! trades an authorization code for tokens, and verification checks the ID
//! token's signature (against the issuer's JWKS), issuer, audience, and
//! expiry before handing back the claims `keldris-core` already knows how to
//! read group membership out of.

use jsonwebtoken::jwk::JwkSet;
use jsonwebtoken::{decode, Algorithm, DecodingKey, Validation};
use serde::Deserialize;

use keldris_core::error::IdentityError;
use keldris_core::identity::oidc::{extract_groups, OidcIdentity, OidcProvider};

#[derive(Debug, Deserialize)]
struct DiscoveryDocument {
    authorization_endpoint: String,
    token_endpoint: String,
    jwks_uri: String,
}

/// Fetch the issuer's discovery document and build a provider. Performs no
/// network I/O beyond the single discovery request — the caller swaps this
/// into the `OidcProviderHolder` outside any lock.
///
/// # Errors
///
/// Returns [`IdentityError::OidcDiscoveryFailed`] if the request fails or
/// the response cannot be parsed.
pub async fn discover(client: &reqwest::Client, issuer: &str, client_id: &str, client_secret: &str, redirect_url: &str) -> Result<OidcProvider, IdentityError> {
    let url = format!("{}/.well-known/openid-configuration", issuer.trim_end_matches('/'));
    let doc: DiscoveryDocument = client
        .get(&url)
        .send()
        .await
        .map_err(|e| IdentityError::OidcDiscoveryFailed(e.to_string()))?
        .error_for_status()
        .map_err(|e| IdentityError::OidcDiscoveryFailed(e.to_string()))?
        .json()
        .await
        .map_err(|e| IdentityError::OidcDiscoveryFailed(e.to_string()))?;

    Ok(OidcProvider {
        issuer: issuer.to_owned(),
        client_id: client_id.to_owned(),
        client_secret: client_secret.to_owned(),
        redirect_url: redirect_url.to_owned(),
        authorization_endpoint: doc.authorization_endpoint,
        token_endpoint: doc.token_endpoint,
        jwks_uri: doc.jwks_uri,
    })
}

#[derive(Debug, Deserialize)]
struct TokenResponse {
    id_token: Option<String>,
}

/// Exchange an authorization code for tokens and return the raw ID token.
///
/// # Errors
///
/// Returns [`IdentityError::OidcVerifyFailed`] if the exchange request fails,
/// and [`IdentityError::MissingIdToken`] if the response carries no
/// `id_token`.
pub async fn exchange_code(client: &reqwest::Client, provider: &OidcProvider, code: &str) -> Result<String, IdentityError> {
    let response: TokenResponse = client
        .post(&provider.token_endpoint)
        .form(&[("grant_type", "authorization_code"), ("code", code), ("redirect_uri", provider.redirect_url.as_str()), ("client_id", provider.client_id.as_str()), ("client_secret", provider.client_secret.as_str())])
        .send()
        .await
        .map_err(|e| IdentityError::OidcVerifyFailed(e.to_string()))?
        .error_for_status()
        .map_err(|e| IdentityError::OidcVerifyFailed(e.to_string()))?
        .json()
        .await
        .map_err(|e| IdentityError::OidcVerifyFailed(e.to_string()))?;

    response.id_token.ok_or(IdentityError::MissingIdToken)
}

/// Verify an ID token's signature (against the issuer's JWKS), issuer,
/// audience, and expiry, then extract `{subject, email, name}` plus group
/// claims.
///
/// # Errors
///
/// Returns [`IdentityError::OidcVerifyFailed`] if the JWKS fetch fails, no
/// matching key is found, or signature/claim validation fails.
pub async fn verify_id_token(client: &reqwest::Client, provider: &OidcProvider, id_token: &str) -> Result<OidcIdentity, IdentityError> {
    let jwks: JwkSet = client
        .get(&provider.jwks_uri)
        .send()
        .await
        .map_err(|e| IdentityError::OidcVerifyFailed(e.to_string()))?
        .json()
        .await
        .map_err(|e| IdentityError::OidcVerifyFailed(e.to_string()))?;

    let header = jsonwebtoken::decode_header(id_token).map_err(|e| IdentityError::OidcVerifyFailed(e.to_string()))?;
    let kid = header.kid.ok_or_else(|| IdentityError::OidcVerifyFailed("ID token header has no kid".to_owned()))?;
    let jwk = jwks.find(&kid).ok_or_else(|| IdentityError::OidcVerifyFailed("no matching key in JWKS".to_owned()))?;
    let decoding_key = DecodingKey::from_jwk(jwk).map_err(|e| IdentityError::OidcVerifyFailed(e.to_string()))?;

    let mut validation = Validation::new(header.alg.unwrap_or(Algorithm::RS256));
    validation.set_audience(&[provider.client_id.as_str()]);
    validation.set_issuer(&[provider.issuer.as_str()]);

    let decoded = decode::<serde_json::Map<String, serde_json::Value>>(id_token, &decoding_key, &validation).map_err(|e| IdentityError::OidcVerifyFailed(e.to_string()))?;
    let claims = decoded.claims;

    let subject = claims.get("sub").and_then(|v| v.as_str()).ok_or_else(|| IdentityError::OidcVerifyFailed("missing sub claim".to_owned()))?.to_owned();
    let email = claims.get("email").and_then(|v| v.as_str()).map(ToOwned::to_owned);
    let name = claims.get("name").and_then(|v| v.as_str()).map(ToOwned::to_owned);
    let groups = extract_groups(&claims);

    Ok(OidcIdentity { subject, email, name, groups })
}
