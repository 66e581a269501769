//! Canonical payload construction and HMAC signing (component C8).

use chrono::{DateTime, Utc};
use serde_json::json;
use uuid::Uuid;

use crate::crypto;

/// Build the canonical JSON payload delivered to subscriber endpoints.
#[must_use]
pub fn build_payload(delivery_id: Uuid, event_type: &str, timestamp: DateTime<Utc>, org_id: Uuid, data: serde_json::Value) -> serde_json::Value {
    json!({
        "id": delivery_id,
        "event_type": event_type,
        "timestamp": timestamp.to_rfc3339_opts(chrono::SecondsFormat::Secs, true),
        "org_id": org_id,
        "data": data,
    })
}

/// Compute `sha256=<hex(HMAC-SHA256(secret, payload))>`.
///
/// # Errors
///
/// Propagates [`crypto::hmac_sha256_hex`]'s error, which in practice never
/// occurs since HMAC accepts keys of any length.
pub fn sign(secret: &[u8], payload_bytes: &[u8]) -> Result<String, crate::error::CryptoError> {
    Ok(format!("sha256={}", crypto::hmac_sha256_hex(secret, payload_bytes)?))
}

/// Re-compute the signature over `payload_bytes` and constant-time-compare
/// it to the header value supplied by the caller.
#[must_use]
pub fn verify(secret: &[u8], payload_bytes: &[u8], supplied_signature: &str) -> bool {
    match sign(secret, payload_bytes) {
        Ok(expected) => crypto::constant_time_eq_str(&expected, supplied_signature),
        Err(_) => false,
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn sign_and_verify_round_trip() {
        let secret = b"endpoint-secret";
        let payload = br#"{"event_type":"backup.completed"}"#;
        let signature = sign(secret, payload).unwrap();
        assert!(signature.starts_with("sha256="));
        assert!(verify(secret, payload, &signature));
    }

    #[test]
    fn tampered_payload_fails_verification() {
        let secret = b"endpoint-secret";
        let signature = sign(secret, b"original").unwrap();
        assert!(!verify(secret, b"tampered", &signature));
    }

    #[test]
    fn payload_has_canonical_shape() {
        let payload = build_payload(
            Uuid::new_v4(),
            "backup.completed",
            DateTime::parse_from_rfc3339("2026-01-01T00:00:00Z").unwrap().with_timezone(&Utc),
            Uuid::new_v4(),
            json!({"backup_id": "abc"}),
        );
        assert_eq!(payload["event_type"], "backup.completed");
        assert_eq!(payload["timestamp"], "2026-01-01T00:00:00Z");
    }
}
