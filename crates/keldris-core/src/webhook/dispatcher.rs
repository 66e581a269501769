//! Webhook delivery and retry (component C8).
//!
//! An attempt is spawned immediately on dispatch; failed attempts become
//! `retrying` deliveries the retry worker picks up on its 10-second poll,
//! processed through a bounded worker pool so one slow endpoint never stalls
//! every other delivery.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::sync::Arc;
use tokio::sync::Semaphore;
use uuid::Uuid;

use crate::error::WebhookError;
use crate::models::{WebhookDelivery, WebhookDeliveryStatus, WebhookEndpoint};
use crate::webhook::signing;

const MAX_RESPONSE_BODY_BYTES: usize = 64 * 1024;
const DEFAULT_WORKER_POOL_SIZE: usize = 5;
const RESERVED_HEADER_PREFIX: &str = "x-keldris";

/// Transport boundary so the dispatcher never depends on `reqwest` directly.
#[async_trait]
pub trait WebhookTransport: Send + Sync {
    /// Returns `(status_code, response_body)`. Transport-level failures
    /// (connect refused, TLS error, timeout) surface as `Err`.
    async fn post(&self, url: &str, headers: &[(String, String)], body: &[u8]) -> Result<(u16, Vec<u8>), String>;
}

#[async_trait]
pub trait WebhookDeliveryStore: Send + Sync {
    async fn insert(&self, delivery: WebhookDelivery) -> Result<(), String>;
    async fn update(&self, delivery: &WebhookDelivery) -> Result<(), String>;
    async fn due_for_retry(&self, now: DateTime<Utc>, limit: usize) -> Result<Vec<WebhookDelivery>, String>;
    async fn endpoint_secret(&self, endpoint_id: Uuid) -> Result<Vec<u8>, String>;
}

/// Build the outgoing request headers: Keldris-prefixed headers first, then
/// the endpoint's custom headers, skipping any that would collide with a
/// reserved `X-Keldris-*` name.
#[must_use]
pub fn build_headers(endpoint: &WebhookEndpoint, delivery_id: Uuid, event_type: &str, signature: &str, timestamp: i64) -> Vec<(String, String)> {
    let mut headers = vec![
        ("Content-Type".to_owned(), "application/json".to_owned()),
        ("User-Agent".to_owned(), "Keldris-Webhook/1.0".to_owned()),
        ("X-Keldris-Delivery".to_owned(), delivery_id.to_string()),
        ("X-Keldris-Event".to_owned(), event_type.to_owned()),
        ("X-Keldris-Signature-256".to_owned(), signature.to_owned()),
        ("X-Keldris-Timestamp".to_owned(), timestamp.to_string()),
    ];

    for (key, value) in &endpoint.headers {
        if !key.to_ascii_lowercase().starts_with(RESERVED_HEADER_PREFIX) {
            headers.push((key.clone(), value.clone()));
        }
    }

    headers
}

/// Truncate a response body to the 64 KiB limit recorded with each delivery.
#[must_use]
pub fn truncate_response_body(body: Vec<u8>) -> Vec<u8> {
    let mut body = body;
    body.truncate(MAX_RESPONSE_BODY_BYTES);
    body
}

/// `30 * 2^(attempt - 1)` seconds.
#[must_use]
pub fn retry_backoff(attempt: i32) -> chrono::Duration {
    let seconds = 30i64.saturating_mul(1i64 << attempt.saturating_sub(1).max(0).min(40));
    chrono::Duration::seconds(seconds)
}

/// Attempt one delivery: sign, POST, classify, and update the delivery
/// record in place. 2xx is delivered; anything else (including a transport
/// error) is a failure, retried until `max_attempts`.
pub async fn attempt_delivery(
    transport: &dyn WebhookTransport,
    store: &dyn WebhookDeliveryStore,
    endpoint: &WebhookEndpoint,
    delivery: &mut WebhookDelivery,
    now: DateTime<Utc>,
) -> Result<(), WebhookError> {
    let secret = store.endpoint_secret(endpoint.id).await.map_err(WebhookError::Store)?;
    let payload_bytes = serde_json::to_vec(&delivery.payload).map_err(|e| WebhookError::RequestFailed(e.to_string()))?;
    let signature = signing::sign(&secret, &payload_bytes).map_err(|e| WebhookError::RequestFailed(e.to_string()))?;
    let headers = build_headers(endpoint, delivery.id, &delivery.event_type, &signature, now.timestamp());

    delivery.attempt_number += 1;

    match transport.post(&endpoint.url, &headers, &payload_bytes).await {
        Ok((status, body)) if (200..300).contains(&status) => {
            delivery.status = WebhookDeliveryStatus::Delivered;
            delivery.response_status = Some(i32::from(status));
            delivery.response_body = Some(String::from_utf8_lossy(&truncate_response_body(body)).into_owned());
            delivery.next_retry_at = None;
        }
        Ok((status, body)) => {
            delivery.response_status = Some(i32::from(status));
            delivery.response_body = Some(String::from_utf8_lossy(&truncate_response_body(body)).into_owned());
            apply_retry_or_fail(delivery, now);
        }
        Err(_) => {
            delivery.response_status = None;
            apply_retry_or_fail(delivery, now);
        }
    }

    store.update(delivery).await.map_err(WebhookError::Store)
}

fn apply_retry_or_fail(delivery: &mut WebhookDelivery, now: DateTime<Utc>) {
    if delivery.attempt_number >= delivery.max_attempts {
        delivery.status = WebhookDeliveryStatus::Failed;
        delivery.next_retry_at = None;
    } else {
        delivery.status = WebhookDeliveryStatus::Retrying;
        delivery.next_retry_at = Some(now + retry_backoff(delivery.attempt_number));
    }
}

/// Poll a bounded batch of due retries and process them through a semaphore
/// of `pool_size` concurrent attempts.
pub async fn run_retry_pass(
    transport: Arc<dyn WebhookTransport>,
    store: Arc<dyn WebhookDeliveryStore>,
    endpoints: &std::collections::HashMap<Uuid, WebhookEndpoint>,
    pool_size: usize,
    batch_size: usize,
    now: DateTime<Utc>,
) -> Result<usize, WebhookError> {
    let due = store.due_for_retry(now, batch_size).await.map_err(WebhookError::Store)?;
    let semaphore = Arc::new(Semaphore::new(pool_size.max(1)));
    let mut handles = Vec::with_capacity(due.len());

    for mut delivery in due {
        let Some(endpoint) = endpoints.get(&delivery.endpoint_id).cloned() else { continue };
        let transport = Arc::clone(&transport);
        let store = Arc::clone(&store);
        let semaphore = Arc::clone(&semaphore);

        handles.push(tokio::spawn(async move {
            let _permit = semaphore.acquire().await;
            let _ = attempt_delivery(transport.as_ref(), store.as_ref(), &endpoint, &mut delivery, now).await;
        }));
    }

    let processed = handles.len();
    for handle in handles {
        let _ = handle.await;
    }
    Ok(processed)
}

#[must_use]
pub fn default_pool_size() -> usize {
    DEFAULT_WORKER_POOL_SIZE
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use std::collections::HashMap;
    use tokio::sync::Mutex;

    fn sample_endpoint(extra_headers: HashMap<String, String>) -> WebhookEndpoint {
        WebhookEndpoint {
            id: Uuid::new_v4(),
            org_id: Uuid::new_v4(),
            url: "https://example.com/hook".to_owned(),
            secret_encrypted: vec![],
            events: vec!["backup.completed".to_owned()],
            headers: extra_headers,
            retry_count: 3,
            enabled: true,
        }
    }

    fn sample_delivery(endpoint_id: Uuid) -> WebhookDelivery {
        WebhookDelivery {
            id: Uuid::new_v4(),
            endpoint_id,
            event_type: "backup.completed".to_owned(),
            payload: serde_json::json!({"ok": true}),
            attempt_number: 0,
            max_attempts: 3,
            status: WebhookDeliveryStatus::Pending,
            next_retry_at: None,
            response_status: None,
            response_body: None,
        }
    }

    #[test]
    fn custom_headers_cannot_override_reserved_prefix() {
        let mut extra = HashMap::new();
        extra.insert("X-Keldris-Signature-256".to_owned(), "forged".to_owned());
        extra.insert("X-Custom-Tag".to_owned(), "value".to_owned());
        let endpoint = sample_endpoint(extra);

        let headers = build_headers(&endpoint, Uuid::new_v4(), "backup.completed", "sha256=real", 1_700_000_000);

        let sig = headers.iter().find(|(k, _)| k == "X-Keldris-Signature-256").unwrap();
        assert_eq!(sig.1, "sha256=real");
        assert!(headers.iter().any(|(k, _)| k == "X-Custom-Tag"));
    }

    #[test]
    fn response_body_truncated_to_64kib() {
        let body = vec![b'a'; 200_000];
        let truncated = truncate_response_body(body);
        assert_eq!(truncated.len(), MAX_RESPONSE_BODY_BYTES);
    }

    #[test]
    fn backoff_matches_thirty_times_two_to_the_attempt_minus_one() {
        assert_eq!(retry_backoff(1), chrono::Duration::seconds(30));
        assert_eq!(retry_backoff(2), chrono::Duration::seconds(60));
        assert_eq!(retry_backoff(3), chrono::Duration::seconds(120));
    }

    struct FakeTransport {
        status: u16,
        body: Vec<u8>,
        should_error: bool,
    }

    #[async_trait]
    impl WebhookTransport for FakeTransport {
        async fn post(&self, _url: &str, _headers: &[(String, String)], _body: &[u8]) -> Result<(u16, Vec<u8>), String> {
            if self.should_error {
                Err("connection refused".to_owned())
            } else {
                Ok((self.status, self.body.clone()))
            }
        }
    }

    #[derive(Default)]
    struct FakeStore {
        updated: Mutex<Vec<WebhookDelivery>>,
    }

    #[async_trait]
    impl WebhookDeliveryStore for FakeStore {
        async fn insert(&self, delivery: WebhookDelivery) -> Result<(), String> {
            self.updated.lock().await.push(delivery);
            Ok(())
        }
        async fn update(&self, delivery: &WebhookDelivery) -> Result<(), String> {
            self.updated.lock().await.push(delivery.clone());
            Ok(())
        }
        async fn due_for_retry(&self, _now: DateTime<Utc>, _limit: usize) -> Result<Vec<WebhookDelivery>, String> {
            Ok(vec![])
        }
        async fn endpoint_secret(&self, _endpoint_id: Uuid) -> Result<Vec<u8>, String> {
            Ok(b"secret".to_vec())
        }
    }

    #[tokio::test]
    async fn two_hundred_response_marks_delivered() {
        let endpoint = sample_endpoint(HashMap::new());
        let transport = FakeTransport { status: 200, body: b"ok".to_vec(), should_error: false };
        let store = FakeStore::default();
        let mut delivery = sample_delivery(endpoint.id);

        attempt_delivery(&transport, &store, &endpoint, &mut delivery, Utc::now()).await.unwrap();
        assert_eq!(delivery.status, WebhookDeliveryStatus::Delivered);
        assert_eq!(delivery.attempt_number, 1);
    }

    #[tokio::test]
    async fn non_2xx_schedules_retry_until_max_attempts() {
        let endpoint = sample_endpoint(HashMap::new());
        let transport = FakeTransport { status: 500, body: b"err".to_vec(), should_error: false };
        let store = FakeStore::default();
        let mut delivery = sample_delivery(endpoint.id);
        delivery.max_attempts = 2;

        attempt_delivery(&transport, &store, &endpoint, &mut delivery, Utc::now()).await.unwrap();
        assert_eq!(delivery.status, WebhookDeliveryStatus::Retrying);
        assert!(delivery.next_retry_at.is_some());

        attempt_delivery(&transport, &store, &endpoint, &mut delivery, Utc::now()).await.unwrap();
        assert_eq!(delivery.status, WebhookDeliveryStatus::Failed);
        assert!(delivery.next_retry_at.is_none());
    }

    #[tokio::test]
    async fn transport_error_counts_as_failure() {
        let endpoint = sample_endpoint(HashMap::new());
        let transport = FakeTransport { status: 0, body: vec![], should_error: true };
        let store = FakeStore::default();
        let mut delivery = sample_delivery(endpoint.id);
        delivery.max_attempts = 5;

        attempt_delivery(&transport, &store, &endpoint, &mut delivery, Utc::now()).await.unwrap();
        assert_eq!(delivery.status, WebhookDeliveryStatus::Retrying);
        assert!(delivery.response_status.is_none());
    }
}
