//! `reqwest`-backed implementation of `keldris-core`'s webhook transport
//! boundary, with the 30-second per-attempt timeout the concurrency model
//! specifies.

use std::time::Duration;

use async_trait::async_trait;
use keldris_core::webhook::dispatcher::WebhookTransport;

const DELIVERY_TIMEOUT: Duration = Duration::from_secs(30);

pub struct ReqwestWebhookTransport {
    client: reqwest::Client,
}

impl ReqwestWebhookTransport {
    #[must_use]
    pub fn new() -> Self {
        Self { client: reqwest::Client::builder().timeout(DELIVERY_TIMEOUT).build().unwrap_or_default() }
    }
}

impl Default for ReqwestWebhookTransport {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl WebhookTransport for ReqwestWebhookTransport {
    async fn post(&self, url: &str, headers: &[(String, String)], body: &[u8]) -> Result<(u16, Vec<u8>), String> {
        let mut request = self.client.post(url).body(body.to_vec());
        for (key, value) in headers {
            request = request.header(key.as_str(), value.as_str());
        }

        let response = request.send().await.map_err(|e| e.to_string())?;
        let status = response.status().as_u16();
        let body = response.bytes().await.map_err(|e| e.to_string())?.to_vec();
        Ok((status, body))
    }
}
