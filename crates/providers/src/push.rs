//! Push delivery via the FCM HTTP API. The recipient is a device
//! registration token.

use std::time::Duration;

use async_trait::async_trait;
use serde_json::json;

use crate::{Provider, ProviderFailure, ProviderResponse};

const FCM_SEND_URL: &str = "https://fcm.googleapis.com/fcm/send";
const PROVIDER_NAME: &str = "fcm";

pub struct FcmProvider {
    client: reqwest::Client,
    server_key: Option<String>,
    base_url: String,
}

impl FcmProvider {
    pub fn new(server_key: Option<String>, timeout: Duration) -> anyhow::Result<Self> {
        if server_key.is_none() {
            tracing::warn!("FCM server key missing, push provider unready");
        }

        Ok(Self {
            client: crate::http_client(timeout)?,
            server_key,
            base_url: FCM_SEND_URL.to_string(),
        })
    }

    /// Overrides the API endpoint (for tests against a local stub).
    pub fn with_base_url(mut self, url: String) -> Self {
        self.base_url = url;
        self
    }
}

#[async_trait]
impl Provider for FcmProvider {
    fn name(&self) -> &'static str {
        PROVIDER_NAME
    }

    fn ready(&self) -> bool {
        self.server_key.is_some()
    }

    async fn send(
        &self,
        recipient: &str,
        subject: Option<&str>,
        body: &str,
        metadata: Option<&serde_json::Value>,
    ) -> Result<ProviderResponse, ProviderFailure> {
        let Some(server_key) = &self.server_key else {
            return Err(ProviderFailure::not_configured(PROVIDER_NAME, recipient));
        };

        let payload = json!({
            "to": recipient,
            "notification": {
                "title": subject.unwrap_or("Notification"),
                "body": body,
            },
            "data": metadata.cloned().unwrap_or_else(|| json!({})),
        });

        let response = self
            .client
            .post(&self.base_url)
            .header("Authorization", format!("key={server_key}"))
            .json(&payload)
            .send()
            .await
            .map_err(|e| ProviderFailure::transport(PROVIDER_NAME, recipient, e))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(ProviderFailure::upstream(PROVIDER_NAME, recipient, status.as_u16(), body));
        }

        let raw: serde_json::Value = response
            .json()
            .await
            .map_err(|e| ProviderFailure::transport(PROVIDER_NAME, recipient, e))?;

        // FCM reports per-message failures inside a 200 response
        if raw.get("failure").and_then(|v| v.as_i64()).unwrap_or(0) > 0 {
            let detail = raw
                .get("results")
                .and_then(|r| r.get(0))
                .and_then(|r| r.get("error"))
                .and_then(|e| e.as_str())
                .unwrap_or("unknown FCM error");
            return Err(ProviderFailure {
                provider: PROVIDER_NAME.to_string(),
                recipient: recipient.to_string(),
                error_code: Some(detail.to_string()),
                status_code: Some(status.as_u16()),
                message: format!("FCM rejected the message: {detail}"),
                source: None,
            });
        }

        let message_id = raw
            .get("results")
            .and_then(|r| r.get(0))
            .and_then(|r| r.get("message_id"))
            .and_then(|v| v.as_str())
            .map(String::from);

        tracing::debug!(recipient, message_id = ?message_id, "Push accepted by FCM");

        Ok(ProviderResponse {
            provider_message_id: message_id,
            provider: PROVIDER_NAME.to_string(),
            raw_response: Some(raw),
        })
    }
}
