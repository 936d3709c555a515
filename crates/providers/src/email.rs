//! Email delivery via the SendGrid v3 Mail Send API.

use std::time::Duration;

use async_trait::async_trait;
use serde_json::json;

use crate::{Provider, ProviderFailure, ProviderResponse};

const SENDGRID_SEND_URL: &str = "https://api.sendgrid.com/v3/mail/send";
const PROVIDER_NAME: &str = "sendgrid";

pub struct SendGridProvider {
    client: reqwest::Client,
    credentials: Option<Credentials>,
    base_url: String,
}

struct Credentials {
    api_key: String,
    from: String,
}

impl SendGridProvider {
    /// Both the API key and the sender address are required for the adapter
    /// to be ready; otherwise it is constructed unready.
    pub fn new(
        api_key: Option<String>,
        from: Option<String>,
        timeout: Duration,
    ) -> anyhow::Result<Self> {
        let credentials = match (api_key, from) {
            (Some(api_key), Some(from)) => Some(Credentials { api_key, from }),
            _ => {
                tracing::warn!("SendGrid credentials missing, email provider unready");
                None
            }
        };

        Ok(Self {
            client: crate::http_client(timeout)?,
            credentials,
            base_url: SENDGRID_SEND_URL.to_string(),
        })
    }

    /// Overrides the API endpoint (for tests against a local stub).
    pub fn with_base_url(mut self, url: String) -> Self {
        self.base_url = url;
        self
    }
}

#[async_trait]
impl Provider for SendGridProvider {
    fn name(&self) -> &'static str {
        PROVIDER_NAME
    }

    fn ready(&self) -> bool {
        self.credentials.is_some()
    }

    async fn send(
        &self,
        recipient: &str,
        subject: Option<&str>,
        body: &str,
        _metadata: Option<&serde_json::Value>,
    ) -> Result<ProviderResponse, ProviderFailure> {
        let Some(credentials) = &self.credentials else {
            return Err(ProviderFailure::not_configured(PROVIDER_NAME, recipient));
        };

        let payload = json!({
            "personalizations": [{ "to": [{ "email": recipient }] }],
            "from": { "email": credentials.from },
            "subject": subject.unwrap_or("Notification"),
            "content": [{ "type": "text/plain", "value": body }],
        });

        let response = self
            .client
            .post(&self.base_url)
            .bearer_auth(&credentials.api_key)
            .json(&payload)
            .send()
            .await
            .map_err(|e| ProviderFailure::transport(PROVIDER_NAME, recipient, e))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(ProviderFailure::upstream(PROVIDER_NAME, recipient, status.as_u16(), body));
        }

        // SendGrid acks with 202 and an X-Message-Id header, no JSON body
        let message_id = response
            .headers()
            .get("x-message-id")
            .and_then(|v| v.to_str().ok())
            .map(String::from);

        tracing::debug!(recipient, message_id = ?message_id, "Email accepted by SendGrid");

        Ok(ProviderResponse {
            provider_message_id: message_id,
            provider: PROVIDER_NAME.to_string(),
            raw_response: None,
        })
    }
}
