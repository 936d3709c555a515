//! SMS delivery via the Twilio Messages API.

use std::time::Duration;

use async_trait::async_trait;

use crate::{Provider, ProviderFailure, ProviderResponse};

const PROVIDER_NAME: &str = "twilio-sms";

pub struct TwilioSmsProvider {
    client: reqwest::Client,
    credentials: Option<TwilioCredentials>,
    base_url: String,
}

pub(crate) struct TwilioCredentials {
    pub account_sid: String,
    pub auth_token: String,
    pub from: String,
}

impl TwilioSmsProvider {
    pub fn new(
        account_sid: Option<String>,
        auth_token: Option<String>,
        from: Option<String>,
        timeout: Duration,
    ) -> anyhow::Result<Self> {
        let credentials = match (account_sid, auth_token, from) {
            (Some(account_sid), Some(auth_token), Some(from)) => {
                Some(TwilioCredentials { account_sid, auth_token, from })
            }
            _ => {
                tracing::warn!("Twilio credentials missing, SMS provider unready");
                None
            }
        };

        Ok(Self {
            client: crate::http_client(timeout)?,
            credentials,
            base_url: "https://api.twilio.com".to_string(),
        })
    }

    /// Overrides the API endpoint (for tests against a local stub).
    pub fn with_base_url(mut self, url: String) -> Self {
        self.base_url = url;
        self
    }
}

#[async_trait]
impl Provider for TwilioSmsProvider {
    fn name(&self) -> &'static str {
        PROVIDER_NAME
    }

    fn ready(&self) -> bool {
        self.credentials.is_some()
    }

    async fn send(
        &self,
        recipient: &str,
        _subject: Option<&str>,
        body: &str,
        _metadata: Option<&serde_json::Value>,
    ) -> Result<ProviderResponse, ProviderFailure> {
        let Some(credentials) = &self.credentials else {
            return Err(ProviderFailure::not_configured(PROVIDER_NAME, recipient));
        };

        send_twilio_message(
            &self.client,
            &self.base_url,
            credentials,
            PROVIDER_NAME,
            &credentials.from,
            recipient,
            body,
        )
        .await
    }
}

/// Shared Twilio Messages call used by the SMS and WhatsApp adapters.
/// `from` and `to` carry the `whatsapp:` prefix for the WhatsApp channel.
pub(crate) async fn send_twilio_message(
    client: &reqwest::Client,
    base_url: &str,
    credentials: &TwilioCredentials,
    provider_name: &'static str,
    from: &str,
    to: &str,
    body: &str,
) -> Result<ProviderResponse, ProviderFailure> {
    let url = format!(
        "{base_url}/2010-04-01/Accounts/{}/Messages.json",
        credentials.account_sid
    );

    let response = client
        .post(&url)
        .basic_auth(&credentials.account_sid, Some(&credentials.auth_token))
        .form(&[("From", from), ("To", to), ("Body", body)])
        .send()
        .await
        .map_err(|e| ProviderFailure::transport(provider_name, to, e))?;

    let status = response.status();
    if !status.is_success() {
        let body = response.text().await.unwrap_or_default();
        return Err(ProviderFailure::upstream(provider_name, to, status.as_u16(), body));
    }

    let raw: serde_json::Value = response
        .json()
        .await
        .map_err(|e| ProviderFailure::transport(provider_name, to, e))?;

    let message_sid = raw.get("sid").and_then(|v| v.as_str()).map(String::from);

    tracing::debug!(to, sid = ?message_sid, provider = provider_name, "Message accepted by Twilio");

    Ok(ProviderResponse {
        provider_message_id: message_sid,
        provider: provider_name.to_string(),
        raw_response: Some(raw),
    })
}
