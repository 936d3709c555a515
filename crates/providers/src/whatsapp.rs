//! WhatsApp delivery via the Twilio Messages API (`whatsapp:` addressing).

use std::time::Duration;

use async_trait::async_trait;

use crate::sms::{TwilioCredentials, send_twilio_message};
use crate::{Provider, ProviderFailure, ProviderResponse};

const PROVIDER_NAME: &str = "twilio-whatsapp";

pub struct TwilioWhatsappProvider {
    client: reqwest::Client,
    credentials: Option<TwilioCredentials>,
    base_url: String,
}

impl TwilioWhatsappProvider {
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
                tracing::warn!("Twilio credentials missing, WhatsApp provider unready");
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
impl Provider for TwilioWhatsappProvider {
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

        let from = prefixed(&credentials.from);
        let to = prefixed(recipient);

        send_twilio_message(
            &self.client,
            &self.base_url,
            credentials,
            PROVIDER_NAME,
            &from,
            &to,
            body,
        )
        .await
    }
}

fn prefixed(number: &str) -> String {
    if number.starts_with("whatsapp:") {
        number.to_string()
    } else {
        format!("whatsapp:{number}")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_prefix_added_once() {
        assert_eq!(prefixed("+15551234"), "whatsapp:+15551234");
        assert_eq!(prefixed("whatsapp:+15551234"), "whatsapp:+15551234");
    }
}
