//! Channel provider adapters.
//!
//! Each delivery channel is served by one adapter behind the uniform
//! [`Provider`] contract: EMAIL via SendGrid, SMS and WHATSAPP via Twilio,
//! PUSH via FCM. Adapters never silently succeed on transport failure; any
//! non-ack from the upstream API becomes a [`ProviderFailure`].

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use thiserror::Error;

use courier_common::config::AppConfig;
use courier_common::types::Channel;

pub mod email;
pub mod push;
pub mod sms;
pub mod whatsapp;

/// Error code reported by an adapter whose credentials are missing.
/// Classified as non-retryable INVALID_DATA.
pub const NOT_CONFIGURED_CODE: &str = "PROVIDER_NOT_CONFIGURED";

/// Successful provider acknowledgement.
#[derive(Debug, Clone)]
pub struct ProviderResponse {
    pub provider_message_id: Option<String>,
    pub provider: String,
    pub raw_response: Option<serde_json::Value>,
}

/// A failed delivery attempt, with the fields the classifier matches over.
#[derive(Debug, Error)]
#[error("provider {provider} failed for {recipient}: {message}")]
pub struct ProviderFailure {
    pub provider: String,
    pub recipient: String,
    pub error_code: Option<String>,
    pub status_code: Option<u16>,
    pub message: String,
    #[source]
    pub source: Option<Box<dyn std::error::Error + Send + Sync>>,
}

impl ProviderFailure {
    pub fn not_configured(provider: &str, recipient: &str) -> Self {
        Self {
            provider: provider.to_string(),
            recipient: recipient.to_string(),
            error_code: Some(NOT_CONFIGURED_CODE.to_string()),
            status_code: None,
            message: format!("{provider} provider is not configured"),
            source: None,
        }
    }

    pub fn timeout(provider: &str, recipient: &str, timeout: Duration) -> Self {
        Self {
            provider: provider.to_string(),
            recipient: recipient.to_string(),
            error_code: Some("ETIMEDOUT".to_string()),
            status_code: None,
            message: format!("provider call timed out after {} ms", timeout.as_millis()),
            source: None,
        }
    }

    /// Map a reqwest transport error onto the closed failure record.
    pub fn transport(provider: &str, recipient: &str, error: reqwest::Error) -> Self {
        let error_code = if error.is_timeout() {
            Some("ETIMEDOUT".to_string())
        } else if error.is_connect() {
            Some("ECONNREFUSED".to_string())
        } else {
            None
        };

        Self {
            provider: provider.to_string(),
            recipient: recipient.to_string(),
            error_code,
            status_code: error.status().map(|s| s.as_u16()),
            message: format!("network error: {error}"),
            source: Some(Box::new(error)),
        }
    }

    /// Build a failure from a non-success HTTP status and response body.
    pub fn upstream(provider: &str, recipient: &str, status: u16, body: String) -> Self {
        Self {
            provider: provider.to_string(),
            recipient: recipient.to_string(),
            error_code: None,
            status_code: Some(status),
            message: format!("upstream returned {status}: {body}"),
            source: None,
        }
    }
}

/// Uniform delivery contract implemented by every channel adapter.
#[async_trait]
pub trait Provider: Send + Sync {
    /// Short provider identifier recorded in transaction metadata and logs.
    fn name(&self) -> &'static str;

    /// Whether the adapter has the credentials it needs to deliver.
    fn ready(&self) -> bool;

    async fn send(
        &self,
        recipient: &str,
        subject: Option<&str>,
        body: &str,
        metadata: Option<&serde_json::Value>,
    ) -> Result<ProviderResponse, ProviderFailure>;
}

/// Fixed channel → provider mapping.
#[derive(Clone)]
pub struct ProviderRegistry {
    email: Arc<dyn Provider>,
    sms: Arc<dyn Provider>,
    whatsapp: Arc<dyn Provider>,
    push: Arc<dyn Provider>,
}

impl ProviderRegistry {
    pub fn new(
        email: Arc<dyn Provider>,
        sms: Arc<dyn Provider>,
        whatsapp: Arc<dyn Provider>,
        push: Arc<dyn Provider>,
    ) -> Self {
        Self { email, sms, whatsapp, push }
    }

    /// Construct all adapters from configured credentials. Adapters with
    /// missing credentials are created unready rather than failing startup.
    pub fn from_config(config: &AppConfig) -> anyhow::Result<Self> {
        let timeout = Duration::from_millis(config.provider_timeout_ms);

        Ok(Self::new(
            Arc::new(email::SendGridProvider::new(
                config.sendgrid_api_key.clone(),
                config.email_from.clone(),
                timeout,
            )?),
            Arc::new(sms::TwilioSmsProvider::new(
                config.twilio_account_sid.clone(),
                config.twilio_auth_token.clone(),
                config.twilio_sms_from.clone(),
                timeout,
            )?),
            Arc::new(whatsapp::TwilioWhatsappProvider::new(
                config.twilio_account_sid.clone(),
                config.twilio_auth_token.clone(),
                config.twilio_whatsapp_from.clone(),
                timeout,
            )?),
            Arc::new(push::FcmProvider::new(config.fcm_server_key.clone(), timeout)?),
        ))
    }

    pub fn get(&self, channel: Channel) -> &dyn Provider {
        match channel {
            Channel::Email => self.email.as_ref(),
            Channel::Sms => self.sms.as_ref(),
            Channel::Whatsapp => self.whatsapp.as_ref(),
            Channel::Push => self.push.as_ref(),
        }
    }
}

/// Shared reqwest client construction for the HTTP adapters.
pub(crate) fn http_client(timeout: Duration) -> Result<reqwest::Client, anyhow::Error> {
    reqwest::Client::builder()
        .timeout(timeout)
        .build()
        .map_err(|e| anyhow::anyhow!("failed to build HTTP client: {e}"))
}
