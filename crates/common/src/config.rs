use serde::Deserialize;

/// Global application configuration loaded from environment variables.
#[derive(Debug, Clone, Deserialize)]
pub struct AppConfig {
    /// PostgreSQL connection string
    pub database_url: String,

    /// Redis connection string
    pub redis_url: String,

    /// Maximum number of PostgreSQL connections in the pool (default: 20)
    pub db_max_connections: u32,

    /// Maximum retries per transaction before dead-lettering (default: 3)
    pub max_retry_attempts: u32,

    /// Base delay for exponential retry backoff in milliseconds (default: 5000)
    pub retry_delay_ms: u64,

    /// Backoff multiplier per retry (default: 2)
    pub backoff_multiplier: u32,

    /// Worker pool size for the regular queue (default: 10)
    pub queue_concurrency: usize,

    /// Worker pool size for the priority queue (default: 20)
    pub priority_queue_concurrency: usize,

    /// Per-call provider timeout in milliseconds (default: 30000)
    pub provider_timeout_ms: u64,

    /// Deadline for draining in-flight jobs on shutdown (default: 30)
    pub shutdown_grace_secs: u64,

    /// SendGrid API key for email delivery
    pub sendgrid_api_key: Option<String>,

    /// Email sender address
    pub email_from: Option<String>,

    /// Twilio account SID (SMS and WhatsApp)
    pub twilio_account_sid: Option<String>,

    /// Twilio auth token
    pub twilio_auth_token: Option<String>,

    /// Twilio sender number for SMS
    pub twilio_sms_from: Option<String>,

    /// Twilio sender number for WhatsApp
    pub twilio_whatsapp_from: Option<String>,

    /// FCM server key for push delivery
    pub fcm_server_key: Option<String>,
}

impl AppConfig {
    /// Load configuration from environment variables.
    pub fn from_env() -> anyhow::Result<Self> {
        dotenvy::dotenv().ok();

        Ok(Self {
            database_url: std::env::var("DATABASE_URL")
                .map_err(|_| anyhow::anyhow!("DATABASE_URL environment variable is required"))?,
            redis_url: std::env::var("REDIS_URL")
                .unwrap_or_else(|_| "redis://localhost:6379".to_string()),
            db_max_connections: parse_var("DB_MAX_CONNECTIONS", 20)?,
            max_retry_attempts: parse_var("MAX_RETRY_ATTEMPTS", 3)?,
            retry_delay_ms: parse_var("RETRY_DELAY_MS", 5000)?,
            backoff_multiplier: parse_var("BACKOFF_MULTIPLIER", 2)?,
            queue_concurrency: parse_var("QUEUE_CONCURRENCY", 10)?,
            priority_queue_concurrency: parse_var("PRIORITY_QUEUE_CONCURRENCY", 20)?,
            provider_timeout_ms: parse_var("PROVIDER_TIMEOUT_MS", 30_000)?,
            shutdown_grace_secs: parse_var("SHUTDOWN_GRACE_SECS", 30)?,
            sendgrid_api_key: std::env::var("SENDGRID_API_KEY").ok(),
            email_from: std::env::var("EMAIL_FROM").ok(),
            twilio_account_sid: std::env::var("TWILIO_ACCOUNT_SID").ok(),
            twilio_auth_token: std::env::var("TWILIO_AUTH_TOKEN").ok(),
            twilio_sms_from: std::env::var("TWILIO_SMS_FROM").ok(),
            twilio_whatsapp_from: std::env::var("TWILIO_WHATSAPP_FROM").ok(),
            fcm_server_key: std::env::var("FCM_SERVER_KEY").ok(),
        })
    }
}

fn parse_var<T: std::str::FromStr>(name: &str, default: T) -> anyhow::Result<T> {
    match std::env::var(name) {
        Ok(raw) => raw
            .parse()
            .map_err(|_| anyhow::anyhow!("{} must be a valid {}", name, std::any::type_name::<T>())),
        Err(_) => Ok(default),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_var_default() {
        assert_eq!(parse_var::<u32>("COURIER_TEST_UNSET_VAR", 7).unwrap(), 7);
    }
}
