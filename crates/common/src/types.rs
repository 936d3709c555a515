use chrono::{DateTime, Utc};
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use uuid::Uuid;

/// Delivery medium for a notification.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, sqlx::Type)]
#[sqlx(type_name = "text", rename_all = "UPPERCASE")]
#[serde(rename_all = "UPPERCASE")]
pub enum Channel {
    Email,
    Sms,
    Whatsapp,
    Push,
}

impl Channel {
    /// All channels in the stable preference order.
    pub const ALL: [Channel; 4] = [Channel::Email, Channel::Sms, Channel::Whatsapp, Channel::Push];
}

impl std::fmt::Display for Channel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Channel::Email => write!(f, "EMAIL"),
            Channel::Sms => write!(f, "SMS"),
            Channel::Whatsapp => write!(f, "WHATSAPP"),
            Channel::Push => write!(f, "PUSH"),
        }
    }
}

/// Business category of a notification.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type)]
#[sqlx(type_name = "text", rename_all = "UPPERCASE")]
#[serde(rename_all = "UPPERCASE")]
pub enum NotificationType {
    Transactional,
    Marketing,
    System,
    Alert,
}

impl std::fmt::Display for NotificationType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            NotificationType::Transactional => write!(f, "TRANSACTIONAL"),
            NotificationType::Marketing => write!(f, "MARKETING"),
            NotificationType::System => write!(f, "SYSTEM"),
            NotificationType::Alert => write!(f, "ALERT"),
        }
    }
}

/// Lifecycle state of a transaction.
///
/// `Sent` and `DeadLetter` are terminal. `Failed` is never produced by the
/// worker; it exists so analytics can group it with `DeadLetter`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type)]
#[sqlx(type_name = "text", rename_all = "SCREAMING_SNAKE_CASE")]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum TransactionStatus {
    Pending,
    Queued,
    Processing,
    Sent,
    Failed,
    Retry,
    DeadLetter,
}

impl TransactionStatus {
    /// Terminal states never transition further.
    pub fn is_terminal(self) -> bool {
        matches!(self, TransactionStatus::Sent | TransactionStatus::DeadLetter)
    }
}

impl std::fmt::Display for TransactionStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            TransactionStatus::Pending => write!(f, "PENDING"),
            TransactionStatus::Queued => write!(f, "QUEUED"),
            TransactionStatus::Processing => write!(f, "PROCESSING"),
            TransactionStatus::Sent => write!(f, "SENT"),
            TransactionStatus::Failed => write!(f, "FAILED"),
            TransactionStatus::Retry => write!(f, "RETRY"),
            TransactionStatus::DeadLetter => write!(f, "DEAD_LETTER"),
        }
    }
}

/// Delivery priority. Governs queue selection (`>= High` routes to the
/// priority queue) and in-queue ordering.
///
/// Serialized as its numeric value (1..4) so HTTP DTOs carry plain integers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, sqlx::Type)]
#[repr(i32)]
pub enum Priority {
    Low = 1,
    Medium = 2,
    High = 3,
    Urgent = 4,
}

impl Priority {
    pub fn from_i32(value: i32) -> Option<Self> {
        match value {
            1 => Some(Priority::Low),
            2 => Some(Priority::Medium),
            3 => Some(Priority::High),
            4 => Some(Priority::Urgent),
            _ => None,
        }
    }

    pub fn as_i32(self) -> i32 {
        self as i32
    }
}

impl Serialize for Priority {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_i32(*self as i32)
    }
}

impl<'de> Deserialize<'de> for Priority {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let value = i32::deserialize(deserializer)?;
        Priority::from_i32(value).ok_or_else(|| {
            serde::de::Error::custom(format!("priority must be between 1 and 4, got {value}"))
        })
    }
}

impl std::fmt::Display for Priority {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", *self as i32)
    }
}

/// Classification of a delivery failure, surfaced in `ErrorLog.error_type`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type)]
#[sqlx(type_name = "text", rename_all = "SCREAMING_SNAKE_CASE")]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ErrorKind {
    NetworkError,
    RateLimit,
    AuthenticationError,
    InvalidData,
    ProviderError,
    Retryable,
    NonRetryable,
}

impl std::fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ErrorKind::NetworkError => write!(f, "NETWORK_ERROR"),
            ErrorKind::RateLimit => write!(f, "RATE_LIMIT"),
            ErrorKind::AuthenticationError => write!(f, "AUTHENTICATION_ERROR"),
            ErrorKind::InvalidData => write!(f, "INVALID_DATA"),
            ErrorKind::ProviderError => write!(f, "PROVIDER_ERROR"),
            ErrorKind::Retryable => write!(f, "RETRYABLE"),
            ErrorKind::NonRetryable => write!(f, "NON_RETRYABLE"),
        }
    }
}

/// The durable record of one notification submission across its lifecycle.
#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
#[serde(rename_all = "camelCase")]
pub struct Transaction {
    pub transaction_id: Uuid,
    pub user_id: String,
    pub notification_type: NotificationType,
    pub channel: Channel,
    pub status: TransactionStatus,
    pub content: String,
    pub subject: Option<String>,
    pub recipient: String,
    pub metadata: serde_json::Value,
    pub priority: Priority,
    pub retry_count: i32,
    pub max_retries: i32,
    pub failure_reason: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub sent_at: Option<DateTime<Utc>>,
    pub failed_at: Option<DateTime<Utc>>,
}

/// One failed delivery attempt, append-only.
#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
#[serde(rename_all = "camelCase")]
pub struct ErrorLog {
    pub id: Uuid,
    pub transaction_id: Uuid,
    pub error_type: ErrorKind,
    pub error_message: String,
    pub error_stack: Option<String>,
    pub error_code: Option<String>,
    pub retryable: bool,
    pub provider_response: Option<serde_json::Value>,
    pub created_at: DateTime<Utc>,
}

/// Per-user delivery preferences: which channels are enabled and each
/// channel's default priority. Created lazily with column defaults on first
/// read.
#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
#[serde(rename_all = "camelCase")]
pub struct Preferences {
    pub user_id: String,
    pub email_enabled: bool,
    pub sms_enabled: bool,
    pub whatsapp_enabled: bool,
    pub push_enabled: bool,
    pub email_priority: Priority,
    pub sms_priority: Priority,
    pub whatsapp_priority: Priority,
    pub push_priority: Priority,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Preferences {
    /// Enabled channels in the stable order EMAIL, SMS, WHATSAPP, PUSH.
    pub fn preferred_channels(&self) -> Vec<Channel> {
        Channel::ALL
            .into_iter()
            .filter(|channel| self.channel_enabled(*channel))
            .collect()
    }

    pub fn channel_enabled(&self, channel: Channel) -> bool {
        match channel {
            Channel::Email => self.email_enabled,
            Channel::Sms => self.sms_enabled,
            Channel::Whatsapp => self.whatsapp_enabled,
            Channel::Push => self.push_enabled,
        }
    }

    /// The stored default priority for a channel.
    pub fn channel_priority(&self, channel: Channel) -> Priority {
        match channel {
            Channel::Email => self.email_priority,
            Channel::Sms => self.sms_priority,
            Channel::Whatsapp => self.whatsapp_priority,
            Channel::Push => self.push_priority,
        }
    }
}

/// Queue payload: the snapshot of a transaction the worker needs to perform
/// one delivery attempt. Not persisted beyond the broker.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Job {
    pub transaction_id: Uuid,
    pub user_id: String,
    pub channel: Channel,
    pub recipient: String,
    pub subject: Option<String>,
    pub content: String,
    pub priority: Priority,
    pub metadata: serde_json::Value,
}

impl Job {
    pub fn from_transaction(tx: &Transaction) -> Self {
        Self {
            transaction_id: tx.transaction_id,
            user_id: tx.user_id.clone(),
            channel: tx.channel,
            recipient: tx.recipient.clone(),
            subject: tx.subject.clone(),
            content: tx.content.clone(),
            priority: tx.priority,
            metadata: tx.metadata.clone(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn prefs() -> Preferences {
        Preferences {
            user_id: "u1".to_string(),
            email_enabled: true,
            sms_enabled: false,
            whatsapp_enabled: false,
            push_enabled: false,
            email_priority: Priority::Low,
            sms_priority: Priority::Medium,
            whatsapp_priority: Priority::High,
            push_priority: Priority::Urgent,
            created_at: Utc::now(),
            updated_at: Utc::now(),
        }
    }

    #[test]
    fn test_preferred_channels_default_email_only() {
        assert_eq!(prefs().preferred_channels(), vec![Channel::Email]);
    }

    #[test]
    fn test_preferred_channels_stable_order() {
        let mut p = prefs();
        p.push_enabled = true;
        p.sms_enabled = true;
        p.email_enabled = false;
        // Order follows Channel::ALL, not the order flags were flipped
        assert_eq!(p.preferred_channels(), vec![Channel::Sms, Channel::Push]);
        assert_eq!(p.preferred_channels(), p.preferred_channels());
    }

    #[test]
    fn test_channel_priority_lookup() {
        let p = prefs();
        assert_eq!(p.channel_priority(Channel::Email), Priority::Low);
        assert_eq!(p.channel_priority(Channel::Whatsapp), Priority::High);
    }

    #[test]
    fn test_priority_serializes_as_integer() {
        assert_eq!(serde_json::to_string(&Priority::High).unwrap(), "3");
        let parsed: Priority = serde_json::from_str("4").unwrap();
        assert_eq!(parsed, Priority::Urgent);
    }

    #[test]
    fn test_priority_rejects_out_of_range() {
        assert!(serde_json::from_str::<Priority>("0").is_err());
        assert!(serde_json::from_str::<Priority>("5").is_err());
    }

    #[test]
    fn test_terminal_statuses() {
        assert!(TransactionStatus::Sent.is_terminal());
        assert!(TransactionStatus::DeadLetter.is_terminal());
        assert!(!TransactionStatus::Retry.is_terminal());
        assert!(!TransactionStatus::Processing.is_terminal());
    }

    #[test]
    fn test_channel_json_representation() {
        assert_eq!(serde_json::to_string(&Channel::Whatsapp).unwrap(), "\"WHATSAPP\"");
        let parsed: Channel = serde_json::from_str("\"SMS\"").unwrap();
        assert_eq!(parsed, Channel::Sms);
    }

    #[test]
    fn test_status_display_matches_wire_format() {
        assert_eq!(TransactionStatus::DeadLetter.to_string(), "DEAD_LETTER");
        assert_eq!(ErrorKind::NetworkError.to_string(), "NETWORK_ERROR");
    }
}
