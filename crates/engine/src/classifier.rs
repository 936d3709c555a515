//! Provider failure classification.
//!
//! A pure, priority-ordered rule table mapping a [`ProviderFailure`] to an
//! [`ErrorKind`] and a retryability bit. The worker treats `retryable` as
//! the sole gate for scheduling another attempt; the kind feeds analytics.
//! Rules are evaluated top to bottom, first match wins, and the fallback is
//! deliberately retryable.

use courier_common::types::ErrorKind;
use courier_providers::{NOT_CONFIGURED_CODE, ProviderFailure};

/// Outcome of classifying one failure.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Classification {
    pub kind: ErrorKind,
    pub retryable: bool,
}

const NETWORK_CODES: &[&str] = &["ETIMEDOUT", "ECONNREFUSED", "ENOTFOUND", "ECONNRESET"];

/// Classify with the standard default: provider-tagged failures that match
/// no specific rule are treated as retryable.
pub fn classify(failure: &ProviderFailure) -> Classification {
    classify_with_default(failure, true)
}

pub fn classify_with_default(failure: &ProviderFailure, provider_default_retryable: bool) -> Classification {
    let message = failure.message.to_lowercase();
    let code = failure.error_code.as_deref().unwrap_or("");
    let status = failure.status_code;

    // Misconfiguration is definitive: retrying cannot help
    if code == NOT_CONFIGURED_CODE {
        return Classification { kind: ErrorKind::InvalidData, retryable: false };
    }

    if NETWORK_CODES.contains(&code) || message.contains("timeout") || message.contains("network") {
        return Classification { kind: ErrorKind::NetworkError, retryable: true };
    }

    if status == Some(429) || message.contains("rate limit") {
        return Classification { kind: ErrorKind::RateLimit, retryable: true };
    }

    if matches!(status, Some(502 | 503)) || message.contains("service unavailable") {
        return Classification { kind: ErrorKind::NetworkError, retryable: true };
    }

    if matches!(status, Some(401 | 403))
        || message.contains("unauthorized")
        || message.contains("forbidden")
    {
        return Classification { kind: ErrorKind::AuthenticationError, retryable: false };
    }

    if status == Some(400)
        || message.contains("invalid")
        || message.contains("not found")
        || message.contains("bad request")
    {
        return Classification { kind: ErrorKind::InvalidData, retryable: false };
    }

    if !failure.provider.is_empty() {
        return Classification {
            kind: ErrorKind::ProviderError,
            retryable: provider_default_retryable,
        };
    }

    Classification { kind: ErrorKind::Retryable, retryable: true }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn failure(
        code: Option<&str>,
        status: Option<u16>,
        message: &str,
        provider: &str,
    ) -> ProviderFailure {
        ProviderFailure {
            provider: provider.to_string(),
            recipient: "a@b.c".to_string(),
            error_code: code.map(String::from),
            status_code: status,
            message: message.to_string(),
            source: None,
        }
    }

    #[test]
    fn test_network_codes_are_retryable() {
        for code in ["ETIMEDOUT", "ECONNREFUSED", "ENOTFOUND", "ECONNRESET"] {
            let c = classify(&failure(Some(code), None, "socket error", "sendgrid"));
            assert_eq!(c.kind, ErrorKind::NetworkError, "code {code}");
            assert!(c.retryable);
        }
    }

    #[test]
    fn test_timeout_message_is_network() {
        let c = classify(&failure(None, None, "request timeout exceeded", "fcm"));
        assert_eq!(c.kind, ErrorKind::NetworkError);
        assert!(c.retryable);
    }

    #[test]
    fn test_rate_limit_status_and_message() {
        let c = classify(&failure(None, Some(429), "too many requests", "twilio-sms"));
        assert_eq!(c.kind, ErrorKind::RateLimit);
        assert!(c.retryable);

        let c = classify(&failure(None, None, "rate limit exceeded", "twilio-sms"));
        assert_eq!(c.kind, ErrorKind::RateLimit);
        assert!(c.retryable);
    }

    #[test]
    fn test_availability_statuses_are_network() {
        for status in [502u16, 503] {
            let c = classify(&failure(None, Some(status), "upstream sad", "sendgrid"));
            assert_eq!(c.kind, ErrorKind::NetworkError, "status {status}");
            assert!(c.retryable);
        }
    }

    #[test]
    fn test_auth_failures_not_retryable() {
        for status in [401u16, 403] {
            let c = classify(&failure(None, Some(status), "denied", "sendgrid"));
            assert_eq!(c.kind, ErrorKind::AuthenticationError, "status {status}");
            assert!(!c.retryable);
        }

        let c = classify(&failure(None, None, "unauthorized key", "fcm"));
        assert_eq!(c.kind, ErrorKind::AuthenticationError);
        assert!(!c.retryable);
    }

    #[test]
    fn test_bad_request_not_retryable() {
        let c = classify(&failure(None, Some(400), "boom", "twilio-sms"));
        assert_eq!(c.kind, ErrorKind::InvalidData);
        assert!(!c.retryable);

        let c = classify(&failure(None, None, "invalid phone number", "twilio-sms"));
        assert_eq!(c.kind, ErrorKind::InvalidData);
        assert!(!c.retryable);
    }

    #[test]
    fn test_not_configured_is_invalid_data() {
        let c = classify(&ProviderFailure::not_configured("fcm", "token"));
        assert_eq!(c.kind, ErrorKind::InvalidData);
        assert!(!c.retryable);
    }

    #[test]
    fn test_first_match_wins() {
        // 429 plus a timeout-flavored message: the network rule is evaluated
        // first and takes it
        let c = classify(&failure(None, Some(429), "connect timeout", "sendgrid"));
        assert_eq!(c.kind, ErrorKind::NetworkError);
    }

    #[test]
    fn test_provider_tag_default() {
        let c = classify(&failure(None, Some(500), "unexpected response shape", "sendgrid"));
        assert_eq!(c.kind, ErrorKind::ProviderError);
        assert!(c.retryable);

        let c = classify_with_default(&failure(None, Some(500), "unexpected", "sendgrid"), false);
        assert!(!c.retryable);
    }

    #[test]
    fn test_untagged_fallback_is_retryable() {
        let c = classify(&failure(None, None, "mystery", ""));
        assert_eq!(c.kind, ErrorKind::Retryable);
        assert!(c.retryable);
    }
}
