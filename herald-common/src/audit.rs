//! Audit logging for send lifecycle events
//!
//! Structured events for compliance and abuse monitoring, emitted through
//! `tracing` with an `event` field naming the lifecycle step.
//!
//! ## Audit Events
//!
//! - `SendAccepted`: A send request was accepted and its workflow started
//! - `DeliveryAttempt`: A provider call is about to be made
//! - `DeliverySuccess`: The provider accepted the message
//! - `DeliveryFailure`: The send finished without the provider accepting it
//! - `AddressSuppressed`: An address was added to or refreshed on the suppression list
//!
//! Recipient addresses can be redacted through [`AuditConfig`].

use std::sync::{Arc, OnceLock};

use serde::{Deserialize, Serialize};

/// Audit logging configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AuditConfig {
    #[serde(default = "default_true")]
    pub enabled: bool,

    /// Redact the local part of recipient addresses
    #[serde(default)]
    pub redact_recipients: bool,
}

impl Default for AuditConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            redact_recipients: false,
        }
    }
}

const fn default_true() -> bool {
    true
}

static AUDIT_CONFIG: OnceLock<Arc<AuditConfig>> = OnceLock::new();

/// Initialize audit logging with configuration
pub fn init(config: AuditConfig) {
    AUDIT_CONFIG.get_or_init(|| Arc::new(config));
}

#[must_use]
pub fn config() -> Arc<AuditConfig> {
    AUDIT_CONFIG
        .get()
        .cloned()
        .unwrap_or_else(|| Arc::new(AuditConfig::default()))
}

/// Redact email address if redaction is enabled
#[must_use]
pub fn redact_email(email: &str, redact: bool) -> String {
    if redact {
        if let Some((_, domain)) = email.split_once('@') {
            format!("[REDACTED]@{domain}")
        } else {
            "[REDACTED]".to_string()
        }
    } else {
        email.to_string()
    }
}

pub fn log_send_accepted(send_id: &str, tenant: &str, recipient: &str, kind: &str) {
    let config = config();
    if !config.enabled {
        return;
    }

    let recipient = redact_email(recipient, config.redact_recipients);

    tracing::event!(
        tracing::Level::INFO,
        event = "SendAccepted",
        send_id = %send_id,
        tenant = %tenant,
        recipient = %recipient,
        kind = %kind,
        "Audit: Send accepted"
    );
}

pub fn log_delivery_attempt(send_id: &str, provider: &str, attempt: u32) {
    let config = config();
    if !config.enabled {
        return;
    }

    tracing::event!(
        tracing::Level::INFO,
        event = "DeliveryAttempt",
        send_id = %send_id,
        provider = %provider,
        delivery_attempt = attempt,
        "Audit: Delivery attempt"
    );
}

/// Logged when the provider accepts a message.
///
/// # Fields
/// - `send_id`: Caller supplied send identifier
/// - `provider_message_id`: Identifier assigned by the provider
/// - `delivery_attempt`: Attempt that succeeded
/// - `duration_ms`: Time spent in the provider call
pub fn log_delivery_success(
    send_id: &str,
    provider_message_id: &str,
    attempt: u32,
    duration_ms: u128,
) {
    let config = config();
    if !config.enabled {
        return;
    }

    tracing::event!(
        tracing::Level::INFO,
        event = "DeliverySuccess",
        send_id = %send_id,
        provider_message_id = %provider_message_id,
        delivery_attempt = attempt,
        duration_ms = duration_ms,
        "Audit: Delivery successful"
    );
}

/// Logged when a workflow finishes without the provider accepting the message.
pub fn log_delivery_failure(send_id: &str, error: &str, attempt: u32, state: &str) {
    let config = config();
    if !config.enabled {
        return;
    }

    tracing::event!(
        tracing::Level::WARN,
        event = "DeliveryFailure",
        send_id = %send_id,
        error = %error,
        delivery_attempt = attempt,
        state = %state,
        "Audit: Delivery failed"
    );
}

pub fn log_address_suppressed(email: &str, classification: &str, count: u64, reason: &str) {
    let config = config();
    if !config.enabled {
        return;
    }

    let email = redact_email(email, config.redact_recipients);

    tracing::event!(
        tracing::Level::INFO,
        event = "AddressSuppressed",
        email = %email,
        classification = %classification,
        count = count,
        reason = %reason,
        "Audit: Address suppressed"
    );
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_redact_email() {
        assert_eq!(
            redact_email("user@example.com", true),
            "[REDACTED]@example.com"
        );
        assert_eq!(redact_email("user@example.com", false), "user@example.com");
        assert_eq!(redact_email("invalid", true), "[REDACTED]");
    }

    #[test]
    fn test_default_config() {
        let config = AuditConfig::default();
        assert!(config.enabled);
        assert!(!config.redact_recipients);
    }

    #[test]
    fn test_audit_disabled() {
        init(AuditConfig {
            enabled: false,
            redact_recipients: true,
        });

        log_send_accepted("s1", "t1", "rcpt@example.com", "single");
        log_delivery_attempt("s1", "mock", 1);
        log_delivery_success("s1", "pm-1", 1, 12);
        log_delivery_failure("s1", "provider unavailable", 3, "failed");
        log_address_suppressed("rcpt@example.com", "hard", 1, "mailbox full");
    }
}
