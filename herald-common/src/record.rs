//! Durable delivery records

use std::fmt::{self, Display};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::{
    address,
    event::{EngagementEvent, EventType},
    ids::{BatchCorrelator, ProviderMessageId, SendId, TenantId},
    send::SendRequest,
};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DeliveryStatus {
    Sent,
    Delivered,
    Bounced,
    Complained,
    Suppressed,
    Failed,
}

impl DeliveryStatus {
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Sent => "sent",
            Self::Delivered => "delivered",
            Self::Bounced => "bounced",
            Self::Complained => "complained",
            Self::Suppressed => "suppressed",
            Self::Failed => "failed",
        }
    }

    /// Position in the forward-only status order.
    pub const fn rank(self) -> u8 {
        match self {
            Self::Sent => 0,
            Self::Delivered => 1,
            Self::Bounced | Self::Suppressed | Self::Failed => 2,
            Self::Complained => 3,
        }
    }

    /// The status after observing `next`. Never moves backwards, so events
    /// arriving out of order converge on the same status.
    #[must_use]
    pub const fn advance(self, next: Self) -> Self {
        if next.rank() > self.rank() { next } else { self }
    }

    /// Status implied by a provider event, for event types that carry one.
    pub const fn from_event(event_type: EventType) -> Option<Self> {
        match event_type {
            EventType::Sent => Some(Self::Sent),
            EventType::Delivered => Some(Self::Delivered),
            EventType::Bounced => Some(Self::Bounced),
            EventType::Complained => Some(Self::Complained),
            EventType::Suppressed => Some(Self::Suppressed),
            EventType::Failed => Some(Self::Failed),
            EventType::Opened | EventType::Clicked | EventType::Unsubscribed => None,
        }
    }
}

impl Display for DeliveryStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// State of one send after the provider accepted it.
///
/// Created once by the send activity; afterwards only webhook ingestion
/// touches it, one field at a time.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeliveryRecord {
    pub send_id: SendId,
    pub tenant: TenantId,
    pub recipient: String,
    pub provider: String,
    pub provider_message_id: ProviderMessageId,
    pub correlator: Option<BatchCorrelator>,
    pub status: DeliveryStatus,
    pub created_at: DateTime<Utc>,
    pub first_opened_at: Option<DateTime<Utc>>,
    pub first_clicked_at: Option<DateTime<Utc>>,
    pub open_count: u32,
    pub click_count: u32,
    pub last_event_at: Option<DateTime<Utc>>,
    pub error: Option<String>,
}

impl DeliveryRecord {
    /// The record for a request the provider has just accepted.
    #[must_use]
    pub fn accepted(
        request: &SendRequest,
        provider: impl Into<String>,
        provider_message_id: ProviderMessageId,
        now: DateTime<Utc>,
    ) -> Self {
        Self {
            send_id: request.id.clone(),
            tenant: request.tenant.clone(),
            recipient: address::normalize(&request.to),
            provider: provider.into(),
            provider_message_id,
            correlator: request.correlator(),
            status: DeliveryStatus::Sent,
            created_at: now,
            first_opened_at: None,
            first_clicked_at: None,
            open_count: 0,
            click_count: 0,
            last_event_at: None,
            error: None,
        }
    }

    /// Apply one engagement event to this record.
    pub fn apply(&mut self, event: &EngagementEvent) {
        let at = event.occurred_at;

        match event.event_type {
            EventType::Opened => {
                self.open_count = self.open_count.saturating_add(1);
                self.first_opened_at = Some(earliest(self.first_opened_at, at));
            }
            EventType::Clicked => {
                self.click_count = self.click_count.saturating_add(1);
                self.first_clicked_at = Some(earliest(self.first_clicked_at, at));
                // A click without a tracked open still means the mail was opened
                self.first_opened_at = Some(earliest(self.first_opened_at, at));
            }
            EventType::Bounced | EventType::Complained | EventType::Suppressed => {
                if let Some(reason) = &event.reason {
                    self.error = Some(reason.clone());
                }
            }
            EventType::Sent | EventType::Delivered | EventType::Unsubscribed | EventType::Failed => {}
        }

        if let Some(status) = DeliveryStatus::from_event(event.event_type) {
            self.status = self.status.advance(status);
        }

        self.last_event_at = Some(self.last_event_at.map_or(at, |last| last.max(at)));
    }
}

fn earliest(current: Option<DateTime<Utc>>, at: DateTime<Utc>) -> DateTime<Utc> {
    current.map_or(at, |current| current.min(at))
}

#[cfg(test)]
mod tests {
    use chrono::Duration;

    use super::*;

    fn record() -> DeliveryRecord {
        DeliveryRecord {
            send_id: SendId::new("s1"),
            tenant: TenantId::new("t1"),
            recipient: "user@example.com".to_string(),
            provider: "mock".to_string(),
            provider_message_id: ProviderMessageId::new("pm-1"),
            correlator: None,
            status: DeliveryStatus::Sent,
            created_at: Utc::now(),
            first_opened_at: None,
            first_clicked_at: None,
            open_count: 0,
            click_count: 0,
            last_event_at: None,
            error: None,
        }
    }

    fn event(event_type: EventType, at: DateTime<Utc>) -> EngagementEvent {
        EngagementEvent {
            provider: "mock".to_string(),
            event_id: format!("{event_type}-{at}"),
            event_type,
            recipient: "user@example.com".to_string(),
            occurred_at: at,
            provider_message_id: Some(ProviderMessageId::new("pm-1")),
            correlator: None,
            send_id: None,
            bounce_hint: None,
            reason: Some("reason".to_string()),
        }
    }

    #[test]
    fn test_status_never_regresses() {
        let now = Utc::now();
        let mut record = record();
        record.apply(&event(EventType::Complained, now));
        record.apply(&event(EventType::Delivered, now - Duration::seconds(10)));
        assert_eq!(record.status, DeliveryStatus::Complained);
        assert_eq!(record.error.as_deref(), Some("reason"));
    }

    #[test]
    fn test_opens_keep_earliest_timestamp() {
        let now = Utc::now();
        let mut record = record();
        record.apply(&event(EventType::Opened, now));
        record.apply(&event(EventType::Opened, now - Duration::minutes(1)));

        assert_eq!(record.open_count, 2);
        assert_eq!(record.first_opened_at, Some(now - Duration::minutes(1)));
        assert_eq!(record.last_event_at, Some(now));
    }

    #[test]
    fn test_click_implies_open() {
        let now = Utc::now();
        let mut record = record();
        record.apply(&event(EventType::Clicked, now));

        assert_eq!(record.click_count, 1);
        assert_eq!(record.open_count, 0);
        assert_eq!(record.first_opened_at, Some(now));
        assert_eq!(record.status, DeliveryStatus::Sent);
    }

    #[test]
    fn test_accepted_record_carries_request_correlation() {
        use crate::send::{MessageContent, Priority, Tag};

        let correlator = BatchCorrelator::generate();
        let request = SendRequest {
            id: SendId::new("s9"),
            tenant: TenantId::new("t1"),
            to: " User@Example.com ".to_string(),
            from: None,
            subject: "Hi".to_string(),
            content: MessageContent::rendered("<p>Hi</p>"),
            scheduled_for: None,
            priority: Priority::Normal,
            tags: vec![Tag::new(BatchCorrelator::TAG, correlator.to_string())],
        };

        let record =
            DeliveryRecord::accepted(&request, "mock", ProviderMessageId::new("pm-9"), Utc::now());
        assert_eq!(record.recipient, "user@example.com");
        assert_eq!(record.correlator, Some(correlator));
        assert_eq!(record.status, DeliveryStatus::Sent);
    }
}
