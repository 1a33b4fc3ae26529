//! Normalised engagement events

use std::fmt::{self, Display};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::{
    ids::{BatchCorrelator, ProviderMessageId, SendId},
    suppression::Classification,
};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EventType {
    Sent,
    Delivered,
    Opened,
    Clicked,
    Bounced,
    Complained,
    Suppressed,
    Unsubscribed,
    /// Recorded by herald when a campaign member's send fails for good.
    Failed,
}

impl EventType {
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Sent => "sent",
            Self::Delivered => "delivered",
            Self::Opened => "opened",
            Self::Clicked => "clicked",
            Self::Bounced => "bounced",
            Self::Complained => "complained",
            Self::Suppressed => "suppressed",
            Self::Unsubscribed => "unsubscribed",
            Self::Failed => "failed",
        }
    }

    /// Whether ingestion applies this event type. Others are acknowledged and
    /// skipped.
    pub const fn is_handled(self) -> bool {
        !matches!(self, Self::Unsubscribed)
    }

    /// Whether this event type puts the recipient on the suppression list.
    pub const fn is_suppressing(self) -> bool {
        matches!(self, Self::Bounced | Self::Complained | Self::Suppressed)
    }
}

impl Display for EventType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A provider webhook mapped onto one shape.
///
/// Immutable once stored. `event_id` is the idempotency key.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EngagementEvent {
    pub provider: String,
    pub event_id: String,
    pub event_type: EventType,
    pub recipient: String,
    pub occurred_at: DateTime<Utc>,
    pub provider_message_id: Option<ProviderMessageId>,
    pub correlator: Option<BatchCorrelator>,
    pub send_id: Option<SendId>,
    pub bounce_hint: Option<String>,
    pub reason: Option<String>,
}

impl EngagementEvent {
    /// Suppression classification implied by this event, if it suppresses.
    ///
    /// Bounces are hard unless the provider hinted otherwise.
    #[must_use]
    pub fn classification(&self) -> Option<Classification> {
        match self.event_type {
            EventType::Bounced => Some(
                match self
                    .bounce_hint
                    .as_deref()
                    .map(str::to_ascii_lowercase)
                    .as_deref()
                {
                    Some("soft" | "transient" | "temporary" | "undetermined") => {
                        Classification::Soft
                    }
                    _ => Classification::Hard,
                },
            ),
            EventType::Complained => Some(Classification::Complaint),
            EventType::Suppressed => Some(Classification::Suppressed),
            _ => None,
        }
    }
}
