//! Suppression list entries and contact status

use std::fmt::{self, Display};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::ids::TenantId;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Classification {
    Hard,
    Soft,
    Complaint,
    Suppressed,
}

impl Classification {
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Hard => "hard",
            Self::Soft => "soft",
            Self::Complaint => "complaint",
            Self::Suppressed => "suppressed",
        }
    }

    /// Contact status a suppression of this kind moves an active contact to.
    pub const fn contact_status(self) -> ContactStatus {
        match self {
            Self::Complaint => ContactStatus::Unsubscribed,
            Self::Suppressed => ContactStatus::Suppressed,
            Self::Hard | Self::Soft => ContactStatus::Bounced,
        }
    }
}

impl Display for Classification {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Status of a contact in the external contact directory.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ContactStatus {
    #[default]
    Active,
    Unsubscribed,
    Bounced,
    Suppressed,
}

/// One address on the global suppression list.
///
/// Keyed by lower-cased address. Re-occurrence bumps `count` and `last_seen`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SuppressionEntry {
    pub email: String,
    pub classification: Classification,
    pub reason: String,
    pub count: u64,
    pub first_seen: DateTime<Utc>,
    pub last_seen: DateTime<Utc>,
    pub tenant_id: Option<TenantId>,
    pub active: bool,
}

impl SuppressionEntry {
    #[must_use]
    pub fn new(
        email: String,
        classification: Classification,
        reason: String,
        tenant_id: Option<TenantId>,
        now: DateTime<Utc>,
    ) -> Self {
        Self {
            email,
            classification,
            reason,
            count: 1,
            first_seen: now,
            last_seen: now,
            tenant_id,
            active: true,
        }
    }

    /// Fold a re-occurrence into this entry.
    pub fn record_occurrence(
        &mut self,
        classification: Classification,
        reason: String,
        now: DateTime<Utc>,
    ) {
        self.count = self.count.saturating_add(1);
        self.last_seen = now;
        self.classification = classification;
        self.reason = reason;
        self.active = true;
    }
}
