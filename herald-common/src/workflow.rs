//! Persisted workflow state
//!
//! Every send is driven by one workflow. Its state lives in a
//! [`WorkflowRecord`] so a restarted process can pick up where it left off,
//! and transitions are applied with compare-and-set against the stored state.

use std::fmt::{self, Display};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::{
    ids::{BatchCorrelator, ProviderMessageId, RunId, WorkflowId},
    record::DeliveryStatus,
    send::SendRequest,
};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum WorkflowState {
    Created,
    ScheduledWait { until: DateTime<Utc> },
    Sending { attempt: u32 },
    Sent,
    Delivered,
    Bounced,
    Complained,
    Suppressed,
    Failed { error: String },
    Cancelled,
}

impl WorkflowState {
    pub const fn name(&self) -> &'static str {
        match self {
            Self::Created => "created",
            Self::ScheduledWait { .. } => "scheduled_wait",
            Self::Sending { .. } => "sending",
            Self::Sent => "sent",
            Self::Delivered => "delivered",
            Self::Bounced => "bounced",
            Self::Complained => "complained",
            Self::Suppressed => "suppressed",
            Self::Failed { .. } => "failed",
            Self::Cancelled => "cancelled",
        }
    }

    /// Whether the workflow run has finished. Provider outcomes may still be
    /// mirrored onto a finished `Sent` workflow.
    pub const fn is_finished(&self) -> bool {
        !matches!(
            self,
            Self::Created | Self::ScheduledWait { .. } | Self::Sending { .. }
        )
    }

    /// Only requests that have not started sending can be cancelled.
    pub const fn is_cancellable(&self) -> bool {
        matches!(self, Self::Created | Self::ScheduledWait { .. })
    }

    /// Whether the run ended with the provider accepting the message.
    pub const fn is_success(&self) -> bool {
        matches!(
            self,
            Self::Sent | Self::Delivered | Self::Bounced | Self::Complained
        )
    }

    /// Workflow state mirroring a provider outcome reported by webhook.
    pub const fn from_delivery_status(status: DeliveryStatus) -> Option<Self> {
        match status {
            DeliveryStatus::Delivered => Some(Self::Delivered),
            DeliveryStatus::Bounced => Some(Self::Bounced),
            DeliveryStatus::Complained => Some(Self::Complained),
            DeliveryStatus::Suppressed => Some(Self::Suppressed),
            DeliveryStatus::Sent | DeliveryStatus::Failed => None,
        }
    }
}

impl Display for WorkflowState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::ScheduledWait { until } => write!(f, "scheduled_wait(until {until})"),
            Self::Sending { attempt } => write!(f, "sending(attempt {attempt})"),
            Self::Failed { error } => write!(f, "failed({error})"),
            other => f.write_str(other.name()),
        }
    }
}

/// What composition of activities a workflow runs.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum WorkflowKind {
    Single,
    CampaignMember {
        correlator: BatchCorrelator,
    },
    Invitation {
        subject: String,
        action: String,
        ttl_secs: u64,
    },
}

/// Outcome reported for every workflow, whatever state it finished in.
///
/// `attempts == 0` means the provider was never called.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WorkflowResult {
    pub id: WorkflowId,
    pub success: bool,
    pub provider_message_id: Option<ProviderMessageId>,
    pub error: Option<String>,
    pub sent_at: Option<DateTime<Utc>>,
    pub finished_at: DateTime<Utc>,
    pub state: WorkflowState,
    pub attempts: u32,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WorkflowRecord {
    pub id: WorkflowId,
    pub run_id: RunId,
    pub kind: WorkflowKind,
    pub request: SendRequest,
    pub state: WorkflowState,
    pub attempts: u32,
    pub last_error: Option<String>,
    pub provider_message_id: Option<ProviderMessageId>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub result: Option<WorkflowResult>,
}

impl WorkflowRecord {
    #[must_use]
    pub fn new(kind: WorkflowKind, request: SendRequest, now: DateTime<Utc>) -> Self {
        Self {
            id: request.id.clone(),
            run_id: RunId::generate(),
            kind,
            request,
            state: WorkflowState::Created,
            attempts: 0,
            last_error: None,
            provider_message_id: None,
            created_at: now,
            updated_at: now,
            result: None,
        }
    }

    /// Build the result record for the current state.
    #[must_use]
    pub fn to_result(&self, now: DateTime<Utc>) -> WorkflowResult {
        let error = match &self.state {
            WorkflowState::Failed { error } => Some(error.clone()),
            WorkflowState::Suppressed if self.provider_message_id.is_none() => {
                Some("Recipient is suppressed".to_string())
            }
            WorkflowState::Cancelled => Some("Cancelled".to_string()),
            _ => None,
        };

        WorkflowResult {
            id: self.id.clone(),
            success: self.state.is_success(),
            provider_message_id: self.provider_message_id.clone(),
            error,
            sent_at: self.provider_message_id.as_ref().map(|_| self.updated_at),
            finished_at: now,
            state: self.state.clone(),
            attempts: self.attempts,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        ids::{SendId, TenantId},
        send::{MessageContent, Priority},
    };

    fn request() -> SendRequest {
        SendRequest {
            id: SendId::new("w1"),
            tenant: TenantId::new("t1"),
            to: "user@example.com".to_string(),
            from: None,
            subject: "Hello".to_string(),
            content: MessageContent::rendered("<p>Hi</p>"),
            scheduled_for: None,
            priority: Priority::High,
            tags: Vec::new(),
        }
    }

    #[test]
    fn test_state_predicates() {
        assert!(WorkflowState::Created.is_cancellable());
        assert!(
            WorkflowState::ScheduledWait {
                until: Utc::now()
            }
            .is_cancellable()
        );
        assert!(!WorkflowState::Sending { attempt: 1 }.is_cancellable());
        assert!(!WorkflowState::Sending { attempt: 1 }.is_finished());
        assert!(WorkflowState::Cancelled.is_finished());
        assert!(!WorkflowState::Cancelled.is_success());
        assert!(WorkflowState::Delivered.is_success());
    }

    #[test]
    fn test_result_for_cancelled_workflow() {
        let mut record = WorkflowRecord::new(WorkflowKind::Single, request(), Utc::now());
        record.state = WorkflowState::Cancelled;

        let result = record.to_result(Utc::now());
        assert!(!result.success);
        assert_eq!(result.attempts, 0);
        assert_eq!(result.sent_at, None);
        assert_eq!(result.id, SendId::new("w1"));
    }

    #[test]
    fn test_result_for_sent_workflow() {
        let mut record = WorkflowRecord::new(WorkflowKind::Single, request(), Utc::now());
        record.state = WorkflowState::Sent;
        record.attempts = 2;
        record.provider_message_id = Some(ProviderMessageId::new("pm"));

        let result = record.to_result(Utc::now());
        assert!(result.success);
        assert_eq!(result.error, None);
        assert_eq!(result.sent_at, Some(record.updated_at));
    }
}
