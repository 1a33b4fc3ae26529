use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use herald_common::{
    ids::{BatchCorrelator, RunId, SendId, TenantId, WorkflowId},
    send::{Priority, Tag},
    workflow::WorkflowState,
};
use serde::{Deserialize, Serialize};

mod defaults {
    pub const fn invitation_ttl_secs() -> u64 {
        7 * 24 * 60 * 60
    }
}

/// Returned by every start operation. Starting a workflow id that already
/// exists returns the existing handle.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct WorkflowHandle {
    pub workflow_id: WorkflowId,
    pub run_id: RunId,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case", tag = "outcome")]
pub enum CancelOutcome {
    Cancelled,
    AlreadyCancelled,
    NotCancellable { state: WorkflowState },
    NotFound,
}

/// One member of a campaign.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct CampaignRecipient {
    /// Defaults to `{correlator}-{index}`.
    #[serde(default)]
    pub id: Option<SendId>,
    pub to: String,
    /// Merged over the campaign's template variables.
    #[serde(default)]
    pub variables: BTreeMap<String, String>,
}

/// One template sent to many recipients under a fresh correlator.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct CampaignRequest {
    pub tenant: TenantId,
    #[serde(default)]
    pub from: Option<String>,
    pub subject: String,
    pub html: String,
    #[serde(default)]
    pub text: Option<String>,
    #[serde(default)]
    pub variables: BTreeMap<String, String>,
    pub recipients: Vec<CampaignRecipient>,
    #[serde(default)]
    pub scheduled_for: Option<DateTime<Utc>>,
    #[serde(default)]
    pub priority: Priority,
    #[serde(default)]
    pub tags: Vec<Tag>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CampaignDispatch {
    pub correlator: BatchCorrelator,
    pub handles: Vec<WorkflowHandle>,
}

/// What cancelling a campaign did to its unfinished members. Members already
/// sending or finished are left alone.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CampaignCancellation {
    pub cancelled: usize,
    pub not_cancellable: usize,
}

/// A message carrying a signed token for `action` on `subject_id`. The
/// template receives the token as `{{token}}`.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct InvitationRequest {
    pub id: SendId,
    pub tenant: TenantId,
    pub to: String,
    #[serde(default)]
    pub from: Option<String>,
    pub subject: String,
    pub html: String,
    #[serde(default)]
    pub text: Option<String>,
    #[serde(default)]
    pub variables: BTreeMap<String, String>,
    pub subject_id: String,
    pub action: String,
    #[serde(default = "defaults::invitation_ttl_secs")]
    pub ttl_secs: u64,
    #[serde(default)]
    pub scheduled_for: Option<DateTime<Utc>>,
    #[serde(default)]
    pub tags: Vec<Tag>,
}

/// Template variable the invitation token is rendered into.
pub const TOKEN_VARIABLE: &str = "token";
