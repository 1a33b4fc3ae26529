use chrono::{DateTime, Utc};
use herald_common::{
    address, audit,
    event::{EngagementEvent, EventType},
    ids::{BatchCorrelator, ProviderMessageId},
    internal,
    workflow::{WorkflowKind, WorkflowRecord, WorkflowState},
};
use herald_store::{Append, Transition};

use crate::{ActivityError, activities::Activities};

/// Provider name on events herald records about its own sends.
pub const HERALD_PROVIDER: &str = "herald";

/// How a workflow's send step ended.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Completion {
    Sent {
        provider_message_id: ProviderMessageId,
    },
    Suppressed,
    Failed {
        error: String,
    },
}

impl Activities {
    /// Write the workflow's terminal state and result.
    ///
    /// Only a workflow in `Sending` is moved; a second invocation finds the
    /// terminal state already written and returns the stored record. Campaign
    /// outcomes are recorded either way, which is safe because the event id
    /// and the counters are both keyed by the send.
    ///
    /// # Errors
    ///
    /// [`ActivityError::System`] if the workflow is missing or a store fails.
    pub async fn persist(
        &self,
        workflow: &WorkflowRecord,
        completion: &Completion,
        now: DateTime<Utc>,
    ) -> Result<WorkflowRecord, ActivityError> {
        let state = match completion {
            // Webhooks may have overtaken the send step
            Completion::Sent { .. } => self
                .deliveries
                .get(&workflow.id)
                .await?
                .and_then(|record| WorkflowState::from_delivery_status(record.status))
                .unwrap_or(WorkflowState::Sent),
            Completion::Suppressed => WorkflowState::Suppressed,
            Completion::Failed { error } => WorkflowState::Failed {
                error: error.clone(),
            },
        };

        let guard = |current: &WorkflowState| matches!(current, WorkflowState::Sending { .. });
        let update = |record: &mut WorkflowRecord| {
            record.state = state.clone();
            record.updated_at = now;
            match completion {
                Completion::Sent {
                    provider_message_id,
                } => record.provider_message_id = Some(provider_message_id.clone()),
                Completion::Failed { error } => record.last_error = Some(error.clone()),
                Completion::Suppressed => {}
            }
            record.result = Some(record.to_result(now));
        };

        let record = match self.workflows.transition(&workflow.id, &guard, &update).await? {
            Transition::Applied(record) => {
                internal!(
                    level = INFO,
                    send_id = %record.id,
                    state = %record.state,
                    attempts = record.attempts,
                    "Workflow finished"
                );
                if !record.state.is_success() {
                    audit::log_delivery_failure(
                        record.id.as_str(),
                        record.last_error.as_deref().unwrap_or("Recipient is suppressed"),
                        record.attempts,
                        record.state.name(),
                    );
                }
                record
            }
            Transition::Rejected(current) => {
                internal!(
                    level = DEBUG,
                    send_id = %workflow.id,
                    state = %current,
                    "Workflow outcome already recorded"
                );
                self.workflows.get(&workflow.id).await?.ok_or_else(|| {
                    ActivityError::System(format!("Workflow {} disappeared", workflow.id))
                })?
            }
            Transition::NotFound => {
                return Err(ActivityError::System(format!(
                    "Workflow {} not found",
                    workflow.id
                )));
            }
        };

        if let WorkflowKind::CampaignMember { correlator } = &record.kind {
            self.count_campaign_member(&record, *correlator, completion, now)
                .await?;
        }

        Ok(record)
    }

    async fn count_campaign_member(
        &self,
        record: &WorkflowRecord,
        correlator: BatchCorrelator,
        completion: &Completion,
        now: DateTime<Utc>,
    ) -> Result<(), ActivityError> {
        // Stored so the counts survive a restart; stats are rebuilt from the
        // event log.
        let (event_type, suffix, provider_message_id, reason) = match completion {
            Completion::Sent {
                provider_message_id,
            } => (
                EventType::Sent,
                "accepted",
                Some(provider_message_id.clone()),
                None,
            ),
            Completion::Failed { error } => {
                (EventType::Failed, "failed", None, Some(error.clone()))
            }
            Completion::Suppressed => return Ok(()),
        };

        let event = EngagementEvent {
            provider: HERALD_PROVIDER.to_string(),
            event_id: format!("{}:{suffix}", record.id),
            event_type,
            recipient: address::normalize(&record.request.to),
            occurred_at: now,
            provider_message_id,
            correlator: Some(correlator),
            send_id: Some(record.id.clone()),
            bounce_hint: None,
            reason,
        };

        // Buckets are sets, so a repeat after a crash counts once
        self.stats.apply(&event);
        if self.events.append(&event).await? == Append::New {
            self.events
                .mark_effects_applied(&event.provider, &event.event_id)
                .await?;
            self.events
                .mark_record_applied(&event.provider, &event.event_id)
                .await?;
        }

        Ok(())
    }
}
