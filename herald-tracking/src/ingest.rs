//! Webhook ingestion pipeline
//!
//! 1. verify the signature
//! 2. parse and normalize the payload
//! 3. append to the event log, keyed by provider event id
//! 4. fold bounces, complaints and suppressions into the registry
//! 5. fold the event into its campaign's statistics
//! 6. apply the event to the delivery record and mirror the provider
//!    outcome onto the workflow
//!
//! Steps 4 and 5 are marked done on the stored event once both succeed, and
//! step 6 once the delivery record has taken the event. A redelivery only
//! repeats what is not marked, so a failure part way through is finished by
//! the provider's retry.

use std::{collections::HashMap, sync::Arc};

use chrono::{DateTime, Utc};
use herald_common::{
    event::EngagementEvent,
    incoming, internal,
    record::{DeliveryRecord, DeliveryStatus},
    workflow::{WorkflowRecord, WorkflowState},
};
use herald_store::{Append, DeliveryRecordStore, EventStore, Transition, WorkflowStore};
use serde::Serialize;

use crate::{
    AuthError, IngestError, SignatureVerifier, StatsAggregator, SuppressionRegistry,
    normalize::{Normalized, normalize_body},
};

/// One callback as received.
#[derive(Debug, Clone, Copy)]
pub struct WebhookRequest<'a> {
    pub provider: &'a str,
    pub timestamp: Option<&'a str>,
    pub signature: Option<&'a str>,
    pub event_id: Option<&'a str>,
    pub body: &'a [u8],
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum IngestOutcome {
    Processed,
    /// Seen before; nothing left to apply.
    Duplicate,
    /// Stored, but the delivery record is not visible yet.
    Deferred,
    /// An event type that is not tracked.
    Skipped,
}

impl IngestOutcome {
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Processed => "processed",
            Self::Duplicate => "duplicate",
            Self::Deferred => "deferred",
            Self::Skipped => "skipped",
        }
    }
}

#[derive(Debug, Clone)]
pub struct IngestionService {
    verifiers: HashMap<String, SignatureVerifier>,
    events: Arc<dyn EventStore>,
    deliveries: Arc<dyn DeliveryRecordStore>,
    workflows: Arc<dyn WorkflowStore>,
    suppressions: SuppressionRegistry,
    stats: Arc<StatsAggregator>,
}

impl IngestionService {
    pub fn new(
        events: Arc<dyn EventStore>,
        deliveries: Arc<dyn DeliveryRecordStore>,
        workflows: Arc<dyn WorkflowStore>,
        suppressions: SuppressionRegistry,
        stats: Arc<StatsAggregator>,
    ) -> Self {
        Self {
            verifiers: HashMap::new(),
            events,
            deliveries,
            workflows,
            suppressions,
            stats,
        }
    }

    #[must_use]
    pub fn with_verifiers(mut self, verifiers: HashMap<String, SignatureVerifier>) -> Self {
        self.verifiers.extend(verifiers);
        self
    }

    #[must_use]
    pub fn with_verifier(mut self, provider: impl Into<String>, verifier: SignatureVerifier) -> Self {
        self.verifiers.insert(provider.into(), verifier);
        self
    }

    pub fn accepts(&self, provider: &str) -> bool {
        self.verifiers.contains_key(provider)
    }

    /// Run one callback through the pipeline.
    ///
    /// # Errors
    ///
    /// [`IngestError::Auth`] and [`IngestError::Parse`] leave no trace in any
    /// store. After a storage error the event may be stored but only partly
    /// applied; redelivering it completes the rest.
    pub async fn ingest(
        &self,
        request: WebhookRequest<'_>,
        now: DateTime<Utc>,
    ) -> Result<IngestOutcome, IngestError> {
        let result = self.process(request, now).await;

        if let Some(metrics) = herald_metrics::metrics() {
            match &result {
                Err(IngestError::Auth(_)) => {
                    metrics.webhook.record_rejected(request.provider, "auth");
                }
                Err(IngestError::Parse(_)) => {
                    metrics.webhook.record_rejected(request.provider, "parse");
                }
                _ => {}
            }
        }

        if let Err(e) = &result {
            incoming!(
                level = WARN,
                provider = request.provider,
                error = %e,
                "Webhook rejected"
            );
        }

        result
    }

    async fn process(
        &self,
        request: WebhookRequest<'_>,
        now: DateTime<Utc>,
    ) -> Result<IngestOutcome, IngestError> {
        let verifier = self
            .verifiers
            .get(request.provider)
            .ok_or_else(|| AuthError::UnknownProvider(request.provider.to_string()))?;
        verifier.verify(request.timestamp, request.signature, request.body, now)?;

        let event = match normalize_body(request.provider, request.body, request.event_id, now)? {
            Normalized::Event(event) => event,
            Normalized::Skipped { event_type } => {
                incoming!(
                    level = DEBUG,
                    provider = request.provider,
                    event_type = %event_type,
                    "Skipping untracked webhook event"
                );
                record_event(request.provider, &event_type, IngestOutcome::Skipped);
                return Ok(IngestOutcome::Skipped);
            }
        };

        let (effects_applied, record_applied) = match self.events.append(&event).await? {
            Append::New => (false, false),
            Append::Duplicate {
                effects_applied,
                record_applied,
            } => (effects_applied, record_applied),
        };

        if !effects_applied {
            self.apply_effects(&event).await?;
            self.events
                .mark_effects_applied(&event.provider, &event.event_id)
                .await?;
        }

        let outcome = if record_applied {
            IngestOutcome::Duplicate
        } else {
            match self.apply_to_record(&event, now).await? {
                // Nothing new came of a redelivery
                IngestOutcome::Processed if effects_applied => IngestOutcome::Duplicate,
                other => other,
            }
        };

        incoming!(
            level = DEBUG,
            provider = %event.provider,
            event_id = %event.event_id,
            event_type = %event.event_type,
            outcome = outcome.as_str(),
            "Webhook event ingested"
        );
        record_event(&event.provider, event.event_type.as_str(), outcome);

        Ok(outcome)
    }

    /// Fold the event into the suppression registry and campaign statistics.
    /// Statistics are sets of recipients, so repeating this after a failure
    /// at most raises the suppression's occurrence count.
    async fn apply_effects(&self, event: &EngagementEvent) -> Result<(), IngestError> {
        if let Some(classification) = event.classification() {
            let reason = event.reason.clone().unwrap_or_else(|| {
                format!("{} reported by {}", event.event_type, event.provider)
            });
            let tenant = self
                .find_record(event)
                .await?
                .map(|record| record.tenant);

            match self
                .suppressions
                .record_bounce(&event.recipient, classification, reason, tenant)
                .await
            {
                Err(e) if e.is_invalid_address() => internal!(
                    level = WARN,
                    provider = %event.provider,
                    event_id = %event.event_id,
                    error = %e,
                    "Not suppressing malformed address"
                ),
                other => {
                    other?;
                }
            }
        }

        self.stats.apply(event);
        Ok(())
    }

    async fn find_record(&self, event: &EngagementEvent) -> Result<Option<DeliveryRecord>, IngestError> {
        if let Some(message_id) = &event.provider_message_id
            && let Some(record) = self.deliveries.find_by_provider_message_id(message_id).await?
        {
            return Ok(Some(record));
        }

        match &event.send_id {
            Some(send_id) => Ok(self.deliveries.get(send_id).await?),
            None => Ok(None),
        }
    }

    async fn apply_to_record(
        &self,
        event: &EngagementEvent,
        now: DateTime<Utc>,
    ) -> Result<IngestOutcome, IngestError> {
        let Some(record) = self.find_record(event).await? else {
            internal!(
                level = DEBUG,
                event_id = %event.event_id,
                "No delivery record yet; deferring"
            );
            return Ok(IngestOutcome::Deferred);
        };

        let Some(record) = self.deliveries.apply_event(&record.send_id, event).await? else {
            return Ok(IngestOutcome::Deferred);
        };

        self.events
            .mark_record_applied(&event.provider, &event.event_id)
            .await?;

        if let Some(state) = WorkflowState::from_delivery_status(record.status) {
            self.mirror_onto_workflow(&record, state, now).await?;
        }

        Ok(IngestOutcome::Processed)
    }

    async fn mirror_onto_workflow(
        &self,
        record: &DeliveryRecord,
        state: WorkflowState,
        now: DateTime<Utc>,
    ) -> Result<(), IngestError> {
        let target = provider_rank(&state);
        let guard = |current: &WorkflowState| {
            provider_rank(current).is_some_and(|rank| target.is_some_and(|target| rank < target))
        };
        let update = |workflow: &mut WorkflowRecord| {
            let sent_at = workflow.result.as_ref().and_then(|result| result.sent_at);
            workflow.state = state.clone();
            workflow.updated_at = now;
            if workflow.result.is_some() {
                let mut result = workflow.to_result(now);
                result.sent_at = sent_at.or(result.sent_at);
                workflow.result = Some(result);
            }
        };

        match self
            .workflows
            .transition(&record.send_id, &guard, &update)
            .await?
        {
            Transition::Applied(workflow) => internal!(
                level = DEBUG,
                send_id = %workflow.id,
                state = %workflow.state,
                "Mirrored provider outcome onto workflow"
            ),
            Transition::Rejected(_) | Transition::NotFound => {}
        }

        Ok(())
    }
}

/// Ordering of provider-reported outcomes on a workflow that has been sent.
/// Workflows that have not reached the provider have no rank.
const fn provider_rank(state: &WorkflowState) -> Option<u8> {
    let status = match state {
        WorkflowState::Sent => DeliveryStatus::Sent,
        WorkflowState::Delivered => DeliveryStatus::Delivered,
        WorkflowState::Bounced => DeliveryStatus::Bounced,
        WorkflowState::Suppressed => DeliveryStatus::Suppressed,
        WorkflowState::Complained => DeliveryStatus::Complained,
        _ => return None,
    };
    Some(status.rank())
}

fn record_event(provider: &str, event_type: &str, outcome: IngestOutcome) {
    if let Some(metrics) = herald_metrics::metrics() {
        metrics
            .webhook
            .record_event(provider, event_type, outcome.as_str());
    }
}
