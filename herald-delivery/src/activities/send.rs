use std::time::Instant;

use chrono::Utc;
use herald_common::{
    audit, ids::ProviderMessageId, internal, outgoing, record::DeliveryRecord,
    workflow::WorkflowRecord,
};
use herald_store::Insert;

use crate::{
    ActivityError,
    activities::{Activities, Heartbeat, PreparedContent},
};

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SendOutcome {
    /// The provider has the message.
    Accepted {
        provider_message_id: ProviderMessageId,
        /// Accepted by an earlier invocation; the provider was not called.
        reused: bool,
    },
    /// The recipient is on the suppression list; the provider was not called.
    Suppressed,
}

impl Activities {
    /// Decide the send without calling the provider, where possible:
    /// suppressed recipients are refused and a send the provider already
    /// accepted is reused.
    ///
    /// # Errors
    ///
    /// A storage error.
    pub async fn check_recipient(
        &self,
        workflow: &WorkflowRecord,
    ) -> Result<Option<SendOutcome>, ActivityError> {
        let request = &workflow.request;

        if self.suppressions.is_suppressed(&request.to).await? {
            internal!(
                level = INFO,
                send_id = %request.id,
                "Recipient is suppressed, not sending"
            );
            return Ok(Some(SendOutcome::Suppressed));
        }

        if let Some(existing) = self.deliveries.get(&request.id).await? {
            internal!(
                level = INFO,
                send_id = %request.id,
                provider_message_id = %existing.provider_message_id,
                "Provider already accepted this send, reusing message id"
            );
            if let Some(metrics) = herald_metrics::metrics() {
                metrics.delivery.record_reused();
            }
            return Ok(Some(SendOutcome::Accepted {
                provider_message_id: existing.provider_message_id,
                reused: true,
            }));
        }

        Ok(None)
    }

    /// Hand the workflow's message to the provider, unless it already has it.
    ///
    /// The delivery record doubles as the guard: it is created the moment the
    /// provider accepts, and a later invocation for the same send id finds it
    /// and reuses its message id.
    ///
    /// # Errors
    ///
    /// Gateway failures classified as [`ActivityError`], or a storage error.
    pub async fn send(
        &self,
        workflow: &WorkflowRecord,
        content: &PreparedContent,
        attempt: u32,
        heartbeat: &Heartbeat,
    ) -> Result<SendOutcome, ActivityError> {
        let request = &workflow.request;
        heartbeat.beat();

        if let Some(outcome) = self.check_recipient(workflow).await? {
            return Ok(outcome);
        }

        let provider = self.gateway.provider_name().to_string();
        audit::log_delivery_attempt(request.id.as_str(), &provider, attempt);
        outgoing!(
            level = DEBUG,
            send_id = %request.id,
            provider = %provider,
            attempt,
            "Sending message"
        );

        let start = Instant::now();
        let tags = request.outbound_tags();
        let result = self
            .gateway
            .send(
                &request.to,
                request.from.as_deref(),
                &content.subject,
                &content.html,
                content.text.as_deref(),
                &tags,
            )
            .await;
        let elapsed = start.elapsed();

        if let Some(metrics) = herald_metrics::metrics() {
            let outcome = result.as_ref().map_or_else(|e| e.kind(), |_| "accepted");
            metrics
                .delivery
                .record_attempt(&provider, outcome, elapsed.as_secs_f64());
        }

        let receipt = result?;
        heartbeat.beat();

        let record = match self
            .deliveries
            .create_if_absent(DeliveryRecord::accepted(
                request,
                receipt.provider,
                receipt.message_id,
                Utc::now(),
            ))
            .await?
        {
            Insert::Inserted(record) => record,
            Insert::Existing(record) => {
                internal!(
                    level = WARN,
                    send_id = %request.id,
                    provider_message_id = %record.provider_message_id,
                    "Delivery record already existed, keeping the first"
                );
                record
            }
        };

        audit::log_delivery_success(
            request.id.as_str(),
            record.provider_message_id.as_str(),
            attempt,
            elapsed.as_millis(),
        );

        Ok(SendOutcome::Accepted {
            provider_message_id: record.provider_message_id,
            reused: false,
        })
    }
}
