use std::{future::Future, sync::Arc};

use chrono::{DateTime, TimeDelta, Utc};
use herald_common::{
    ids::WorkflowId,
    internal,
    workflow::{WorkflowKind, WorkflowRecord, WorkflowState},
};
use herald_store::Transition;
use tokio::{
    sync::{Notify, watch},
    time::sleep,
};

use crate::{
    ActivityError, WorkflowError,
    activities::{Completion, Heartbeat, SendOutcome, run_activity},
    workflow::{Orchestrator, TOKEN_VARIABLE, stopped},
};

/// Why a step sequence stopped early.
enum Interrupt {
    Failed(ActivityError),
    /// Shutdown; the workflow resumes on recovery.
    Stopped,
}

impl Orchestrator {
    pub(super) async fn drive(&self, record: WorkflowRecord, cancel: Arc<Notify>) {
        let id = record.id.clone();
        let outcome = self.execute(record, &cancel).await;
        self.inner.running.remove(&id);

        match outcome {
            Ok(Some(record)) => {
                if let Some(metrics) = herald_metrics::metrics() {
                    metrics
                        .delivery
                        .record_workflow_finished(record.state.name(), record.attempts);
                }
                if let Some(result) = record.result {
                    self.publish(result);
                }
            }
            Ok(None) => {
                internal!(
                    level = INFO,
                    send_id = %id,
                    "Workflow paused for shutdown, it resumes on recovery"
                );
                if let Some(metrics) = herald_metrics::metrics() {
                    metrics.delivery.record_workflow_finished("interrupted", 0);
                }
            }
            Err(e) => {
                internal!(
                    level = ERROR,
                    send_id = %id,
                    error = %e,
                    "Workflow interrupted, it resumes on recovery"
                );
                if let Some(metrics) = herald_metrics::metrics() {
                    metrics.delivery.record_workflow_finished("interrupted", 0);
                }
            }
        }
    }

    /// Run `record` to a terminal state. `None` if shutdown stopped it first.
    async fn execute(
        &self,
        mut record: WorkflowRecord,
        cancel: &Notify,
    ) -> Result<Option<WorkflowRecord>, WorkflowError> {
        let mut stop = self.inner.stop.subscribe();
        let id = record.id.clone();

        if record.state.is_cancellable() && self.campaign_cancelled(&record) {
            return self.cancel_member(&id).await.map(Some);
        }

        if record.state == WorkflowState::Created
            && let Some(until) = record
                .request
                .scheduled_for
                .filter(|until| *until > Utc::now())
        {
            let now = Utc::now();
            let guard = |state: &WorkflowState| *state == WorkflowState::Created;
            let update = |record: &mut WorkflowRecord| {
                record.state = WorkflowState::ScheduledWait { until };
                record.updated_at = now;
            };

            match self.inner.workflows.transition(&id, &guard, &update).await? {
                Transition::Applied(updated) => record = updated,
                Transition::Rejected(_) => return self.current(&id).await.map(Some),
                Transition::NotFound => return Err(WorkflowError::NotFound(id)),
            }
        }

        if let WorkflowState::ScheduledWait { until } = &record.state {
            // Trust the timer once armed; the wall clock is not consulted again
            let delay = (*until - Utc::now()).to_std().unwrap_or_default();
            internal!(
                level = DEBUG,
                send_id = %id,
                until = %until,
                delay_secs = delay.as_secs(),
                "Waiting for scheduled time"
            );

            tokio::select! {
                () = sleep(delay) => {}
                () = cancel.notified() => return self.current(&id).await.map(Some),
                () = stopped(&mut stop) => return Ok(None),
            }
        }

        if record.state.is_finished() {
            return Ok(Some(record));
        }

        let _permit = tokio::select! {
            permit = self.inner.permits.acquire() => match permit {
                Ok(permit) => permit,
                Err(_) => return Ok(None),
            },
            () = cancel.notified() => return self.current(&id).await.map(Some),
            () = stopped(&mut stop) => return Ok(None),
        };

        if record.state.is_cancellable() && self.campaign_cancelled(&record) {
            return self.cancel_member(&id).await.map(Some);
        }

        if record.state.is_cancellable() {
            let now = Utc::now();
            let attempt = record.attempts;
            let guard = |state: &WorkflowState| state.is_cancellable();
            let update = |record: &mut WorkflowRecord| {
                record.state = WorkflowState::Sending { attempt };
                record.updated_at = now;
            };

            match self.inner.workflows.transition(&id, &guard, &update).await? {
                Transition::Applied(updated) => record = updated,
                // Cancelled first
                Transition::Rejected(_) => return self.current(&id).await.map(Some),
                Transition::NotFound => return Err(WorkflowError::NotFound(id)),
            }
        }

        let completion = match self.deliver(&record).await {
            Ok(completion) => completion,
            Err(Interrupt::Stopped) => return Ok(None),
            Err(Interrupt::Failed(e)) => {
                internal!(
                    level = WARN,
                    send_id = %id,
                    kind = e.kind(),
                    error = %e,
                    "Workflow step failed"
                );
                Completion::Failed {
                    error: e.to_string(),
                }
            }
        };

        let activities = &self.inner.activities;
        let (record, completion) = (&record, &completion);
        match self
            .retry(&id, "persist", 0, |_| async move {
                activities.persist(record, completion, Utc::now()).await
            })
            .await
        {
            Ok(record) => Ok(Some(record)),
            Err(Interrupt::Stopped) => Ok(None),
            Err(Interrupt::Failed(e)) => {
                internal!(
                    level = ERROR,
                    send_id = %id,
                    error = %e,
                    "Could not record workflow outcome"
                );
                Ok(None)
            }
        }
    }

    /// The step sequence: token (invitations only), prepare, check, send.
    /// Stops at the first step that fails for good.
    async fn deliver(&self, record: &WorkflowRecord) -> Result<Completion, Interrupt> {
        let activities = &self.inner.activities;
        let id = &record.id;
        let mut request = record.request.clone();

        if let WorkflowKind::Invitation {
            subject,
            action,
            ttl_secs,
        } = &record.kind
        {
            let expires_at = expiry(record.created_at, *ttl_secs);
            let token = self
                .retry(id, "token", 0, |_| async move {
                    Ok(activities.tokens.issue(subject, action, expires_at)?)
                })
                .await?;
            request.content.insert_variable(TOKEN_VARIABLE, token);
        }

        let request = &request;
        let content = self
            .retry(id, "prepare", 0, |_| async move { activities.content.prepare(request) })
            .await?;

        let outcome = match self
            .retry(id, "check", 0, |_| async move {
                activities.check_recipient(record).await
            })
            .await?
        {
            Some(outcome) => outcome,
            None => {
                // Attempts made before a restart count against the cap
                if !self.inner.retry.should_retry(record.attempts) {
                    return Err(Interrupt::Failed(ActivityError::Exhausted {
                        attempts: record.attempts,
                    }));
                }

                let content = &content;
                self.retry(id, "send", record.attempts, |heartbeat: Heartbeat| async move {
                    let current = self.begin_attempt(id).await?;
                    activities
                        .send(&current, content, current.attempts, &heartbeat)
                        .await
                })
                .await?
            }
        };

        Ok(match outcome {
            SendOutcome::Accepted {
                provider_message_id,
                ..
            } => Completion::Sent {
                provider_message_id,
            },
            SendOutcome::Suppressed => Completion::Suppressed,
        })
    }

    /// Count a provider attempt before it is made.
    async fn begin_attempt(&self, id: &WorkflowId) -> Result<WorkflowRecord, ActivityError> {
        let now = Utc::now();
        let guard = |state: &WorkflowState| matches!(state, WorkflowState::Sending { .. });
        let update = |record: &mut WorkflowRecord| {
            record.attempts = record.attempts.saturating_add(1);
            record.state = WorkflowState::Sending {
                attempt: record.attempts,
            };
            record.updated_at = now;
        };

        match self.inner.workflows.transition(id, &guard, &update).await? {
            Transition::Applied(record) => Ok(record),
            Transition::Rejected(state) => Err(ActivityError::Validation(format!(
                "Workflow is {state}, not sending"
            ))),
            Transition::NotFound => Err(ActivityError::System(format!("Workflow {id} not found"))),
        }
    }

    /// Invoke an activity under the retry policy, `attempts_made` of its
    /// attempts already spent.
    async fn retry<T, F, Fut>(
        &self,
        id: &WorkflowId,
        name: &'static str,
        attempts_made: u32,
        mut invoke: F,
    ) -> Result<T, Interrupt>
    where
        F: FnMut(Heartbeat) -> Fut,
        Fut: Future<Output = Result<T, ActivityError>>,
    {
        let mut stop: watch::Receiver<bool> = self.inner.stop.subscribe();
        let mut attempt = attempts_made;

        loop {
            attempt += 1;
            match run_activity(name, &self.inner.options, &mut invoke).await {
                Ok(value) => return Ok(value),
                Err(e) if e.is_retryable() && self.inner.retry.should_retry(attempt) => {
                    let delay = self.inner.retry.backoff(attempt);
                    internal!(
                        level = WARN,
                        send_id = %id,
                        activity = name,
                        attempt,
                        remaining = self.inner.retry.remaining_attempts(attempt),
                        delay_ms = delay.as_millis(),
                        error = %e,
                        "Activity failed, retrying"
                    );

                    tokio::select! {
                        () = sleep(delay) => {}
                        () = stopped(&mut stop) => return Err(Interrupt::Stopped),
                    }
                }
                Err(e) => return Err(Interrupt::Failed(e)),
            }
        }
    }

    async fn current(&self, id: &WorkflowId) -> Result<WorkflowRecord, WorkflowError> {
        self.get(id).await
    }

    fn campaign_cancelled(&self, record: &WorkflowRecord) -> bool {
        match &record.kind {
            WorkflowKind::CampaignMember { correlator } => {
                self.inner.cancelled_campaigns.contains(correlator)
            }
            _ => false,
        }
    }

    async fn cancel_member(&self, id: &WorkflowId) -> Result<WorkflowRecord, WorkflowError> {
        internal!(level = INFO, send_id = %id, "Campaign was cancelled, member stops");
        self.cancel(id).await?;
        self.current(id).await
    }
}

impl From<ActivityError> for Interrupt {
    fn from(err: ActivityError) -> Self {
        Self::Failed(err)
    }
}

/// When an invitation token issued for a workflow created at `created_at`
/// expires. Derived from the workflow, so re-issuing yields the same token.
fn expiry(created_at: DateTime<Utc>, ttl_secs: u64) -> DateTime<Utc> {
    i64::try_from(ttl_secs)
        .ok()
        .and_then(TimeDelta::try_seconds)
        .and_then(|ttl| created_at.checked_add_signed(ttl))
        .unwrap_or(DateTime::<Utc>::MAX_UTC)
}
