//! Workflow orchestrator
//!
//! One workflow drives one send through
//!
//! ```text
//! Created -> [ScheduledWait] -> Sending -> Sent | Suppressed | Failed
//!        \___________________\__-> Cancelled
//! ```
//!
//! Every state change is a compare-and-set against the [`WorkflowStore`], so a
//! cancel racing the start of `Sending` has exactly one winner, and a restarted
//! process can pick each unfinished workflow up where it stopped. Provider
//! outcomes reported later by webhook (delivered, bounced, complained) are
//! mirrored onto finished workflows by ingestion.

mod run;
pub mod types;

use std::sync::{
    Arc,
    atomic::{AtomicBool, Ordering},
};

use chrono::Utc;
use dashmap::{DashMap, DashSet, mapref::entry::Entry};
use herald_common::{
    Signal, address, audit,
    ids::{BatchCorrelator, SendId, WorkflowId},
    internal,
    send::{MessageContent, Priority, SendRequest},
    workflow::{WorkflowKind, WorkflowRecord, WorkflowResult, WorkflowState},
};
use herald_store::{Insert, Transition, WorkflowStore};
use tokio::sync::{Notify, Semaphore, broadcast, watch};

pub use types::{
    CampaignCancellation, CampaignDispatch, CampaignRecipient, CampaignRequest, CancelOutcome,
    InvitationRequest, TOKEN_VARIABLE, WorkflowHandle,
};

use crate::{
    DeliveryConfig, WorkflowError,
    activities::Activities,
    policy::{ActivityOptions, RetryPolicy},
};

const SHUTDOWN_TIMEOUT: std::time::Duration = std::time::Duration::from_secs(30);

/// Upper bound on `max_concurrent_sends`.
const MAX_PERMITS: usize = 10_000;

#[derive(Debug)]
struct Inner {
    activities: Activities,
    workflows: Arc<dyn WorkflowStore>,
    retry: RetryPolicy,
    options: ActivityOptions,
    permits: Semaphore,
    permit_count: u32,
    /// Cancel signal of every workflow with a live task.
    running: DashMap<WorkflowId, Arc<Notify>>,
    completions: DashMap<WorkflowId, watch::Sender<Option<WorkflowResult>>>,
    /// Campaigns cancelled since start. Members not yet sending stop at the
    /// next step boundary.
    cancelled_campaigns: DashSet<BatchCorrelator>,
    stop: watch::Sender<bool>,
    accepting: AtomicBool,
}

/// Starts, cancels and resumes send workflows.
///
/// Cheap to clone; clones share the same workflows.
#[derive(Debug, Clone)]
pub struct Orchestrator {
    inner: Arc<Inner>,
}

impl Orchestrator {
    pub fn new(activities: Activities, config: &DeliveryConfig) -> Self {
        let permits = config.max_concurrent_sends.clamp(1, MAX_PERMITS);

        Self {
            inner: Arc::new(Inner {
                workflows: activities.workflows.clone(),
                activities,
                retry: config.retry.clone(),
                options: config.activity.clone(),
                permits: Semaphore::new(permits),
                permit_count: u32::try_from(permits).unwrap_or(1),
                running: DashMap::new(),
                completions: DashMap::new(),
                cancelled_campaigns: DashSet::new(),
                stop: watch::Sender::new(false),
                accepting: AtomicBool::new(true),
            }),
        }
    }

    /// Start a workflow for a single send.
    ///
    /// # Errors
    ///
    /// [`WorkflowError::Validation`] for unusable requests, or a store error.
    pub async fn start_send(&self, request: SendRequest) -> Result<WorkflowHandle, WorkflowError> {
        validate(&request)?;
        self.start_workflow(WorkflowKind::Single, request).await
    }

    /// Dispatch one template to every recipient under a fresh correlator.
    ///
    /// Every recipient is validated before any workflow starts.
    ///
    /// # Errors
    ///
    /// [`WorkflowError::Validation`] if the campaign or any recipient is
    /// unusable, or a store error.
    pub async fn start_campaign(
        &self,
        campaign: CampaignRequest,
    ) -> Result<CampaignDispatch, WorkflowError> {
        if campaign.recipients.is_empty() {
            return Err(WorkflowError::Validation(
                "Campaign has no recipients".to_string(),
            ));
        }

        let correlator = BatchCorrelator::generate();
        let mut requests = Vec::with_capacity(campaign.recipients.len());

        for (index, recipient) in campaign.recipients.into_iter().enumerate() {
            let mut variables = campaign.variables.clone();
            variables.extend(recipient.variables);

            let mut request = SendRequest {
                id: recipient
                    .id
                    .unwrap_or_else(|| SendId::new(format!("{correlator}-{index}"))),
                tenant: campaign.tenant.clone(),
                to: recipient.to,
                from: campaign.from.clone(),
                subject: campaign.subject.clone(),
                content: MessageContent::Template {
                    html: campaign.html.clone(),
                    text: campaign.text.clone(),
                    variables,
                },
                scheduled_for: campaign.scheduled_for,
                priority: campaign.priority,
                tags: campaign.tags.clone(),
            };
            request.set_tag(BatchCorrelator::TAG, correlator.to_string());

            validate(&request)?;
            requests.push(request);
        }

        internal!(
            level = INFO,
            correlator = %correlator,
            recipients = requests.len(),
            "Dispatching campaign"
        );

        let mut handles = Vec::with_capacity(requests.len());
        for request in requests {
            handles.push(
                self.start_workflow(WorkflowKind::CampaignMember { correlator }, request)
                    .await?,
            );
        }

        Ok(CampaignDispatch {
            correlator,
            handles,
        })
    }

    /// Start a workflow that signs an action token and mails it.
    ///
    /// # Errors
    ///
    /// [`WorkflowError::Validation`] for unusable requests, or a store error.
    pub async fn start_invitation(
        &self,
        invitation: InvitationRequest,
    ) -> Result<WorkflowHandle, WorkflowError> {
        if invitation.subject_id.trim().is_empty() || invitation.action.trim().is_empty() {
            return Err(WorkflowError::Validation(
                "Invitation needs a subject id and an action".to_string(),
            ));
        }
        if invitation.ttl_secs == 0 {
            return Err(WorkflowError::Validation(
                "Invitation ttl must be positive".to_string(),
            ));
        }

        let request = SendRequest {
            id: invitation.id,
            tenant: invitation.tenant,
            to: invitation.to,
            from: invitation.from,
            subject: invitation.subject,
            content: MessageContent::Template {
                html: invitation.html,
                text: invitation.text,
                variables: invitation.variables,
            },
            scheduled_for: invitation.scheduled_for,
            priority: Priority::High,
            tags: invitation.tags,
        };
        validate(&request)?;

        self.start_workflow(
            WorkflowKind::Invitation {
                subject: invitation.subject_id,
                action: invitation.action,
                ttl_secs: invitation.ttl_secs,
            },
            request,
        )
        .await
    }

    async fn start_workflow(
        &self,
        kind: WorkflowKind,
        request: SendRequest,
    ) -> Result<WorkflowHandle, WorkflowError> {
        if !self.inner.accepting.load(Ordering::SeqCst) {
            return Err(WorkflowError::ShuttingDown);
        }

        let kind_name = match &kind {
            WorkflowKind::Single => "single",
            WorkflowKind::CampaignMember { .. } => "campaign",
            WorkflowKind::Invitation { .. } => "invitation",
        };

        match self
            .inner
            .workflows
            .insert_if_absent(WorkflowRecord::new(kind, request, Utc::now()))
            .await?
        {
            Insert::Inserted(record) => {
                audit::log_send_accepted(
                    record.id.as_str(),
                    record.request.tenant.as_str(),
                    &record.request.to,
                    kind_name,
                );
                let handle = handle(&record);
                self.spawn(record);
                Ok(handle)
            }
            Insert::Existing(record) => {
                internal!(
                    level = DEBUG,
                    send_id = %record.id,
                    state = %record.state,
                    "Workflow already started, returning existing handle"
                );
                Ok(handle(&record))
            }
        }
    }

    /// Cancel a workflow that has not started sending.
    ///
    /// # Errors
    ///
    /// Only if the workflow store cannot be reached.
    pub async fn cancel(&self, id: &WorkflowId) -> Result<CancelOutcome, WorkflowError> {
        let now = Utc::now();
        let guard = |state: &WorkflowState| state.is_cancellable();
        let update = |record: &mut WorkflowRecord| {
            record.state = WorkflowState::Cancelled;
            record.updated_at = now;
            record.result = Some(record.to_result(now));
        };

        match self.inner.workflows.transition(id, &guard, &update).await? {
            Transition::Applied(record) => {
                internal!(level = INFO, send_id = %id, "Workflow cancelled");
                if let Some(signal) = self.inner.running.get(id) {
                    signal.notify_one();
                }
                if let Some(result) = record.result {
                    self.publish(result);
                }
                Ok(CancelOutcome::Cancelled)
            }
            Transition::Rejected(WorkflowState::Cancelled) => Ok(CancelOutcome::AlreadyCancelled),
            Transition::Rejected(state) => Ok(CancelOutcome::NotCancellable { state }),
            Transition::NotFound => Ok(CancelOutcome::NotFound),
        }
    }

    /// Cancel every campaign member that has not started sending.
    ///
    /// # Errors
    ///
    /// Only if the workflow store cannot be reached.
    pub async fn cancel_campaign(
        &self,
        correlator: &BatchCorrelator,
    ) -> Result<CampaignCancellation, WorkflowError> {
        // Catches members stored after the listing below
        self.inner.cancelled_campaigns.insert(*correlator);

        let members: Vec<_> = self
            .inner
            .workflows
            .list_unfinished()
            .await?
            .into_iter()
            .filter(|record| {
                matches!(&record.kind, WorkflowKind::CampaignMember { correlator: c } if c == correlator)
            })
            .collect();

        let mut outcome = CampaignCancellation::default();
        for member in members {
            match self.cancel(&member.id).await? {
                CancelOutcome::Cancelled | CancelOutcome::AlreadyCancelled => outcome.cancelled += 1,
                CancelOutcome::NotCancellable { .. } => outcome.not_cancellable += 1,
                CancelOutcome::NotFound => {}
            }
        }

        internal!(
            level = INFO,
            correlator = %correlator,
            cancelled = outcome.cancelled,
            not_cancellable = outcome.not_cancellable,
            "Campaign cancelled"
        );

        Ok(outcome)
    }

    /// The stored workflow.
    ///
    /// # Errors
    ///
    /// [`WorkflowError::NotFound`] for unknown ids, or a store error.
    pub async fn get(&self, id: &WorkflowId) -> Result<WorkflowRecord, WorkflowError> {
        self.inner
            .workflows
            .get(id)
            .await?
            .ok_or_else(|| WorkflowError::NotFound(id.clone()))
    }

    /// The workflow's result, once it has finished.
    ///
    /// # Errors
    ///
    /// [`WorkflowError::NotFound`] for unknown ids, or a store error.
    pub async fn result(&self, id: &WorkflowId) -> Result<Option<WorkflowResult>, WorkflowError> {
        Ok(self.get(id).await?.result)
    }

    /// Wait for the workflow to finish.
    ///
    /// # Errors
    ///
    /// [`WorkflowError::NotFound`] for unknown ids,
    /// [`WorkflowError::ShuttingDown`] if the orchestrator stops first, or a
    /// store error.
    pub async fn wait(&self, id: &WorkflowId) -> Result<WorkflowResult, WorkflowError> {
        let mut stop = self.inner.stop.subscribe();

        loop {
            let mut completion = self
                .inner
                .completions
                .entry(id.clone())
                .or_insert_with(|| watch::Sender::new(None))
                .subscribe();

            // Subscribed first, so a result published from here on is seen
            if let Some(result) = self.result(id).await? {
                return Ok(result);
            }

            tokio::select! {
                changed = completion.changed() => {
                    if changed.is_ok()
                        && let Some(result) = completion.borrow_and_update().clone()
                    {
                        return Ok(result);
                    }
                }
                () = stopped(&mut stop) => return Err(WorkflowError::ShuttingDown),
            }
        }
    }

    /// Workflows with a live task, waiting ones included.
    pub fn in_flight(&self) -> usize {
        self.inner.running.len()
    }

    pub fn is_accepting(&self) -> bool {
        self.inner.accepting.load(Ordering::SeqCst)
    }

    /// Resume every unfinished workflow without a live task.
    ///
    /// # Errors
    ///
    /// If the unfinished workflows cannot be listed.
    pub async fn recover(&self) -> Result<usize, WorkflowError> {
        let unfinished = self.inner.workflows.list_unfinished().await?;
        let total = unfinished.len();

        let mut resumed = 0;
        for record in unfinished {
            if self.spawn(record) {
                resumed += 1;
            }
        }

        internal!(
            level = INFO,
            unfinished = total,
            resumed,
            "Recovered unfinished workflows"
        );

        Ok(resumed)
    }

    /// Resume unfinished workflows, then run until shutdown is signalled.
    ///
    /// ## Graceful Shutdown
    ///
    /// 1. Stop accepting new workflows
    /// 2. Stop waiting workflows and retries from going further
    /// 3. Wait for in-flight sends to finish (with 30s timeout)
    ///
    /// Whatever is left unfinished resumes on the next [`Orchestrator::recover`].
    ///
    /// # Errors
    ///
    /// If recovery fails at startup.
    pub async fn serve(&self, mut shutdown: broadcast::Receiver<Signal>) -> Result<(), WorkflowError> {
        internal!("Workflow orchestrator starting");
        self.recover().await?;

        match shutdown.recv().await {
            Ok(Signal::Shutdown | Signal::Finalised) => {
                internal!("Workflow orchestrator received shutdown signal");
            }
            Err(e) => {
                internal!(level = ERROR, error = %e, "Workflow orchestrator shutdown channel error");
            }
        }

        self.shutdown().await;
        Ok(())
    }

    /// Stop taking work and wait for in-flight sends.
    pub async fn shutdown(&self) {
        self.inner.accepting.store(false, Ordering::SeqCst);
        self.inner.stop.send_replace(true);

        match tokio::time::timeout(
            SHUTDOWN_TIMEOUT,
            self.inner.permits.acquire_many(self.inner.permit_count),
        )
        .await
        {
            Ok(_) => internal!("All in-flight sends completed"),
            Err(_) => internal!(
                level = WARN,
                running = self.inner.running.len(),
                "Shutdown timeout exceeded, in-flight sends will resume on restart"
            ),
        }

        internal!("Workflow orchestrator shutdown complete");
    }

    /// Spawn a task for `record` unless one is already running. Returns
    /// whether a task was spawned.
    fn spawn(&self, record: WorkflowRecord) -> bool {
        let cancel = Arc::new(Notify::new());
        match self.inner.running.entry(record.id.clone()) {
            Entry::Occupied(_) => return false,
            Entry::Vacant(entry) => {
                entry.insert(cancel.clone());
            }
        }

        if let Some(metrics) = herald_metrics::metrics() {
            metrics.delivery.record_workflow_started();
        }

        let this = self.clone();
        tokio::spawn(async move { this.drive(record, cancel).await });
        true
    }

    fn publish(&self, result: WorkflowResult) {
        if let Some((_, sender)) = self.inner.completions.remove(&result.id) {
            sender.send_replace(Some(result));
        }
    }
}

/// Resolves once shutdown has been signalled. The borrow `wait_for` hands back
/// is not `Send`, so it is dropped here rather than held in a `select!`.
async fn stopped(stop: &mut watch::Receiver<bool>) {
    let _ = stop.wait_for(|stopped| *stopped).await;
}

fn handle(record: &WorkflowRecord) -> WorkflowHandle {
    WorkflowHandle {
        workflow_id: record.id.clone(),
        run_id: record.run_id,
    }
}

fn validate(request: &SendRequest) -> Result<(), WorkflowError> {
    if request.id.trim().is_empty() {
        return Err(WorkflowError::Validation("Send id must not be empty".to_string()));
    }
    if request.subject.trim().is_empty() {
        return Err(WorkflowError::Validation("Subject must not be empty".to_string()));
    }

    let html = match &request.content {
        MessageContent::Rendered { html, .. } | MessageContent::Template { html, .. } => html,
    };
    if html.trim().is_empty() {
        return Err(WorkflowError::Validation("Body must not be empty".to_string()));
    }

    address::validate(&request.to).map_err(|e| {
        WorkflowError::Validation(format!("Invalid recipient {:?}: {e}", request.to))
    })
}
