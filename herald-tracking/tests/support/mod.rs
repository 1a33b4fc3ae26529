#![allow(dead_code)] // Test utility module - not all methods used in every test

use std::sync::{
    Arc,
    atomic::{AtomicBool, Ordering},
};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use herald_common::{
    ids::{BatchCorrelator, ProviderMessageId, SendId, TenantId},
    record::DeliveryRecord,
    send::{MessageContent, Priority, SendRequest, Tag},
    suppression::{Classification, SuppressionEntry},
    workflow::{WorkflowKind, WorkflowRecord, WorkflowState},
};
use herald_store::{
    DeliveryRecordStore, MemoryContactDirectory, MemoryDeliveryRecordStore, MemoryEventStore,
    MemorySuppressionStore, MemoryWorkflowStore, StoreError, SuppressionStore, WorkflowStore,
};
use herald_tracking::{
    IngestError, IngestOutcome, IngestionService, SignatureVerifier, StatsAggregator,
    SuppressionRegistry, WebhookRequest,
};

pub const PROVIDER: &str = "resend";
pub const SECRET: &str = "whsec_test";

/// Ingestion wired to in-memory stores that tests can inspect directly.
pub struct Harness {
    pub service: IngestionService,
    pub events: Arc<MemoryEventStore>,
    pub deliveries: Arc<MemoryDeliveryRecordStore>,
    pub workflows: Arc<MemoryWorkflowStore>,
    pub suppressions: Arc<MemorySuppressionStore>,
    pub contacts: Arc<MemoryContactDirectory>,
    pub registry: SuppressionRegistry,
    pub stats: Arc<StatsAggregator>,
    signer: SignatureVerifier,
}

/// Suppression store whose first write fails.
#[derive(Debug)]
pub struct FailOnceSuppressionStore {
    inner: Arc<MemorySuppressionStore>,
    failed: AtomicBool,
}

#[async_trait]
impl SuppressionStore for FailOnceSuppressionStore {
    async fn upsert(
        &self,
        email: &str,
        classification: Classification,
        reason: String,
        tenant_id: Option<TenantId>,
        now: DateTime<Utc>,
    ) -> herald_store::Result<SuppressionEntry> {
        if !self.failed.swap(true, Ordering::SeqCst) {
            return Err(StoreError::Internal("disk full".to_string()));
        }
        self.inner
            .upsert(email, classification, reason, tenant_id, now)
            .await
    }

    async fn get(&self, email: &str) -> herald_store::Result<Option<SuppressionEntry>> {
        self.inner.get(email).await
    }

    async fn list(&self) -> herald_store::Result<Vec<SuppressionEntry>> {
        self.inner.list().await
    }

    async fn deactivate(&self, email: &str) -> herald_store::Result<Option<SuppressionEntry>> {
        self.inner.deactivate(email).await
    }
}

impl Harness {
    pub fn new() -> Self {
        let suppressions = Arc::new(MemorySuppressionStore::new());
        Self::build(suppressions.clone(), suppressions)
    }

    /// Ingestion whose first suppression write fails.
    pub fn with_failing_suppression_write() -> Self {
        let suppressions = Arc::new(MemorySuppressionStore::new());
        let store = Arc::new(FailOnceSuppressionStore {
            inner: suppressions.clone(),
            failed: AtomicBool::new(false),
        });
        Self::build(store, suppressions)
    }

    fn build(store: Arc<dyn SuppressionStore>, suppressions: Arc<MemorySuppressionStore>) -> Self {
        let events = Arc::new(MemoryEventStore::new());
        let deliveries = Arc::new(MemoryDeliveryRecordStore::new());
        let workflows = Arc::new(MemoryWorkflowStore::new());
        let contacts = Arc::new(MemoryContactDirectory::new());
        let registry = SuppressionRegistry::new(store, contacts.clone());
        let stats = Arc::new(StatsAggregator::new());
        let signer = SignatureVerifier::new(SECRET, 300);

        let service = IngestionService::new(
            events.clone(),
            deliveries.clone(),
            workflows.clone(),
            registry.clone(),
            stats.clone(),
        )
        .with_verifier(PROVIDER, signer.clone());

        Self {
            service,
            events,
            deliveries,
            workflows,
            suppressions,
            contacts,
            registry,
            stats,
            signer,
        }
    }

    /// Deliver `body` signed as the provider would, at `now`.
    pub async fn deliver_at(
        &self,
        body: &str,
        now: DateTime<Utc>,
    ) -> Result<IngestOutcome, IngestError> {
        let timestamp = now.timestamp().to_string();
        let signature = self
            .signer
            .sign(now.timestamp(), body.as_bytes())
            .expect("signing works");

        self.service
            .ingest(
                WebhookRequest {
                    provider: PROVIDER,
                    timestamp: Some(&timestamp),
                    signature: Some(&signature),
                    event_id: None,
                    body: body.as_bytes(),
                },
                now,
            )
            .await
    }

    pub async fn deliver(&self, body: &str) -> Result<IngestOutcome, IngestError> {
        self.deliver_at(body, Utc::now()).await
    }

    /// A send that the provider accepted: a `Sent` workflow plus its record.
    pub async fn seed_sent(
        &self,
        send_id: &str,
        recipient: &str,
        message_id: &str,
        correlator: Option<BatchCorrelator>,
    ) {
        let mut tags = Vec::new();
        if let Some(correlator) = correlator {
            tags.push(Tag::new(BatchCorrelator::TAG, correlator.to_string()));
        }

        let request = SendRequest {
            id: SendId::new(send_id),
            tenant: TenantId::new("t1"),
            to: recipient.to_string(),
            from: None,
            subject: "Hello".to_string(),
            content: MessageContent::rendered("<p>Hello</p>"),
            scheduled_for: None,
            priority: Priority::Normal,
            tags,
        };

        let now = Utc::now();
        let mut workflow = WorkflowRecord::new(WorkflowKind::Single, request.clone(), now);
        workflow.state = WorkflowState::Sent;
        workflow.attempts = 1;
        workflow.provider_message_id = Some(ProviderMessageId::new(message_id));
        workflow.result = Some(workflow.to_result(now));
        self.workflows
            .insert_if_absent(workflow)
            .await
            .expect("workflow insert");

        self.deliveries
            .create_if_absent(DeliveryRecord::accepted(
                &request,
                PROVIDER,
                ProviderMessageId::new(message_id),
                now,
            ))
            .await
            .expect("record insert");
    }
}

/// A nested provider payload.
pub fn payload(event_type: &str, event_id: &str, recipient: &str, message_id: &str) -> String {
    serde_json::json!({
        "type": event_type,
        "id": event_id,
        "created_at": "2024-06-01T10:00:00Z",
        "data": {
            "id": message_id,
            "to": [recipient],
        }
    })
    .to_string()
}
