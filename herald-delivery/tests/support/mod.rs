#![allow(dead_code)] // Test utility module - not all methods used in every test

use std::{collections::BTreeMap, sync::Arc};

use chrono::{DateTime, Utc};
use herald_common::{
    ids::{SendId, TenantId},
    send::{MessageContent, Priority, SendRequest},
};
use herald_delivery::{
    Activities, ContentRenderer, DeliveryConfig, Orchestrator, RetryPolicy, TokenSigner,
};
use herald_gateway::{MockOutcome, MockProvider, ProviderGateway};
use herald_store::{
    MemoryContactDirectory, MemoryDeliveryRecordStore, MemoryEventStore, MemorySuppressionStore,
    MemoryWorkflowStore,
};
use herald_tracking::{StatsAggregator, SuppressionRegistry};

pub const TOKEN_SECRET: &str = "token-secret";

/// An orchestrator wired to a scripted provider and in-memory stores.
pub struct Harness {
    pub orchestrator: Orchestrator,
    pub activities: Activities,
    pub provider: Arc<MockProvider>,
    pub workflows: Arc<MemoryWorkflowStore>,
    pub deliveries: Arc<MemoryDeliveryRecordStore>,
    pub events: Arc<MemoryEventStore>,
    pub registry: SuppressionRegistry,
    pub stats: Arc<StatsAggregator>,
    pub config: DeliveryConfig,
}

impl Harness {
    pub fn new() -> Self {
        Self::with_script([])
    }

    pub fn with_script(script: impl IntoIterator<Item = MockOutcome>) -> Self {
        Self::build(
            Arc::new(MockProvider::new().with_script(script)),
            Arc::new(MemoryWorkflowStore::new()),
            Arc::new(MemoryDeliveryRecordStore::new()),
        )
    }

    /// A fresh orchestrator over the same stores and provider, as after a
    /// restart.
    pub fn restart(&self) -> Self {
        Self::build(
            self.provider.clone(),
            self.workflows.clone(),
            self.deliveries.clone(),
        )
    }

    fn build(
        provider: Arc<MockProvider>,
        workflows: Arc<MemoryWorkflowStore>,
        deliveries: Arc<MemoryDeliveryRecordStore>,
    ) -> Self {
        let events = Arc::new(MemoryEventStore::new());
        let registry = SuppressionRegistry::new(
            Arc::new(MemorySuppressionStore::new()),
            Arc::new(MemoryContactDirectory::new()),
        );
        let stats = Arc::new(StatsAggregator::new());

        let activities = Activities {
            gateway: ProviderGateway::new(provider.clone())
                .with_default_from("noreply@example.com"),
            suppressions: registry.clone(),
            workflows: workflows.clone(),
            deliveries: deliveries.clone(),
            events: events.clone(),
            stats: stats.clone(),
            tokens: TokenSigner::new(TOKEN_SECRET),
            content: ContentRenderer::new(),
        };

        let config = DeliveryConfig {
            retry: RetryPolicy::default(),
            ..DeliveryConfig::default()
        };

        Self {
            orchestrator: Orchestrator::new(activities.clone(), &config),
            activities,
            provider,
            workflows,
            deliveries,
            events,
            registry,
            stats,
            config,
        }
    }
}

pub fn request(id: &str, to: &str) -> SendRequest {
    SendRequest {
        id: SendId::new(id),
        tenant: TenantId::new("t1"),
        to: to.to_string(),
        from: None,
        subject: "Hello".to_string(),
        content: MessageContent::rendered("<p>Hello</p>"),
        scheduled_for: None,
        priority: Priority::Normal,
        tags: Vec::new(),
    }
}

pub fn scheduled(id: &str, to: &str, at: DateTime<Utc>) -> SendRequest {
    SendRequest {
        scheduled_for: Some(at),
        ..request(id, to)
    }
}

pub fn template(html: &str, variables: &[(&str, &str)]) -> MessageContent {
    MessageContent::Template {
        html: html.to_string(),
        text: None,
        variables: variables
            .iter()
            .map(|(k, v)| ((*k).to_string(), (*v).to_string()))
            .collect::<BTreeMap<_, _>>(),
    }
}
