#![allow(dead_code)] // Test utility module - not all methods used in every test

use std::sync::Arc;

use axum::{
    Router,
    body::{Body, to_bytes},
    http::{Method, Request, StatusCode, header},
};
use chrono::Utc;
use herald_delivery::{
    Activities, ContentRenderer, DeliveryConfig, Orchestrator, TokenSigner,
};
use herald_gateway::{MockProvider, ProviderGateway};
use herald_server::{AppState, HealthChecker, ServerConfig, router};
use herald_store::{
    MemoryContactDirectory, MemoryDeliveryRecordStore, MemoryEventStore, MemorySuppressionStore,
    MemoryWorkflowStore,
};
use herald_tracking::{
    IngestionService, SignatureVerifier, StatsAggregator, SuppressionRegistry,
    signature::{SIGNATURE_HEADER, TIMESTAMP_HEADER},
};
use serde_json::Value;
use tower::ServiceExt;

pub const PROVIDER: &str = "resend";
pub const SECRET: &str = "whsec_test";

/// The full router over in-memory stores and a mock provider.
pub struct TestApp {
    pub router: Router,
    pub state: AppState,
    pub provider: Arc<MockProvider>,
    pub events: Arc<MemoryEventStore>,
    pub suppressions: Arc<MemorySuppressionStore>,
    signer: SignatureVerifier,
}

impl TestApp {
    pub fn new() -> Self {
        let provider = Arc::new(MockProvider::new());
        let workflows = Arc::new(MemoryWorkflowStore::new());
        let deliveries = Arc::new(MemoryDeliveryRecordStore::new());
        let events = Arc::new(MemoryEventStore::new());
        let suppressions = Arc::new(MemorySuppressionStore::new());
        let registry =
            SuppressionRegistry::new(suppressions.clone(), Arc::new(MemoryContactDirectory::new()));
        let stats = Arc::new(StatsAggregator::new());
        let signer = SignatureVerifier::new(SECRET, 300);

        let activities = Activities {
            gateway: ProviderGateway::new(provider.clone())
                .with_default_from("noreply@example.com"),
            suppressions: registry.clone(),
            workflows: workflows.clone(),
            deliveries: deliveries.clone(),
            events: events.clone(),
            stats: stats.clone(),
            tokens: TokenSigner::new("token-secret"),
            content: ContentRenderer::new(),
        };

        let ingestion = IngestionService::new(
            events.clone(),
            deliveries,
            workflows,
            registry.clone(),
            stats.clone(),
        )
        .with_verifier(PROVIDER, signer.clone());

        let health = Arc::new(HealthChecker::new(1000));
        health.set_storage_ready(true);
        health.set_orchestrator_ready(true);
        health.set_webhooks_ready(true);

        let state = AppState {
            orchestrator: Orchestrator::new(activities, &DeliveryConfig::default()),
            ingestion,
            suppressions: registry,
            stats,
            health,
        };

        Self {
            router: router(state.clone(), &ServerConfig::default()),
            state,
            provider,
            events,
            suppressions,
            signer,
        }
    }

    pub async fn request(&self, request: Request<Body>) -> (StatusCode, Value) {
        let response = self
            .router
            .clone()
            .oneshot(request)
            .await
            .expect("router is infallible");
        let status = response.status();
        let bytes = to_bytes(response.into_body(), usize::MAX)
            .await
            .expect("body reads");

        let body = if bytes.is_empty() {
            Value::Null
        } else {
            serde_json::from_slice(&bytes)
                .unwrap_or_else(|_| Value::String(String::from_utf8_lossy(&bytes).into_owned()))
        };

        (status, body)
    }

    pub async fn get(&self, uri: &str) -> (StatusCode, Value) {
        self.request(
            Request::builder()
                .uri(uri)
                .body(Body::empty())
                .expect("request builds"),
        )
        .await
    }

    pub async fn delete(&self, uri: &str) -> (StatusCode, Value) {
        self.request(
            Request::builder()
                .method(Method::DELETE)
                .uri(uri)
                .body(Body::empty())
                .expect("request builds"),
        )
        .await
    }

    pub async fn post_json(&self, uri: &str, body: &Value) -> (StatusCode, Value) {
        self.request(
            Request::builder()
                .method(Method::POST)
                .uri(uri)
                .header(header::CONTENT_TYPE, "application/json")
                .body(Body::from(body.to_string()))
                .expect("request builds"),
        )
        .await
    }

    /// Post a webhook signed with the provider's secret.
    pub async fn webhook(&self, provider: &str, body: &str) -> (StatusCode, Value) {
        let now = Utc::now().timestamp();
        let signature = self.signer.sign(now, body.as_bytes()).expect("signing works");

        self.request(
            Request::builder()
                .method(Method::POST)
                .uri(format!("/webhooks/{provider}"))
                .header(header::CONTENT_TYPE, "application/json")
                .header(TIMESTAMP_HEADER, now.to_string())
                .header(SIGNATURE_HEADER, signature)
                .body(Body::from(body.to_string()))
                .expect("request builds"),
        )
        .await
    }
}
