//! Route table

mod campaigns;
mod health;
mod sends;
mod suppressions;
mod webhooks;

use std::sync::Arc;

use axum::{
    Router,
    extract::DefaultBodyLimit,
    routing::{delete, get, post},
};
use herald_delivery::Orchestrator;
use herald_tracking::{IngestionService, StatsAggregator, SuppressionRegistry};

use crate::{HealthChecker, ServerConfig};

pub use suppressions::{SuppressionList, SuppressionRequest};

/// Everything a handler can reach.
#[derive(Debug, Clone)]
pub struct AppState {
    pub orchestrator: Orchestrator,
    pub ingestion: IngestionService,
    pub suppressions: SuppressionRegistry,
    pub stats: Arc<StatsAggregator>,
    pub health: Arc<HealthChecker>,
}

/// Build the full router. Timeouts are layered on by the server.
pub fn router(state: AppState, config: &ServerConfig) -> Router {
    Router::new()
        .route("/webhooks/{provider}", post(webhooks::receive))
        .route(
            "/suppressions",
            get(suppressions::list).post(suppressions::add),
        )
        .route("/suppressions/{email}", delete(suppressions::lift))
        .route("/campaigns", post(campaigns::start))
        .route("/campaigns/{correlator}", delete(campaigns::cancel))
        .route("/campaigns/{correlator}/stats", get(campaigns::stats))
        .route("/sends", post(sends::start))
        .route("/sends/{id}", get(sends::status).delete(sends::cancel))
        .route("/invitations", post(sends::invite))
        .route("/health/live", get(health::liveness))
        .route("/health/ready", get(health::readiness))
        .layer(DefaultBodyLimit::max(config.max_body_bytes))
        .with_state(state)
}
