use axum::{
    Json,
    extract::State,
    http::StatusCode,
    response::{IntoResponse, Response},
};
use herald_common::internal;

use crate::routes::AppState;

/// Liveness probe handler
///
/// Returns 200 OK if the process can answer at all.
pub(super) async fn liveness(State(state): State<AppState>) -> Response {
    if state.health.is_alive() {
        (StatusCode::OK, "OK").into_response()
    } else {
        (StatusCode::SERVICE_UNAVAILABLE, "Service Unavailable").into_response()
    }
}

/// Readiness probe handler
///
/// Returns 200 OK while every component is up and the orchestrator is
/// neither shutting down nor overloaded.
pub(super) async fn readiness(State(state): State<AppState>) -> Response {
    state.health.set_in_flight(state.orchestrator.in_flight());
    if !state.orchestrator.is_accepting() {
        state.health.set_orchestrator_ready(false);
    }

    if state.health.is_ready() {
        (StatusCode::OK, "OK").into_response()
    } else {
        let status = state.health.status();
        internal!(
            level = WARN,
            storage_ready = status.storage_ready,
            orchestrator_ready = status.orchestrator_ready,
            webhooks_ready = status.webhooks_ready,
            in_flight = status.in_flight,
            max_in_flight = status.max_in_flight,
            "Readiness probe failed"
        );
        (StatusCode::SERVICE_UNAVAILABLE, Json(status)).into_response()
    }
}
