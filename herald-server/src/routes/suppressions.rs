use axum::{
    Json,
    extract::{Path, State, rejection::JsonRejection},
    http::StatusCode,
};
use herald_common::{
    incoming,
    suppression::{Classification, SuppressionEntry},
};
use serde::{Deserialize, Serialize};

use crate::{ApiError, routes::AppState};

#[derive(Debug, Serialize, Deserialize)]
pub struct SuppressionList {
    pub count: usize,
    pub entries: Vec<SuppressionEntry>,
}

#[derive(Debug, Deserialize)]
pub struct SuppressionRequest {
    pub email: String,
    #[serde(default)]
    pub classification: Option<Classification>,
    #[serde(default)]
    pub reason: Option<String>,
}

/// `GET /suppressions`
pub(super) async fn list(State(state): State<AppState>) -> Result<Json<SuppressionList>, ApiError> {
    let entries = state.suppressions.list().await?;
    Ok(Json(SuppressionList {
        count: entries.len(),
        entries,
    }))
}

/// `POST /suppressions`
pub(super) async fn add(
    State(state): State<AppState>,
    payload: Result<Json<SuppressionRequest>, JsonRejection>,
) -> Result<(StatusCode, Json<SuppressionEntry>), ApiError> {
    let Json(request) = payload?;
    incoming!(
        level = INFO,
        classification = ?request.classification,
        "Manual suppression requested"
    );

    let entry = state
        .suppressions
        .add_manual(&request.email, request.classification, request.reason)
        .await?;

    Ok((StatusCode::CREATED, Json(entry)))
}

/// `DELETE /suppressions/{email}`
pub(super) async fn lift(
    State(state): State<AppState>,
    Path(email): Path<String>,
) -> Result<Json<SuppressionEntry>, ApiError> {
    state
        .suppressions
        .deactivate(&email)
        .await?
        .map(Json)
        .ok_or_else(|| ApiError::NotFound("Address is not suppressed".to_string()))
}
