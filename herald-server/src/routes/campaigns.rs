use axum::{
    Json,
    extract::{Path, State, rejection::JsonRejection},
    http::StatusCode,
};
use herald_common::{ids::BatchCorrelator, incoming};
use herald_delivery::{CampaignCancellation, CampaignDispatch, CampaignRequest};
use herald_tracking::CampaignStats;

use crate::{ApiError, routes::AppState};

fn correlator(raw: &str) -> Result<BatchCorrelator, ApiError> {
    raw.parse()
        .map_err(|e| ApiError::BadRequest(format!("Invalid campaign id {raw:?}: {e}")))
}

/// `POST /campaigns`
pub(super) async fn start(
    State(state): State<AppState>,
    payload: Result<Json<CampaignRequest>, JsonRejection>,
) -> Result<(StatusCode, Json<CampaignDispatch>), ApiError> {
    let Json(request) = payload?;
    incoming!(
        level = INFO,
        tenant = %request.tenant,
        recipients = request.recipients.len(),
        "Campaign requested"
    );

    let dispatch = state.orchestrator.start_campaign(request).await?;
    Ok((StatusCode::ACCEPTED, Json(dispatch)))
}

/// `DELETE /campaigns/{correlator}`
pub(super) async fn cancel(
    State(state): State<AppState>,
    Path(raw): Path<String>,
) -> Result<Json<CampaignCancellation>, ApiError> {
    let correlator = correlator(&raw)?;
    Ok(Json(state.orchestrator.cancel_campaign(&correlator).await?))
}

/// `GET /campaigns/{correlator}/stats`
pub(super) async fn stats(
    State(state): State<AppState>,
    Path(raw): Path<String>,
) -> Result<Json<CampaignStats>, ApiError> {
    let correlator = correlator(&raw)?;
    state
        .stats
        .stats(&correlator)
        .map(Json)
        .ok_or_else(|| ApiError::NotFound(format!("No activity for campaign {correlator}")))
}
