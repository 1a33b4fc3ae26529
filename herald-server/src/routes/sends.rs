use axum::{
    Json,
    extract::{Path, State, rejection::JsonRejection},
    http::StatusCode,
};
use chrono::{DateTime, Utc};
use herald_common::{
    ids::{RunId, SendId},
    incoming,
    send::SendRequest,
    workflow::{WorkflowResult, WorkflowState},
};
use herald_delivery::{CancelOutcome, InvitationRequest, WorkflowHandle};
use serde::Serialize;

use crate::{ApiError, routes::AppState};

/// Where a send is, as reported to callers.
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SendStatus {
    pub workflow_id: SendId,
    pub run_id: RunId,
    pub state: WorkflowState,
    pub attempts: u32,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub result: Option<WorkflowResult>,
}

/// `POST /sends`
pub(super) async fn start(
    State(state): State<AppState>,
    payload: Result<Json<SendRequest>, JsonRejection>,
) -> Result<(StatusCode, Json<WorkflowHandle>), ApiError> {
    let Json(request) = payload?;
    incoming!(level = INFO, send_id = %request.id, "Send requested");

    let handle = state.orchestrator.start_send(request).await?;
    Ok((StatusCode::ACCEPTED, Json(handle)))
}

/// `POST /invitations`
pub(super) async fn invite(
    State(state): State<AppState>,
    payload: Result<Json<InvitationRequest>, JsonRejection>,
) -> Result<(StatusCode, Json<WorkflowHandle>), ApiError> {
    let Json(request) = payload?;
    incoming!(level = INFO, send_id = %request.id, "Invitation requested");

    let handle = state.orchestrator.start_invitation(request).await?;
    Ok((StatusCode::ACCEPTED, Json(handle)))
}

/// `GET /sends/{id}`
pub(super) async fn status(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<Json<SendStatus>, ApiError> {
    let record = state.orchestrator.get(&SendId::new(id)).await?;

    Ok(Json(SendStatus {
        workflow_id: record.id,
        run_id: record.run_id,
        state: record.state,
        attempts: record.attempts,
        created_at: record.created_at,
        updated_at: record.updated_at,
        result: record.result,
    }))
}

/// `DELETE /sends/{id}`
pub(super) async fn cancel(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<(StatusCode, Json<CancelOutcome>), ApiError> {
    let outcome = state.orchestrator.cancel(&SendId::new(id)).await?;
    let status = match outcome {
        CancelOutcome::NotFound => StatusCode::NOT_FOUND,
        CancelOutcome::NotCancellable { .. } => StatusCode::CONFLICT,
        CancelOutcome::Cancelled | CancelOutcome::AlreadyCancelled => StatusCode::OK,
    };

    Ok((status, Json(outcome)))
}
