use axum::{
    Json,
    body::Bytes,
    extract::{Path, State},
    http::HeaderMap,
};
use chrono::Utc;
use herald_tracking::{
    IngestOutcome, WebhookRequest,
    signature::{EVENT_ID_HEADER, SIGNATURE_HEADER, TIMESTAMP_HEADER},
};
use serde::Serialize;

use crate::{ApiError, routes::AppState};

#[derive(Debug, Serialize)]
pub struct WebhookResponse {
    pub status: IngestOutcome,
}

/// `POST /webhooks/{provider}`
///
/// The body is taken raw: the signature covers the exact bytes sent.
pub(super) async fn receive(
    State(state): State<AppState>,
    Path(provider): Path<String>,
    headers: HeaderMap,
    body: Bytes,
) -> Result<Json<WebhookResponse>, ApiError> {
    let header = |name: &str| headers.get(name).and_then(|value| value.to_str().ok());

    let status = state
        .ingestion
        .ingest(
            WebhookRequest {
                provider: &provider,
                timestamp: header(TIMESTAMP_HEADER),
                signature: header(SIGNATURE_HEADER),
                event_id: header(EVENT_ID_HEADER),
                body: &body,
            },
            Utc::now(),
        )
        .await?;

    Ok(Json(WebhookResponse { status }))
}
