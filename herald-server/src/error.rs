//! Server and API error types

use axum::{
    Json,
    extract::rejection::JsonRejection,
    http::StatusCode,
    response::{IntoResponse, Response},
};
use herald_common::internal;
use herald_delivery::WorkflowError;
use herald_store::StoreError;
use herald_tracking::{IngestError, SuppressionError};
use serde_json::json;
use thiserror::Error;

/// Errors that stop the server itself
#[derive(Debug, Error)]
pub enum ServerError {
    /// Failed to bind to the specified address
    #[error("Failed to bind server to {address}: {source}")]
    BindError {
        address: String,
        source: std::io::Error,
    },

    #[error("Server error: {0}")]
    ServerError(String),
}

/// An error answered to an API caller
#[derive(Debug, Error)]
pub enum ApiError {
    #[error("{0}")]
    BadRequest(String),

    #[error("{0}")]
    Unauthorized(String),

    #[error("{0}")]
    NotFound(String),

    #[error("{0}")]
    Unavailable(String),

    #[error("{0}")]
    Internal(String),
}

impl ApiError {
    pub const fn status(&self) -> StatusCode {
        match self {
            Self::BadRequest(_) => StatusCode::BAD_REQUEST,
            Self::Unauthorized(_) => StatusCode::UNAUTHORIZED,
            Self::NotFound(_) => StatusCode::NOT_FOUND,
            Self::Unavailable(_) => StatusCode::SERVICE_UNAVAILABLE,
            Self::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status();
        if status.is_server_error() {
            internal!(level = ERROR, status = status.as_u16(), error = %self, "Request failed");
        }

        (status, Json(json!({ "error": self.to_string() }))).into_response()
    }
}

impl From<StoreError> for ApiError {
    fn from(err: StoreError) -> Self {
        if err.is_unavailable() {
            Self::Unavailable(err.to_string())
        } else {
            Self::Internal(err.to_string())
        }
    }
}

impl From<WorkflowError> for ApiError {
    fn from(err: WorkflowError) -> Self {
        match err {
            WorkflowError::Validation(reason) => Self::BadRequest(reason),
            WorkflowError::NotFound(id) => Self::NotFound(format!("No send with id {id}")),
            WorkflowError::ShuttingDown => {
                Self::Unavailable("Orchestrator is shutting down".to_string())
            }
            WorkflowError::Store(e) => e.into(),
        }
    }
}

impl From<IngestError> for ApiError {
    fn from(err: IngestError) -> Self {
        match err {
            IngestError::Auth(e) => Self::Unauthorized(e.to_string()),
            IngestError::Parse(e) => Self::BadRequest(e.to_string()),
            IngestError::Suppression(e) => e.into(),
            IngestError::Store(e) => e.into(),
        }
    }
}

impl From<SuppressionError> for ApiError {
    fn from(err: SuppressionError) -> Self {
        match err {
            SuppressionError::InvalidAddress(e) => Self::BadRequest(format!("Invalid address: {e}")),
            SuppressionError::Store(e) => e.into(),
        }
    }
}

impl From<JsonRejection> for ApiError {
    fn from(rejection: JsonRejection) -> Self {
        Self::BadRequest(rejection.body_text())
    }
}
