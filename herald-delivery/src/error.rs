//! Typed errors for activities and workflows.
//!
//! Every failure is classified before it leaves an activity, so the retry
//! wrapper only ever has to ask [`ActivityError::is_retryable`].

use herald_common::ids::WorkflowId;
use herald_gateway::GatewayError;
use herald_store::StoreError;
use herald_tracking::SuppressionError;
use thiserror::Error;

use crate::activities::token::TokenError;

/// Failure of one activity invocation.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ActivityError {
    /// The input can never succeed. Fails the workflow immediately.
    #[error("Validation failed: {0}")]
    Validation(String),

    /// Temporary provider or network failure, retried with backoff.
    #[error("Transient failure: {0}")]
    Transient(String),

    /// The provider refused the message for good.
    #[error("Provider rejected message: {0}")]
    Terminal(String),

    /// Storage or runtime failure inside herald itself. Retried.
    #[error("System error: {0}")]
    System(String),

    /// Provider attempts were used up before a restart.
    #[error("Gave up after {attempts} attempts")]
    Exhausted { attempts: u32 },
}

impl ActivityError {
    #[must_use]
    pub const fn is_retryable(&self) -> bool {
        matches!(self, Self::Transient(_) | Self::System(_))
    }

    #[must_use]
    pub const fn kind(&self) -> &'static str {
        match self {
            Self::Validation(_) => "validation",
            Self::Transient(_) => "transient",
            Self::Terminal(_) => "terminal",
            Self::System(_) => "system",
            Self::Exhausted { .. } => "exhausted",
        }
    }
}

impl From<GatewayError> for ActivityError {
    fn from(err: GatewayError) -> Self {
        match err {
            GatewayError::Validation(reason) => Self::Validation(reason),
            GatewayError::Transient(reason) => Self::Transient(reason),
            GatewayError::Terminal(reason) => Self::Terminal(reason),
        }
    }
}

impl From<StoreError> for ActivityError {
    fn from(err: StoreError) -> Self {
        Self::System(err.to_string())
    }
}

impl From<SuppressionError> for ActivityError {
    fn from(err: SuppressionError) -> Self {
        if err.is_invalid_address() {
            Self::Validation(err.to_string())
        } else {
            Self::System(err.to_string())
        }
    }
}

impl From<TokenError> for ActivityError {
    fn from(err: TokenError) -> Self {
        match err {
            TokenError::InvalidKey => Self::System(err.to_string()),
            other => Self::Validation(other.to_string()),
        }
    }
}

/// Failure of an orchestrator operation. Send failures are never reported
/// here; they end up in the workflow's result.
#[derive(Debug, Error)]
pub enum WorkflowError {
    #[error("Invalid request: {0}")]
    Validation(String),

    #[error("Workflow {0} not found")]
    NotFound(WorkflowId),

    /// The orchestrator has stopped taking new work.
    #[error("Orchestrator is shutting down")]
    ShuttingDown,

    #[error("Workflow store error: {0}")]
    Store(#[from] StoreError),
}

impl WorkflowError {
    #[must_use]
    pub const fn is_validation(&self) -> bool {
        matches!(self, Self::Validation(_))
    }

    #[must_use]
    pub const fn is_not_found(&self) -> bool {
        matches!(self, Self::NotFound(_))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_gateway_errors_keep_their_class() {
        let err = ActivityError::from(GatewayError::Transient("503".to_string()));
        assert!(err.is_retryable());
        assert_eq!(err.kind(), "transient");

        let err = ActivityError::from(GatewayError::Terminal("422".to_string()));
        assert!(!err.is_retryable());

        let err = ActivityError::from(GatewayError::Validation("empty subject".to_string()));
        assert!(matches!(err, ActivityError::Validation(_)));
    }

    #[test]
    fn test_store_errors_are_retryable() {
        let err = ActivityError::from(StoreError::Internal("lock poisoned".to_string()));
        assert!(err.is_retryable());
        assert_eq!(err.kind(), "system");
    }

    #[test]
    fn test_exhausted_is_final() {
        let err = ActivityError::Exhausted { attempts: 3 };
        assert!(!err.is_retryable());
        assert_eq!(err.kind(), "exhausted");
        assert_eq!(err.to_string(), "Gave up after 3 attempts");
    }

    #[test]
    fn test_token_errors() {
        assert!(ActivityError::from(TokenError::InvalidKey).is_retryable());
        assert!(!ActivityError::from(TokenError::Expired).is_retryable());
    }
}
