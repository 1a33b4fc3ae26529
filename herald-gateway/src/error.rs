//! Gateway error classification
//!
//! Every failure leaving the gateway is one of three kinds, which is all the
//! caller needs to decide between failing fast and retrying.

use thiserror::Error;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum GatewayError {
    /// The request itself is unusable. Retrying cannot help.
    #[error("Invalid send request: {0}")]
    Validation(String),

    /// Temporary provider or network failure
    #[error("Transient provider failure: {0}")]
    Transient(String),

    /// The provider refused the message for good
    #[error("Provider rejected message: {0}")]
    Terminal(String),
}

impl GatewayError {
    #[must_use]
    pub const fn is_retryable(&self) -> bool {
        matches!(self, Self::Transient(_))
    }

    #[must_use]
    pub const fn kind(&self) -> &'static str {
        match self {
            Self::Validation(_) => "validation",
            Self::Transient(_) => "transient",
            Self::Terminal(_) => "terminal",
        }
    }
}

impl From<reqwest::Error> for GatewayError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_builder() {
            Self::Terminal(err.to_string())
        } else {
            // Connect, timeout and body errors can all succeed on a second try
            Self::Transient(err.to_string())
        }
    }
}
