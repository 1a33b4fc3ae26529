use herald_common::address::AddressError;
use herald_store::StoreError;
use thiserror::Error;

/// Why a webhook callback was refused before normalization.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum AuthError {
    #[error("No webhook secret configured for provider {0}")]
    UnknownProvider(String),

    #[error("Missing {0} header")]
    MissingHeader(&'static str),

    #[error("Invalid webhook timestamp {0:?}")]
    InvalidTimestamp(String),

    #[error("Webhook timestamp is {skew_secs}s away from now")]
    TimestampOutOfTolerance { skew_secs: i64 },

    #[error("No matching signature")]
    InvalidSignature,

    #[error("Unusable webhook secret")]
    InvalidKey,
}

/// The payload could not be read as an engagement event.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum NormalizeError {
    #[error("Body is not valid JSON: {0}")]
    Json(String),

    #[error("Payload is not a JSON object")]
    NotAnObject,

    #[error("Payload has no event type")]
    MissingEventType,

    #[error("{0} event has no recipient")]
    MissingRecipient(String),
}

#[derive(Debug, Error)]
pub enum IngestError {
    #[error("Webhook rejected: {0}")]
    Auth(#[from] AuthError),

    #[error("Unreadable webhook: {0}")]
    Parse(#[from] NormalizeError),

    #[error(transparent)]
    Suppression(#[from] SuppressionError),

    #[error("Storage error: {0}")]
    Store(#[from] StoreError),
}

impl IngestError {
    pub const fn is_auth(&self) -> bool {
        matches!(self, Self::Auth(_))
    }

    pub const fn is_parse(&self) -> bool {
        matches!(self, Self::Parse(_))
    }
}

#[derive(Debug, Error)]
pub enum SuppressionError {
    #[error("Invalid address: {0}")]
    InvalidAddress(#[from] AddressError),

    #[error("Suppression storage error: {0}")]
    Store(#[from] StoreError),
}

impl SuppressionError {
    pub const fn is_invalid_address(&self) -> bool {
        matches!(self, Self::InvalidAddress(_))
    }
}
