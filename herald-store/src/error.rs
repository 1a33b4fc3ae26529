//! Error types for the herald-store crate.

use std::io;

use thiserror::Error;

/// Top-level store error type.
#[derive(Debug, Error)]
pub enum StoreError {
    /// I/O operation failed (file read/write/rename).
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] SerializationError),

    #[error("Record not found: {0}")]
    NotFound(String),

    /// Storage path validation failed.
    #[error("Invalid storage path {path}: {reason}")]
    InvalidPath { path: String, reason: String },

    #[error("Internal error: {0}")]
    Internal(String),
}

impl StoreError {
    /// Returns `true` if the store itself could not be reached or written,
    /// as opposed to a missing record.
    #[must_use]
    pub const fn is_unavailable(&self) -> bool {
        matches!(self, Self::Io(_) | Self::Internal(_))
    }
}

#[derive(Debug, Error)]
pub enum SerializationError {
    #[error("Bincode encode error: {0}")]
    Encode(#[from] bincode::error::EncodeError),

    #[error("Bincode decode error: {0}")]
    Decode(#[from] bincode::error::DecodeError),

    /// A stored file name did not decode to a key.
    #[error("Invalid record file name: {0}")]
    InvalidFileName(String),
}

pub type Result<T> = std::result::Result<T, StoreError>;
