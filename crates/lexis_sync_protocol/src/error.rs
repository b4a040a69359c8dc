//! Error types for protocol operations.

use thiserror::Error;

/// Result type for protocol operations.
pub type ProtocolResult<T> = Result<T, ProtocolError>;

/// Errors that can occur while building or interpreting protocol values.
#[derive(Debug, Error)]
pub enum ProtocolError {
    /// JSON could not be encoded or decoded.
    #[error("json error: {0}")]
    Json(#[from] serde_json::Error),

    /// A sync status string is not one of the known values.
    #[error("unknown sync status: {0}")]
    UnknownStatus(String),

    /// A sync stream name is not one of the known values.
    #[error("unknown sync stream: {0}")]
    UnknownStream(String),

    /// A merge policy name is not one of the known values.
    #[error("unknown merge policy: {0}")]
    UnknownPolicy(String),

    /// A record payload does not describe the expected entity.
    #[error("invalid payload: {0}")]
    InvalidPayload(String),
}
