//! Error types for the sync engine.

use lexis_storage::StorageError;
use lexis_sync_protocol::ProtocolError;
use thiserror::Error;

/// Result type for sync operations.
pub type SyncResult<T> = Result<T, SyncError>;

/// Errors that can occur during sync operations.
#[derive(Error, Debug)]
pub enum SyncError {
    /// No network is reachable. Never retried; the run stops.
    #[error("no network connectivity")]
    NoConnectivity,

    /// The remote API answered with a non-2xx status.
    #[error("api error: HTTP {status}")]
    Api {
        /// HTTP status code.
        status: u16,
        /// Response body, possibly truncated.
        body: String,
    },

    /// The remote API answered with a body that could not be decoded.
    #[error("malformed response: {0}")]
    Parse(String),

    /// The run was cancelled.
    #[error("sync cancelled")]
    Cancelled,

    /// Network or transport error below the HTTP layer.
    #[error("transport error: {message}")]
    Transport {
        /// Error message.
        message: String,
        /// Whether the operation can be retried.
        retryable: bool,
    },

    /// Local store error.
    #[error("storage error: {0}")]
    Storage(#[from] StorageError),

    /// Protocol encoding error.
    #[error("protocol error: {0}")]
    Protocol(#[from] ProtocolError),

    /// The store worker pool failed to run a task.
    #[error("worker pool error: {0}")]
    WorkerPool(String),

    /// A state the engine should never reach.
    #[error("unexpected sync failure: {0}")]
    Unexpected(String),
}

impl SyncError {
    /// Creates a retryable transport error.
    pub fn transport_retryable(message: impl Into<String>) -> Self {
        Self::Transport {
            message: message.into(),
            retryable: true,
        }
    }

    /// Creates a non-retryable transport error.
    pub fn transport_fatal(message: impl Into<String>) -> Self {
        Self::Transport {
            message: message.into(),
            retryable: false,
        }
    }

    /// Returns true if this error can be retried.
    pub fn is_retryable(&self) -> bool {
        match self {
            SyncError::Api { .. } => true,
            SyncError::Transport { retryable, .. } => *retryable,
            _ => false,
        }
    }

    /// Returns true if this error ends a run without counting as a failure.
    pub fn is_interruption(&self) -> bool {
        matches!(self, SyncError::NoConnectivity | SyncError::Cancelled)
    }
}
