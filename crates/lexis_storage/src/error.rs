//! Error types for storage operations.

use lexis_sync_protocol::SyncStatus;
use std::io;
use thiserror::Error;

/// Result type for storage operations.
pub type StorageResult<T> = Result<T, StorageError>;

/// Errors that can occur during storage operations.
#[derive(Debug, Error)]
pub enum StorageError {
    /// An I/O error occurred.
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    /// The store snapshot could not be encoded.
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// No record with this uid exists.
    #[error("record not found: {0}")]
    NotFound(String),

    /// A record with this uid already exists.
    #[error("duplicate uid: {0}")]
    Duplicate(String),

    /// The requested status change is not allowed.
    #[error("invalid status transition for {uid}: {from} -> {to}")]
    InvalidTransition {
        /// Record uid.
        uid: String,
        /// Current status.
        from: SyncStatus,
        /// Requested status.
        to: SyncStatus,
    },

    /// Another process holds the store's lock file.
    #[error("store locked by another process: {0}")]
    Locked(String),

    /// The store file is corrupted.
    #[error("store corrupted: {0}")]
    Corrupted(String),
}
