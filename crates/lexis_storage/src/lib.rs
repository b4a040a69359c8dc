//! # Lexis Storage
//!
//! Local stores consumed by the Lexis sync engine.
//!
//! The sync engine treats the local store as an external collaborator with
//! a small contract: read records that still need uploading, write push
//! bookkeeping, upsert pulled records, and persist a cursor per stream.
//! The application mutates records through the same store.
//!
//! ## Design Principles
//!
//! - Each [`SyncStream`](lexis_sync_protocol::SyncStream) has its own
//!   table and cursor; no operation crosses streams
//! - Records are keyed by `uid` within a stream; the local `id` is assigned
//!   on first insert and never changes afterwards
//! - Status writes are per-record atomic and validated against the
//!   [`SyncStatus`](lexis_sync_protocol::SyncStatus) state machine
//! - Status writes are skipped when the record was edited after the
//!   caller observed it
//! - Upserts are idempotent by `uid`
//! - Must be `Send + Sync`; all methods take `&self`
//!
//! ## Available Stores
//!
//! - [`InMemoryStore`] - For testing and ephemeral use
//! - [`FileStore`] - Durable JSON snapshot on disk
//!
//! ## Example
//!
//! ```rust
//! use lexis_storage::{InMemoryStore, RecordStore};
//! use lexis_sync_protocol::{SyncStream, Word};
//!
//! let store = InMemoryStore::new();
//! let record = store
//!     .insert(SyncStream::Words, Word::new("sonder").into_record().unwrap())
//!     .unwrap();
//! assert_eq!(record.id, 1);
//! assert_eq!(store.pending_count(SyncStream::Words).unwrap(), 1);
//! assert_eq!(store.pending_count(SyncStream::Categories).unwrap(), 0);
//! ```

#![deny(unsafe_code)]
#![warn(missing_docs)]

mod error;
mod file;
mod memory;
mod store;
mod table;

pub use error::{StorageError, StorageResult};
pub use file::FileStore;
pub use memory::InMemoryStore;
pub use store::{CursorStore, RecordStore, StatusUpdate, UpsertOutcome};
