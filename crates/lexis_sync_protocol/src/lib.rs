//! # Lexis Sync Protocol
//!
//! Wire and data types shared by the Lexis sync engine, its local stores and
//! the reference sync server.
//!
//! This crate provides:
//! - [`SyncRecord`], the generic synchronizable entity, and its [`SyncStatus`]
//!   state machine
//! - [`Word`], the typed vocabulary payload carried inside a record
//! - [`SyncStream`] and [`SyncCursor`] for per-stream pull watermarks
//! - [`PullQuery`] and [`PullPage`], the pull request/response shapes
//! - [`MergePolicy`] for applying pulled records over local ones
//!
//! This is a pure protocol crate with no I/O operations.
//!
//! ## Wire Format
//!
//! Records travel as JSON objects in camelCase. Sync bookkeeping fields
//! (`uid`, `createdAt`, `updatedAt`, `syncStatus`, `retryCount`,
//! `lastSyncAttempt`) sit next to the payload fields in the same object:
//!
//! ```json
//! { "uid": "…", "createdAt": 1, "updatedAt": 2, "syncStatus": "PENDING",
//!   "retryCount": 0, "word": "ephemeral", "type": "word" }
//! ```

#![deny(unsafe_code)]
#![warn(missing_docs)]

mod cursor;
mod error;
mod merge;
mod messages;
mod record;
mod word;

pub use cursor::{SyncCursor, SyncStream};
pub use error::{ProtocolError, ProtocolResult};
pub use merge::MergePolicy;
pub use messages::{PullPage, PullQuery, API_KEY_HEADER, SECRET_KEY_HEADER};
pub use record::{now_millis, Payload, SyncRecord, SyncStatus};
pub use word::Word;
