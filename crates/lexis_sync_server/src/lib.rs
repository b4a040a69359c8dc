//! # Lexis Sync Server
//!
//! Reference implementation of the Lexis sync REST API.
//!
//! This crate provides:
//! - `PUT /api/v2/{resource}/{uid}`: create or replace one record
//! - `GET /api/v2/{resource}/pull?since=&last_id=`: paginated changes
//! - API-key authentication via the `x-api-key` and `x-secret-key` headers
//! - Failure injection for exercising client retries
//!
//! # Architecture
//!
//! The server is transport-agnostic: [`SyncServer::handle_http`] takes the
//! method, path, headers and body of a request and returns the status and
//! body of the response. Tests route the engine's HTTP transport into it
//! in-process.
//!
//! Records are kept per stream, keyed by uid and ordered by
//! `(updatedAt, uid)`, which is the order pull pages are served in.
//!
//! ```
//! use lexis_sync_server::{ServerConfig, SyncServer};
//!
//! let server = SyncServer::new(ServerConfig::default());
//! let reply = server.handle_http("GET", "/api/v2/word/pull?since=0&last_id=", &[], &[]);
//! assert_eq!(reply.status, 200);
//! ```

#![deny(unsafe_code)]
#![warn(missing_docs)]
#![warn(clippy::unwrap_used, clippy::expect_used, clippy::panic)]

mod auth;
mod config;
mod error;
mod handler;
mod records;
mod server;

pub use auth::ApiKeyAuth;
pub use config::ServerConfig;
pub use error::{ServerError, ServerResult};
pub use handler::RequestHandler;
pub use records::RecordLog;
pub use server::{HttpReply, SyncServer};
