//! # Lexis Sync Engine
//!
//! Offline-first synchronization of local records with a remote REST API.
//!
//! This crate provides:
//! - Push: upload of locally changed records, one at a time, with
//!   per-record status bookkeeping and bounded exponential-backoff retries
//! - Pull: cursor-based paging of remote changes with pacing, a time
//!   budget and last-write-wins merging
//! - A coordinator that owns job lifecycles, cancellation and triggers
//! - HTTP transport abstraction with a `reqwest` client and a loopback
//!   client for in-process servers
//! - A bounded worker pool for blocking local stores
//!
//! ## Architecture
//!
//! ```text
//! SyncCoordinator ──► PushEngine ──► RetryPolicy ──► SyncTransport
//!        │        └─► PullEngine ──┘                     │
//!        │                 │                        HttpTransport<C>
//!        ▼                 ▼                             │
//!   SyncEvent        LocalStore (PooledStore / DirectStore)
//! ```
//!
//! ## Key Invariants
//!
//! - At most one run per job kind is active; a new start cancels and
//!   awaits the previous one
//! - Cancellation is cooperative and checked between records, pages and
//!   retry attempts; in-flight requests are never torn down
//! - A record is never left IN_PROGRESS after a push run ends
//! - The pull cursor only advances after the page was stored locally
//! - Every run emits exactly one terminal event

#![deny(unsafe_code)]
#![warn(missing_docs)]

mod cancel;
mod config;
mod connectivity;
mod coordinator;
mod error;
mod http;
mod pull;
mod push;
mod retry;
mod store;
mod transport;

pub use cancel::CancelFlag;
pub use config::{RetryConfig, SyncConfig};
pub use connectivity::{AlwaysOnline, Connectivity, ConnectivityFlag};
pub use coordinator::{
    JobKind, JobReport, JobState, RunHandle, SyncCoordinator, SyncEvent, SyncStats,
};
pub use error::{SyncError, SyncResult};
pub use http::{
    HttpClient, HttpMethod, HttpRequest, HttpResponse, HttpTransport, LoopbackClient,
    LoopbackServer, ReqwestClient, API_KEY_HEADER, SECRET_KEY_HEADER,
};
pub use pull::{PullEngine, PullExit, PullReport};
pub use push::{PushEngine, PushReport, PushStop};
pub use retry::{RetryOutcome, RetryPolicy};
pub use store::{DirectStore, LocalStore, PooledStore};
pub use transport::{MockReply, MockTransport, SyncTransport};
