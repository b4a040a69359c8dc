//! Main sync server.

use crate::auth::ApiKeyAuth;
use crate::config::ServerConfig;
use crate::error::{ServerError, ServerResult};
use crate::handler::RequestHandler;
use crate::records::RecordLog;
use lexis_sync_protocol::{PullQuery, SyncStream};
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;
use tracing::{debug, warn};

const API_PREFIX: &str = "/api/v2/";

/// Status and body of a response.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HttpReply {
    /// HTTP status code.
    pub status: u16,
    /// JSON body.
    pub body: Vec<u8>,
}

impl HttpReply {
    fn json(status: u16, value: serde_json::Value) -> Self {
        Self {
            status,
            body: value.to_string().into_bytes(),
        }
    }
}

/// The sync server.
///
/// # Example
///
/// ```
/// use lexis_sync_server::{ServerConfig, SyncServer};
///
/// let server = SyncServer::new(ServerConfig::default().with_credentials("k", "s"));
///
/// let reply = server.handle_http("GET", "/api/v2/word/pull?since=0", &[], &[]);
/// assert_eq!(reply.status, 401);
/// ```
pub struct SyncServer {
    handler: RequestHandler,
    records: Arc<RecordLog>,
    auth: ApiKeyAuth,
    failures: AtomicU32,
}

impl SyncServer {
    /// Creates a new sync server.
    pub fn new(config: ServerConfig) -> Self {
        Self::with_records(config, Arc::new(RecordLog::new()))
    }

    /// Creates a sync server over an existing record log.
    pub fn with_records(config: ServerConfig, records: Arc<RecordLog>) -> Self {
        let auth = ApiKeyAuth::from_config(&config);
        let handler = RequestHandler::new(config, Arc::clone(&records));
        Self {
            handler,
            records,
            auth,
            failures: AtomicU32::new(0),
        }
    }

    /// Makes the next `count` requests fail with 503.
    pub fn inject_failures(&self, count: u32) {
        self.failures.store(count, Ordering::SeqCst);
    }

    /// Returns the record log.
    pub fn records(&self) -> &Arc<RecordLog> {
        &self.records
    }

    /// Returns the number of records stored for `stream`.
    pub fn record_count(&self, stream: SyncStream) -> usize {
        self.records.len(stream)
    }

    /// Handles one HTTP request.
    ///
    /// `path_and_query` is the request target, e.g.
    /// `/api/v2/word/pull?since=0&last_id=`. Errors are answered with the
    /// matching status and a `{"status": "failed", "error": ...}` body.
    pub fn handle_http(
        &self,
        method: &str,
        path_and_query: &str,
        headers: &[(String, String)],
        body: &[u8],
    ) -> HttpReply {
        match self.dispatch(method, path_and_query, headers, body) {
            Ok(reply) => reply,
            Err(e) => {
                if e.is_server_error() {
                    warn!(method, path_and_query, error = %e, "request failed");
                } else {
                    debug!(method, path_and_query, error = %e, "request rejected");
                }
                HttpReply::json(
                    e.status_code(),
                    serde_json::json!({ "status": "failed", "error": e.to_string() }),
                )
            }
        }
    }

    fn dispatch(
        &self,
        method: &str,
        path_and_query: &str,
        headers: &[(String, String)],
        body: &[u8],
    ) -> ServerResult<HttpReply> {
        self.take_injected_failure()?;
        self.auth.validate(headers)?;

        let (path, query) = path_and_query
            .split_once('?')
            .unwrap_or((path_and_query, ""));
        let not_found = || ServerError::NotFound(path.to_string());
        let (resource, tail) = path
            .strip_prefix(API_PREFIX)
            .and_then(|rest| rest.split_once('/'))
            .ok_or_else(not_found)?;
        if tail.is_empty() || tail.contains('/') {
            return Err(not_found());
        }
        let stream = SyncStream::from_resource(resource).ok_or_else(not_found)?;

        match (method, tail) {
            ("GET", "pull") => {
                let page = self.handler.handle_pull(stream, &PullQuery::parse(query));
                Ok(HttpReply {
                    status: 200,
                    body: page.encode()?,
                })
            }
            ("PUT", uid) if uid != "pull" => {
                let created = self.handler.handle_put(stream, uid, body)?;
                Ok(HttpReply::json(
                    if created { 201 } else { 200 },
                    serde_json::json!({ "status": "success" }),
                ))
            }
            _ => Err(ServerError::MethodNotAllowed(format!("{method} {path}"))),
        }
    }

    fn take_injected_failure(&self) -> ServerResult<()> {
        let injected = self
            .failures
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok();
        if injected {
            Err(ServerError::InjectedFailure)
        } else {
            Ok(())
        }
    }
}
