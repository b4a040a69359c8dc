//! Request handlers for the sync endpoints.

use crate::config::ServerConfig;
use crate::error::{ServerError, ServerResult};
use crate::records::RecordLog;
use lexis_sync_protocol::{ProtocolError, PullPage, PullQuery, SyncRecord, SyncStream};
use std::sync::Arc;
use tracing::debug;

/// Handler for decoded sync requests.
pub struct RequestHandler {
    config: ServerConfig,
    records: Arc<RecordLog>,
}

impl RequestHandler {
    /// Creates a handler over a shared record log.
    pub fn new(config: ServerConfig, records: Arc<RecordLog>) -> Self {
        Self { config, records }
    }

    /// Handles `PUT /{resource}/{uid}`. Returns true if the record was new.
    ///
    /// A body without a uid takes the one from the path.
    ///
    /// # Errors
    ///
    /// Fails if the body is not a record or its uid differs from the path.
    pub fn handle_put(&self, stream: SyncStream, uid: &str, body: &[u8]) -> ServerResult<bool> {
        let mut record: SyncRecord = serde_json::from_slice(body).map_err(ProtocolError::from)?;
        if record.uid.is_empty() {
            record.uid = uid.to_string();
        }
        if record.uid != uid {
            return Err(ServerError::InvalidRequest(format!(
                "uid mismatch: path {uid}, body {}",
                record.uid
            )));
        }

        let created = self.records.put(stream, record);
        debug!(%stream, uid, created, "record stored");
        Ok(created)
    }

    /// Handles `GET /{resource}/pull`.
    pub fn handle_pull(&self, stream: SyncStream, query: &PullQuery) -> PullPage {
        let (data, has_more) = self
            .records
            .page(stream, query, self.config.max_pull_batch);
        debug!(%stream, since = query.since, returned = data.len(), has_more, "pull served");
        PullPage::ok(data, has_more)
    }
}
