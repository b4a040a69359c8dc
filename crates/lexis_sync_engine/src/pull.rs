//! Paginated download of remote changes.

use crate::cancel::CancelFlag;
use crate::config::SyncConfig;
use crate::connectivity::Connectivity;
use crate::error::{SyncError, SyncResult};
use crate::retry::RetryPolicy;
use crate::store::LocalStore;
use crate::transport::SyncTransport;
use lexis_sync_protocol::{MergePolicy, PullQuery, SyncCursor, SyncStream};
use std::sync::Arc;
use std::time::Duration;
use tokio::time::Instant;
use tracing::{debug, info, instrument, warn};

/// Why a pull run stopped.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum PullExit {
    /// The server reported no more pages.
    #[default]
    EndOfStream,
    /// The wall-clock budget ran out; the rest is fetched next run.
    TimeBudget,
    /// A response could not be decoded and was treated as an empty last page.
    MalformedPage,
    /// The run was cancelled.
    Cancelled,
    /// Connectivity was lost or absent.
    Offline,
    /// The server kept failing after all retries.
    ApiFailure,
}

impl PullExit {
    /// Returns true if the run ended on its own terms, without interruption
    /// or failure.
    pub fn is_complete(&self) -> bool {
        matches!(
            self,
            PullExit::EndOfStream | PullExit::TimeBudget | PullExit::MalformedPage
        )
    }
}

/// Summary of one pull run.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PullReport {
    /// Pages received, including empty ones.
    pub pages: usize,
    /// Records received.
    pub received: usize,
    /// Records written to the store.
    pub applied: usize,
    /// Records left alone by the merge policy.
    pub skipped: usize,
    /// Failed fetch attempts across all pages.
    pub failed_attempts: u32,
    /// Cursor after the run.
    pub cursor: SyncCursor,
    /// Why the run stopped.
    pub exit: PullExit,
    /// Last error when the run stopped on [`PullExit::ApiFailure`].
    pub error: Option<String>,
}

/// Fetches pages of remote changes since the stream's cursor and applies
/// them locally.
///
/// Each non-empty page is upserted first and the cursor is advanced to its
/// last record afterwards, so a crash in between re-fetches the page on the
/// next run instead of skipping it. Pages are paced by a fixed delay and the
/// whole run is bounded by a wall-clock budget measured from its start.
pub struct PullEngine {
    stream: SyncStream,
    retry: RetryPolicy,
    merge_policy: MergePolicy,
    page_delay: Duration,
    time_budget: Duration,
    store: Arc<dyn LocalStore>,
    transport: Arc<dyn SyncTransport>,
    connectivity: Arc<dyn Connectivity>,
}

impl PullEngine {
    /// Creates a pull engine for the stream in `config`.
    pub fn new(
        config: &SyncConfig,
        store: Arc<dyn LocalStore>,
        transport: Arc<dyn SyncTransport>,
        connectivity: Arc<dyn Connectivity>,
    ) -> Self {
        Self {
            stream: config.stream,
            retry: RetryPolicy::new(config.pull_retry.clone()),
            merge_policy: config.merge_policy,
            page_delay: config.pull_page_delay,
            time_budget: config.pull_time_budget,
            store,
            transport,
            connectivity,
        }
    }

    /// Runs one pull session.
    ///
    /// # Errors
    ///
    /// Returns an error only if the local store fails. Remote failures end
    /// the run with the matching [`PullExit`].
    #[instrument(skip_all, fields(stream = %self.stream))]
    pub async fn run(&self, cancel: &CancelFlag) -> SyncResult<PullReport> {
        let started = Instant::now();
        let mut report = PullReport::default();

        if cancel.is_cancelled() {
            report.exit = PullExit::Cancelled;
            return Ok(report);
        }
        if !self.connectivity.is_connected().await {
            info!("offline, skipping pull");
            report.exit = PullExit::Offline;
            return Ok(report);
        }

        let mut cursor = self.store.cursor(self.stream).await?;
        debug!(since = cursor.last_sync_time, last_id = ?cursor.last_id, "pull started");

        report.exit = loop {
            if cancel.is_cancelled() {
                break PullExit::Cancelled;
            }
            if started.elapsed() >= self.time_budget {
                info!(pages = report.pages, "pull time budget exhausted");
                break PullExit::TimeBudget;
            }

            let query = PullQuery::from_cursor(&cursor);
            let outcome = self
                .retry
                .execute(cancel, self.connectivity.as_ref(), |_| {
                    self.transport.pull_page(self.stream, &query)
                })
                .await;
            report.failed_attempts += outcome.failures;

            let page = match outcome.result {
                Ok(page) => page,
                Err(SyncError::Parse(message)) => {
                    warn!(error = %message, "malformed pull response, treating as last page");
                    report.pages += 1;
                    break PullExit::MalformedPage;
                }
                Err(SyncError::Cancelled) => break PullExit::Cancelled,
                Err(SyncError::NoConnectivity) => break PullExit::Offline,
                Err(e) => {
                    warn!(error = %e, "pull failed");
                    report.error = Some(e.to_string());
                    break PullExit::ApiFailure;
                }
            };

            report.pages += 1;
            report.received += page.data.len();
            let last = page.is_last();

            if let Some(next) = SyncCursor::after_page(&page.data) {
                let upserted = self
                    .store
                    .upsert_records(self.stream, page.data, self.merge_policy)
                    .await?;
                report.applied += upserted.applied();
                report.skipped += upserted.skipped;

                self.store.set_cursor(self.stream, next.clone()).await?;
                debug!(since = next.last_sync_time, last_id = ?next.last_id, "cursor advanced");
                cursor = next;
            }

            if last {
                break PullExit::EndOfStream;
            }
            tokio::time::sleep(self.page_delay).await;
        };

        report.cursor = cursor;
        info!(
            pages = report.pages,
            applied = report.applied,
            exit = ?report.exit,
            "pull finished"
        );
        Ok(report)
    }
}
