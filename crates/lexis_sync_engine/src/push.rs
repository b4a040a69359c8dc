//! Upload of locally pending records.

use crate::cancel::CancelFlag;
use crate::config::SyncConfig;
use crate::connectivity::Connectivity;
use crate::error::{SyncError, SyncResult};
use crate::retry::RetryPolicy;
use crate::store::LocalStore;
use crate::transport::SyncTransport;
use lexis_storage::{StatusUpdate, StorageError};
use lexis_sync_protocol::{now_millis, SyncRecord, SyncStatus, SyncStream};
use std::sync::Arc;
use tracing::{debug, info, instrument, warn};

/// Why a push run stopped.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum PushStop {
    /// Every record of the snapshot was processed.
    #[default]
    Drained,
    /// The snapshot was empty.
    NothingToPush,
    /// Connectivity was lost; the remaining records wait for the next run.
    Offline,
    /// The run was cancelled; the remaining records wait for the next run.
    Cancelled,
}

/// Summary of one push run.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PushReport {
    /// Records in the snapshot taken at the start of the run.
    pub snapshot: usize,
    /// Records acknowledged by the server.
    pub synced: usize,
    /// Records whose retries were exhausted.
    pub failed: usize,
    /// Records edited or removed locally while the run was in progress.
    pub skipped: usize,
    /// Failed attempts across all records.
    pub failed_attempts: u32,
    /// Why the run stopped.
    pub stop: PushStop,
}

/// Outcome of pushing a single record.
enum RecordOutcome {
    Synced,
    Failed,
    Skipped,
    Interrupted(PushStop),
}

/// Uploads every record of one stream that still needs pushing, one at a
/// time.
///
/// Records are processed sequentially in the order of a snapshot taken at
/// the start of the run. Each record goes PENDING/FAILED → IN_PROGRESS and
/// then SYNCED when the server accepts it, or FAILED when its retries are
/// exhausted. A failed record never stops the batch; lost connectivity and
/// cancellation do, and put the in-flight record back to PENDING.
pub struct PushEngine {
    stream: SyncStream,
    retry: RetryPolicy,
    store: Arc<dyn LocalStore>,
    transport: Arc<dyn SyncTransport>,
    connectivity: Arc<dyn Connectivity>,
}

impl PushEngine {
    /// Creates a push engine for the stream in `config`.
    pub fn new(
        config: &SyncConfig,
        store: Arc<dyn LocalStore>,
        transport: Arc<dyn SyncTransport>,
        connectivity: Arc<dyn Connectivity>,
    ) -> Self {
        Self {
            stream: config.stream,
            retry: RetryPolicy::new(config.push_retry.clone()),
            store,
            transport,
            connectivity,
        }
    }

    /// Runs one push pass.
    ///
    /// Being offline at entry is not an error: the run ends with
    /// [`PushStop::Offline`] without touching the store.
    ///
    /// # Errors
    ///
    /// Returns an error only if the local store fails.
    #[instrument(skip_all, fields(stream = %self.stream))]
    pub async fn run(&self, cancel: &CancelFlag) -> SyncResult<PushReport> {
        let mut report = PushReport::default();

        if !self.connectivity.is_connected().await {
            info!("offline, skipping push");
            report.stop = PushStop::Offline;
            return Ok(report);
        }
        if cancel.is_cancelled() {
            report.stop = PushStop::Cancelled;
            return Ok(report);
        }

        let snapshot = self.store.unsynced_records(self.stream).await?;
        report.snapshot = snapshot.len();
        if snapshot.is_empty() {
            debug!("nothing to push");
            report.stop = PushStop::NothingToPush;
            return Ok(report);
        }
        info!(records = snapshot.len(), "push started");

        for record in &snapshot {
            if cancel.is_cancelled() {
                report.stop = PushStop::Cancelled;
                break;
            }
            if !self.connectivity.is_connected().await {
                report.stop = PushStop::Offline;
                break;
            }

            match self.push_one(record, cancel, &mut report).await? {
                RecordOutcome::Synced => report.synced += 1,
                RecordOutcome::Failed => report.failed += 1,
                RecordOutcome::Skipped => report.skipped += 1,
                RecordOutcome::Interrupted(stop) => {
                    report.stop = stop;
                    break;
                }
            }
        }

        info!(
            synced = report.synced,
            failed = report.failed,
            skipped = report.skipped,
            stop = ?report.stop,
            "push finished"
        );
        Ok(report)
    }

    async fn push_one(
        &self,
        record: &SyncRecord,
        cancel: &CancelFlag,
        report: &mut PushReport,
    ) -> SyncResult<RecordOutcome> {
        let tombstone = record.is_tombstone();
        let observed = record.updated_at;
        // Tombstones keep their DELETED status through every step.
        let status_for = |live: SyncStatus| if tombstone { SyncStatus::Deleted } else { live };

        let mut claim = StatusUpdate::new(status_for(SyncStatus::InProgress), observed)
            .with_retry_count(record.retry_count);
        if !tombstone {
            claim = claim.with_attempt(now_millis());
        }
        if !self.write_status(&record.uid, claim).await? {
            debug!(uid = %record.uid, "record changed since snapshot, skipping");
            return Ok(RecordOutcome::Skipped);
        }

        let outcome = self
            .retry
            .execute(cancel, self.connectivity.as_ref(), |_| {
                self.transport.push_record(self.stream, record)
            })
            .await;
        report.failed_attempts += outcome.failures;
        let retry_count = record.retry_count.saturating_add(outcome.failures);

        match outcome.result {
            Ok(()) => {
                // An acknowledged tombstone needs an attempt time at or after its last change.
                let done = StatusUpdate::new(status_for(SyncStatus::Synced), observed)
                    .with_attempt(now_millis().max(observed));
                self.write_status(&record.uid, done).await?;
                debug!(uid = %record.uid, attempts = outcome.attempts, "record pushed");
                Ok(RecordOutcome::Synced)
            }
            Err(e) if e.is_interruption() => {
                let revert = StatusUpdate::new(status_for(SyncStatus::Pending), observed)
                    .with_retry_count(retry_count);
                self.write_status(&record.uid, revert).await?;
                let stop = match e {
                    SyncError::Cancelled => PushStop::Cancelled,
                    _ => PushStop::Offline,
                };
                Ok(RecordOutcome::Interrupted(stop))
            }
            Err(e) => {
                warn!(uid = %record.uid, attempts = outcome.attempts, error = %e, "record push failed");
                let failed = StatusUpdate::new(status_for(SyncStatus::Failed), observed)
                    .with_retry_count(retry_count)
                    .with_attempt(now_millis());
                self.write_status(&record.uid, failed).await?;
                Ok(RecordOutcome::Failed)
            }
        }
    }

    /// Writes bookkeeping, treating a record moved on by a concurrent pull
    /// like one edited concurrently.
    async fn write_status(&self, uid: &str, update: StatusUpdate) -> SyncResult<bool> {
        match self
            .store
            .update_sync_status(self.stream, uid, update)
            .await
        {
            Err(SyncError::Storage(StorageError::InvalidTransition { from, to, .. })) => {
                warn!(uid, %from, %to, "status changed concurrently, leaving record as is");
                Ok(false)
            }
            other => other,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::RetryConfig;
    use crate::connectivity::{AlwaysOnline, ConnectivityFlag};
    use crate::store::DirectStore;
    use crate::transport::{MockReply, MockTransport};
    use lexis_storage::{InMemoryStore, RecordStore};
    use lexis_sync_protocol::Word;
    use std::time::Duration;

    const WORDS: SyncStream = SyncStream::Words;

    struct Harness {
        records: Arc<InMemoryStore>,
        transport: Arc<MockTransport>,
        network: Arc<ConnectivityFlag>,
        engine: PushEngine,
    }

    fn harness(words: &[&str]) -> Harness {
        let records = Arc::new(InMemoryStore::new());
        for (i, word) in words.iter().enumerate() {
            let mut record = Word::new(*word).into_record().unwrap();
            record.updated_at = 1_000 + i as i64;
            records.insert(WORDS, record).unwrap();
        }
        let transport = Arc::new(MockTransport::new());
        let network = Arc::new(ConnectivityFlag::new(true));
        let config = SyncConfig::default().with_push_retry(RetryConfig::push_default());
        let engine = PushEngine::new(
            &config,
            Arc::new(DirectStore::new(Arc::clone(&records))),
            transport.clone(),
            network.clone(),
        );
        Harness {
            records,
            transport,
            network,
            engine,
        }
    }

    fn statuses(store: &InMemoryStore) -> Vec<SyncStatus> {
        let mut all = store.list(WORDS).unwrap();
        all.sort_by_key(|r| r.id);
        all.into_iter().map(|r| r.sync_status).collect()
    }

    #[tokio::test(start_paused = true)]
    async fn all_pending_records_become_synced() {
        let h = harness(&["alpha", "beta", "gamma"]);

        let report = h.engine.run(&CancelFlag::new()).await.unwrap();

        assert_eq!(report.synced, 3);
        assert_eq!(report.stop, PushStop::Drained);
        assert_eq!(statuses(&h.records), vec![SyncStatus::Synced; 3]);
        let pushed: Vec<_> = h
            .transport
            .pushed()
            .iter()
            .map(|r| Word::from_record(r).unwrap().word)
            .collect();
        assert_eq!(pushed, vec!["alpha", "beta", "gamma"]);
        assert_eq!(h.records.pending_count(WORDS).unwrap(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn exhausted_record_is_failed_with_retry_count() {
        let h = harness(&["stubborn"]);
        h.transport.set_push_fallback(MockReply::Status(500));

        let report = h.engine.run(&CancelFlag::new()).await.unwrap();

        assert_eq!(report.failed, 1);
        assert_eq!(report.failed_attempts, 10);
        assert_eq!(h.transport.push_calls(), 10);
        let record = h.records.list(WORDS).unwrap().remove(0);
        assert_eq!(record.sync_status, SyncStatus::Failed);
        assert_eq!(record.retry_count, 10);
        assert!(record.last_sync_attempt.is_some());
        assert!(record.needs_push());
    }

    #[tokio::test(start_paused = true)]
    async fn failed_record_does_not_block_the_batch() {
        let h = harness(&["first", "second"]);
        h.transport
            .queue_push(std::iter::repeat(MockReply::Status(502)).take(10));

        let report = h.engine.run(&CancelFlag::new()).await.unwrap();

        assert_eq!(report.failed, 1);
        assert_eq!(report.synced, 1);
        assert_eq!(
            statuses(&h.records),
            vec![SyncStatus::Failed, SyncStatus::Synced]
        );
    }

    #[tokio::test(start_paused = true)]
    async fn failed_record_recovers_on_next_run() {
        let h = harness(&["flaky"]);
        h.transport
            .queue_push(std::iter::repeat(MockReply::Status(500)).take(10));
        h.engine.run(&CancelFlag::new()).await.unwrap();

        let report = h.engine.run(&CancelFlag::new()).await.unwrap();

        assert_eq!(report.synced, 1);
        let record = h.records.list(WORDS).unwrap().remove(0);
        assert_eq!(record.sync_status, SyncStatus::Synced);
        assert_eq!(record.retry_count, 0);
    }

    #[tokio::test]
    async fn offline_at_entry_touches_nothing() {
        let h = harness(&["quiet"]);
        h.network.set_online(false);

        let report = h.engine.run(&CancelFlag::new()).await.unwrap();

        assert_eq!(report.stop, PushStop::Offline);
        assert_eq!(report.snapshot, 0);
        assert_eq!(h.transport.push_calls(), 0);
        assert_eq!(statuses(&h.records), vec![SyncStatus::Pending]);
    }

    #[tokio::test]
    async fn empty_store_is_a_no_op() {
        let h = harness(&[]);
        let report = h.engine.run(&CancelFlag::new()).await.unwrap();
        assert_eq!(report.stop, PushStop::NothingToPush);
        assert_eq!(h.transport.push_calls(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn connectivity_loss_reverts_in_flight_record_and_stops() {
        let h = harness(&["one", "two", "three"]);
        h.transport
            .queue_push([MockReply::Ok(()), MockReply::Offline]);

        let report = h.engine.run(&CancelFlag::new()).await.unwrap();

        assert_eq!(report.stop, PushStop::Offline);
        assert_eq!(report.synced, 1);
        assert_eq!(h.transport.push_calls(), 2);
        assert_eq!(
            statuses(&h.records),
            vec![SyncStatus::Synced, SyncStatus::Pending, SyncStatus::Pending]
        );
    }

    #[tokio::test(start_paused = true)]
    async fn cancel_stops_before_next_record() {
        let h = harness(&["one", "two", "three"]);
        h.transport.set_latency(Duration::from_millis(100));
        let cancel = CancelFlag::new();

        let run = h.engine.run(&cancel);
        let trigger = async {
            tokio::time::sleep(Duration::from_millis(150)).await;
            cancel.cancel();
        };
        let (report, ()) = tokio::join!(run, trigger);
        let report = report.unwrap();

        // The second request was already in flight and completes.
        assert_eq!(report.stop, PushStop::Cancelled);
        assert_eq!(report.synced, 2);
        assert_eq!(h.transport.push_calls(), 2);
        assert_eq!(
            statuses(&h.records),
            vec![SyncStatus::Synced, SyncStatus::Synced, SyncStatus::Pending]
        );
    }

    #[tokio::test(start_paused = true)]
    async fn tombstones_are_pushed_and_acknowledged() {
        let h = harness(&["gone"]);
        let uid = h.records.list(WORDS).unwrap()[0].uid.clone();
        h.records.soft_delete(WORDS, &uid).unwrap();

        let report = h.engine.run(&CancelFlag::new()).await.unwrap();

        assert_eq!(report.synced, 1);
        assert_eq!(h.transport.pushed()[0].sync_status, SyncStatus::Deleted);
        let tombstone = h.records.get(WORDS, &uid).unwrap().unwrap();
        assert_eq!(tombstone.sync_status, SyncStatus::Deleted);
        assert!(!tombstone.needs_push());

        let again = h.engine.run(&CancelFlag::new()).await.unwrap();
        assert_eq!(again.stop, PushStop::NothingToPush);
    }

    #[tokio::test(start_paused = true)]
    async fn edit_during_push_keeps_record_pending() {
        let h = harness(&["draft"]);
        let uid = h.records.list(WORDS).unwrap()[0].uid.clone();
        h.transport.set_latency(Duration::from_millis(100));

        let cancel = CancelFlag::new();
        let run = h.engine.run(&cancel);
        let edit = async {
            tokio::time::sleep(Duration::from_millis(50)).await;
            let payload = Word::new("draft").with_meaning("v2").to_payload().unwrap();
            h.records.edit(WORDS, &uid, payload).unwrap();
        };
        let (report, ()) = tokio::join!(run, edit);

        assert_eq!(report.unwrap().synced, 1);
        let record = h.records.get(WORDS, &uid).unwrap().unwrap();
        assert_eq!(record.sync_status, SyncStatus::Pending);
        assert!(record.needs_push());
    }

    #[tokio::test]
    async fn always_online_runs_without_probe_failures() {
        let records = Arc::new(InMemoryStore::new());
        records
            .insert(WORDS, Word::new("x").into_record().unwrap())
            .unwrap();
        let engine = PushEngine::new(
            &SyncConfig::default(),
            Arc::new(DirectStore::new(Arc::clone(&records))),
            Arc::new(MockTransport::new()),
            Arc::new(AlwaysOnline),
        );
        assert_eq!(engine.run(&CancelFlag::new()).await.unwrap().synced, 1);
    }

    #[tokio::test]
    async fn engine_only_pushes_its_own_stream() {
        let records = Arc::new(InMemoryStore::new());
        records
            .insert(WORDS, Word::new("saudade").into_record().unwrap())
            .unwrap();
        let category = SyncRecord::new("cat-1", 10, Default::default());
        records.insert(SyncStream::Categories, category).unwrap();
        let transport = Arc::new(MockTransport::new());
        let engine = PushEngine::new(
            &SyncConfig::default().with_stream(SyncStream::Categories),
            Arc::new(DirectStore::new(Arc::clone(&records))),
            transport.clone(),
            Arc::new(AlwaysOnline),
        );

        let report = engine.run(&CancelFlag::new()).await.unwrap();

        assert_eq!(report.snapshot, 1);
        assert_eq!(report.synced, 1);
        let pushed: Vec<_> = transport.pushed().into_iter().map(|r| r.uid).collect();
        assert_eq!(pushed, vec!["cat-1"]);
        assert_eq!(records.pending_count(WORDS).unwrap(), 1);
        assert_eq!(records.pending_count(SyncStream::Categories).unwrap(), 0);
    }
}
