//! Lifecycle of push and pull jobs.
//!
//! The coordinator owns at most one active run per [`JobKind`]. Starting a
//! run cancels the active run of the same kind and waits for it to reach a
//! checkpoint before doing any work, so two runs of one kind never overlap.
//! Push and pull are independent and may run concurrently.
//!
//! Every run ends with exactly one [`SyncEvent`], delivered to its
//! [`RunHandle`] and broadcast to all subscribers.

use crate::cancel::CancelFlag;
use crate::config::SyncConfig;
use crate::connectivity::Connectivity;
use crate::error::SyncResult;
use crate::pull::{PullEngine, PullExit, PullReport};
use crate::push::{PushEngine, PushReport, PushStop};
use crate::store::{LocalStore, PooledStore};
use crate::transport::SyncTransport;
use lexis_storage::{CursorStore, RecordStore};
use lexis_sync_protocol::now_millis;
use parking_lot::{Mutex, RwLock};
use std::collections::HashMap;
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tokio::sync::{broadcast, oneshot};
use tokio::task::JoinHandle;
use tracing::{debug, info};

const EVENT_CAPACITY: usize = 64;

/// The two kinds of sync job.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum JobKind {
    /// Upload of local changes.
    Push,
    /// Download of remote changes.
    Pull,
}

impl JobKind {
    /// Returns the job name.
    pub fn as_str(&self) -> &'static str {
        match self {
            JobKind::Push => "push",
            JobKind::Pull => "pull",
        }
    }
}

impl fmt::Display for JobKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// State of the latest run of a job kind.
///
/// `Idle → Running → {Completed, Cancelled, Failed}`; a new start always
/// begins a fresh run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum JobState {
    /// No run has started yet.
    #[default]
    Idle,
    /// A run is in progress.
    Running,
    /// The run finished.
    Completed,
    /// The run stopped at a checkpoint after cancellation.
    Cancelled,
    /// The run hit an error it could not absorb.
    Failed,
}

impl JobState {
    /// Returns true if the run is over.
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            JobState::Completed | JobState::Cancelled | JobState::Failed
        )
    }

    /// Returns the state name.
    pub fn as_str(&self) -> &'static str {
        match self {
            JobState::Idle => "idle",
            JobState::Running => "running",
            JobState::Completed => "completed",
            JobState::Cancelled => "cancelled",
            JobState::Failed => "failed",
        }
    }
}

impl fmt::Display for JobState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Engine report attached to a terminal event.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum JobReport {
    /// Report of a push run.
    Push(PushReport),
    /// Report of a pull run.
    Pull(PullReport),
}

/// Terminal notification of one run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SyncEvent {
    /// Job kind.
    pub kind: JobKind,
    /// Run identifier, unique per coordinator.
    pub run_id: u64,
    /// Terminal state.
    pub state: JobState,
    /// Engine report, absent when the engine failed outright.
    pub report: Option<JobReport>,
    /// Error message for failed runs.
    pub error: Option<String>,
}

/// Counters accumulated across runs.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SyncStats {
    /// Push runs finished.
    pub push_runs: u64,
    /// Pull runs finished.
    pub pull_runs: u64,
    /// Records acknowledged by the server.
    pub records_pushed: u64,
    /// Records whose push retries were exhausted.
    pub records_failed: u64,
    /// Pull pages received.
    pub pages_pulled: u64,
    /// Pulled records written locally.
    pub records_pulled: u64,
    /// Message of the most recent failure.
    pub last_error: Option<String>,
    /// Epoch milliseconds of the most recent completed run.
    pub last_completed_at: Option<i64>,
}

/// Handle to one started run.
#[derive(Debug)]
pub struct RunHandle {
    kind: JobKind,
    run_id: u64,
    done: oneshot::Receiver<SyncEvent>,
}

impl RunHandle {
    /// Returns the job kind.
    pub fn kind(&self) -> JobKind {
        self.kind
    }

    /// Returns the run identifier.
    pub fn run_id(&self) -> u64 {
        self.run_id
    }

    /// Waits for the run's terminal event.
    pub async fn wait(self) -> SyncEvent {
        let RunHandle { kind, run_id, done } = self;
        done.await.unwrap_or_else(|_| SyncEvent {
            kind,
            run_id,
            state: JobState::Failed,
            report: None,
            error: Some("run task ended without reporting".to_string()),
        })
    }
}

struct ActiveJob {
    run_id: u64,
    cancel: CancelFlag,
    handle: JoinHandle<()>,
}

struct Inner {
    config: SyncConfig,
    store: Arc<dyn LocalStore>,
    transport: Arc<dyn SyncTransport>,
    connectivity: Arc<dyn Connectivity>,
    states: RwLock<HashMap<JobKind, JobState>>,
    stats: RwLock<SyncStats>,
    events: broadcast::Sender<SyncEvent>,
    next_run_id: AtomicU64,
    jobs: Mutex<HashMap<JobKind, ActiveJob>>,
    debounce: Mutex<Option<JoinHandle<()>>>,
}

/// Owns the lifecycle of push and pull runs.
///
/// Cloning is cheap; clones share the same jobs. Methods that start runs
/// spawn Tokio tasks and must be called from within a Tokio runtime.
#[derive(Clone)]
pub struct SyncCoordinator {
    inner: Arc<Inner>,
}

impl SyncCoordinator {
    /// Creates a coordinator over already-async collaborators.
    pub fn new(
        config: SyncConfig,
        store: Arc<dyn LocalStore>,
        transport: Arc<dyn SyncTransport>,
        connectivity: Arc<dyn Connectivity>,
    ) -> Self {
        let (events, _) = broadcast::channel(EVENT_CAPACITY);
        Self {
            inner: Arc::new(Inner {
                config,
                store,
                transport,
                connectivity,
                states: RwLock::new(HashMap::new()),
                stats: RwLock::new(SyncStats::default()),
                events,
                next_run_id: AtomicU64::new(0),
                jobs: Mutex::new(HashMap::new()),
                debounce: Mutex::new(None),
            }),
        }
    }

    /// Creates a coordinator over a blocking store, accessed through a
    /// worker pool of `config.store_workers` threads.
    pub fn with_blocking_store<S>(
        config: SyncConfig,
        store: Arc<S>,
        transport: Arc<dyn SyncTransport>,
        connectivity: Arc<dyn Connectivity>,
    ) -> Self
    where
        S: RecordStore + CursorStore + 'static,
    {
        let pooled = PooledStore::new(store, config.store_workers);
        Self::new(config, Arc::new(pooled), transport, connectivity)
    }

    /// Returns the configuration.
    pub fn config(&self) -> &SyncConfig {
        &self.inner.config
    }

    /// Starts a push run, superseding any active one.
    pub fn start_push(&self) -> RunHandle {
        self.start(JobKind::Push)
    }

    /// Starts a pull run, superseding any active one.
    pub fn start_pull(&self) -> RunHandle {
        self.start(JobKind::Pull)
    }

    /// Starts a run of `kind`, superseding any active one of the same kind.
    pub fn start(&self, kind: JobKind) -> RunHandle {
        let run_id = self.inner.next_run_id.fetch_add(1, Ordering::SeqCst) + 1;
        let cancel = CancelFlag::new();
        let (done_tx, done_rx) = oneshot::channel();

        let mut jobs = self.inner.jobs.lock();
        let previous = jobs.remove(&kind);
        if let Some(previous) = &previous {
            debug!(%kind, previous = previous.run_id, run_id, "superseding run");
            previous.cancel.cancel();
        }

        let inner = Arc::clone(&self.inner);
        let task_cancel = cancel.clone();
        let handle = tokio::spawn(async move {
            if let Some(previous) = previous {
                let _ = previous.handle.await;
            }
            let event = inner.execute(kind, run_id, &task_cancel).await;
            let _ = done_tx.send(event);
        });

        jobs.insert(
            kind,
            ActiveJob {
                run_id,
                cancel,
                handle,
            },
        );
        RunHandle {
            kind,
            run_id,
            done: done_rx,
        }
    }

    /// Signals the active runs and any pending debounced push to stop.
    ///
    /// Runs stop at their next checkpoint; in-flight requests complete.
    pub fn cancel(&self) {
        self.abort_debounce();
        for job in self.inner.jobs.lock().values() {
            job.cancel.cancel();
        }
    }

    /// Signals the active run of `kind` to stop.
    pub fn cancel_job(&self, kind: JobKind) {
        if let Some(job) = self.inner.jobs.lock().get(&kind) {
            job.cancel.cancel();
        }
    }

    /// Trigger for a newly created record: push right away.
    pub fn on_record_saved(&self) -> RunHandle {
        self.start_push()
    }

    /// Trigger for an edited record: push after the edit debounce.
    ///
    /// Another edit within the debounce window restarts the wait, so a burst
    /// of edits results in one push.
    pub fn on_record_edited(&self) {
        let delay = self.inner.config.edit_debounce;
        let coordinator = self.clone();
        let timer = tokio::spawn(async move {
            tokio::time::sleep(delay).await;
            coordinator.start_push();
        });

        if let Some(previous) = self.inner.debounce.lock().replace(timer) {
            previous.abort();
        }
    }

    /// Trigger for application start: pull remote changes.
    pub fn on_app_launch(&self) -> RunHandle {
        self.start_pull()
    }

    /// Pushes, then pulls, waiting for both runs.
    pub async fn sync_now(&self) -> (SyncEvent, SyncEvent) {
        let pushed = self.start_push().wait().await;
        let pulled = self.start_pull().wait().await;
        (pushed, pulled)
    }

    /// Cancels everything and waits for active runs to stop.
    pub async fn shutdown(&self) {
        self.cancel();
        let jobs: Vec<ActiveJob> = self.inner.jobs.lock().drain().map(|(_, job)| job).collect();
        for job in jobs {
            let _ = job.handle.await;
        }
        info!("sync coordinator stopped");
    }

    /// Returns the state of the latest run of `kind`.
    pub fn state(&self, kind: JobKind) -> JobState {
        self.inner
            .states
            .read()
            .get(&kind)
            .copied()
            .unwrap_or_default()
    }

    /// Returns the accumulated counters.
    pub fn stats(&self) -> SyncStats {
        self.inner.stats.read().clone()
    }

    /// Subscribes to terminal events of all future runs.
    pub fn subscribe(&self) -> broadcast::Receiver<SyncEvent> {
        self.inner.events.subscribe()
    }

    /// Returns how many records of the coordinator's stream wait to be pushed.
    ///
    /// # Errors
    ///
    /// Returns an error if the local store fails.
    pub async fn pending_count(&self) -> SyncResult<usize> {
        self.inner
            .store
            .pending_count(self.inner.config.stream)
            .await
    }

    fn abort_debounce(&self) {
        if let Some(timer) = self.inner.debounce.lock().take() {
            timer.abort();
        }
    }
}

impl Inner {
    async fn execute(&self, kind: JobKind, run_id: u64, cancel: &CancelFlag) -> SyncEvent {
        self.states.write().insert(kind, JobState::Running);
        info!(%kind, run_id, "sync run started");

        let (state, report, error) = match kind {
            JobKind::Push => self.run_push(cancel).await,
            JobKind::Pull => self.run_pull(cancel).await,
        };

        self.record_stats(state, report.as_ref(), error.as_deref());
        self.states.write().insert(kind, state);

        let event = SyncEvent {
            kind,
            run_id,
            state,
            report,
            error,
        };
        // No subscribers is fine.
        let _ = self.events.send(event.clone());
        info!(%kind, run_id, %state, "sync run finished");
        event
    }

    async fn run_push(&self, cancel: &CancelFlag) -> (JobState, Option<JobReport>, Option<String>) {
        let engine = PushEngine::new(
            &self.config,
            Arc::clone(&self.store),
            Arc::clone(&self.transport),
            Arc::clone(&self.connectivity),
        );
        match engine.run(cancel).await {
            Ok(report) => {
                let state = match report.stop {
                    PushStop::Cancelled => JobState::Cancelled,
                    _ => JobState::Completed,
                };
                (state, Some(JobReport::Push(report)), None)
            }
            Err(e) => (JobState::Failed, None, Some(e.to_string())),
        }
    }

    async fn run_pull(&self, cancel: &CancelFlag) -> (JobState, Option<JobReport>, Option<String>) {
        let engine = PullEngine::new(
            &self.config,
            Arc::clone(&self.store),
            Arc::clone(&self.transport),
            Arc::clone(&self.connectivity),
        );
        match engine.run(cancel).await {
            Ok(report) => {
                let (state, error) = match report.exit {
                    PullExit::Cancelled => (JobState::Cancelled, None),
                    PullExit::ApiFailure => (JobState::Failed, report.error.clone()),
                    _ => (JobState::Completed, None),
                };
                (state, Some(JobReport::Pull(report)), error)
            }
            Err(e) => (JobState::Failed, None, Some(e.to_string())),
        }
    }

    fn record_stats(&self, state: JobState, report: Option<&JobReport>, error: Option<&str>) {
        let mut stats = self.stats.write();
        match report {
            Some(JobReport::Push(push)) => {
                stats.push_runs += 1;
                stats.records_pushed += push.synced as u64;
                stats.records_failed += push.failed as u64;
            }
            Some(JobReport::Pull(pull)) => {
                stats.pull_runs += 1;
                stats.pages_pulled += pull.pages as u64;
                stats.records_pulled += pull.applied as u64;
            }
            None => {}
        }
        if let Some(error) = error {
            stats.last_error = Some(error.to_string());
        }
        if state == JobState::Completed {
            stats.last_completed_at = Some(now_millis());
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::connectivity::ConnectivityFlag;
    use crate::store::DirectStore;
    use crate::transport::{MockReply, MockTransport};
    use lexis_storage::InMemoryStore;
    use lexis_sync_protocol::{PullPage, SyncRecord, SyncStatus, SyncStream, Word};
    use std::time::Duration;

    struct Harness {
        store: Arc<InMemoryStore>,
        transport: Arc<MockTransport>,
        coordinator: SyncCoordinator,
    }

    fn harness(words: &[&str], config: SyncConfig) -> Harness {
        let store = Arc::new(InMemoryStore::new());
        for (i, word) in words.iter().enumerate() {
            let mut record = Word::new(*word).into_record().unwrap();
            record.updated_at = 1_000 + i as i64;
            store.insert(SyncStream::Words, record).unwrap();
        }
        let transport = Arc::new(MockTransport::new());
        let coordinator = SyncCoordinator::new(
            config,
            Arc::new(DirectStore::new(Arc::clone(&store))),
            transport.clone(),
            Arc::new(ConnectivityFlag::new(true)),
        );
        Harness {
            store,
            transport,
            coordinator,
        }
    }

    fn synced_count(store: &InMemoryStore) -> usize {
        store
            .list(SyncStream::Words)
            .unwrap()
            .iter()
            .filter(|r| r.sync_status == SyncStatus::Synced)
            .count()
    }

    #[tokio::test(start_paused = true)]
    async fn push_run_emits_exactly_one_event() {
        let h = harness(&["a", "b", "c"], SyncConfig::default());
        let mut events = h.coordinator.subscribe();
        assert_eq!(h.coordinator.state(JobKind::Push), JobState::Idle);

        let event = h.coordinator.start_push().wait().await;

        assert_eq!(event.state, JobState::Completed);
        assert!(matches!(
            event.report,
            Some(JobReport::Push(PushReport { synced: 3, .. }))
        ));
        assert_eq!(events.recv().await.unwrap(), event);
        assert!(events.try_recv().is_err());
        assert_eq!(h.coordinator.state(JobKind::Push), JobState::Completed);
        assert_eq!(synced_count(&h.store), 3);
    }

    #[tokio::test(start_paused = true)]
    async fn restart_cancels_and_awaits_previous_run() {
        let h = harness(&["one", "two", "three"], SyncConfig::default());
        h.transport.set_latency(Duration::from_millis(100));

        let first = h.coordinator.start_push();
        tokio::time::sleep(Duration::from_millis(150)).await;
        let second = h.coordinator.start_push();

        let first = first.wait().await;
        let second = second.wait().await;

        assert_eq!(first.state, JobState::Cancelled);
        assert_eq!(second.state, JobState::Completed);
        assert!(second.run_id > first.run_id);
        // Each record went over the wire once: no overlap between the runs.
        assert_eq!(h.transport.push_calls(), 3);
        assert_eq!(synced_count(&h.store), 3);
    }

    #[tokio::test(start_paused = true)]
    async fn push_and_pull_run_concurrently() {
        let h = harness(&["local"], SyncConfig::default());
        let remote = SyncRecord::new("remote-1", 5, Default::default());
        h.transport
            .queue_pull([MockReply::Ok(PullPage::ok(vec![remote], false))]);

        let push = h.coordinator.start_push();
        let pull = h.coordinator.start_pull();
        let (push, pull) = tokio::join!(push.wait(), pull.wait());

        assert_eq!(push.state, JobState::Completed);
        assert_eq!(pull.state, JobState::Completed);
        assert!(h
            .store
            .get(SyncStream::Words, "remote-1")
            .unwrap()
            .is_some());
    }

    #[tokio::test(start_paused = true)]
    async fn cancel_stops_active_runs() {
        let h = harness(&["one", "two", "three"], SyncConfig::default());
        h.transport.set_latency(Duration::from_millis(100));

        let run = h.coordinator.start_push();
        tokio::time::sleep(Duration::from_millis(50)).await;
        h.coordinator.cancel();
        let event = run.wait().await;

        assert_eq!(event.state, JobState::Cancelled);
        assert_eq!(h.transport.push_calls(), 1);
        assert_eq!(h.coordinator.pending_count().await.unwrap(), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn edits_are_debounced_into_one_push() {
        let config = SyncConfig::default().with_edit_debounce(Duration::from_secs(10));
        let h = harness(&["draft"], config);

        h.coordinator.on_record_edited();
        tokio::time::sleep(Duration::from_secs(5)).await;
        h.coordinator.on_record_edited();

        tokio::time::sleep(Duration::from_secs(7)).await;
        assert_eq!(h.transport.push_calls(), 0);

        tokio::time::sleep(Duration::from_secs(4)).await;
        assert_eq!(h.transport.push_calls(), 1);
        assert_eq!(h.coordinator.stats().push_runs, 1);
    }

    #[tokio::test(start_paused = true)]
    async fn cancel_drops_pending_debounced_push() {
        let h = harness(&["draft"], SyncConfig::default());
        h.coordinator.on_record_edited();
        h.coordinator.cancel();

        tokio::time::sleep(Duration::from_secs(30)).await;
        assert_eq!(h.transport.push_calls(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn sync_now_pushes_then_pulls() {
        let h = harness(&["a"], SyncConfig::default());
        let (pushed, pulled) = h.coordinator.sync_now().await;

        assert_eq!(pushed.kind, JobKind::Push);
        assert_eq!(pulled.kind, JobKind::Pull);
        assert!(pushed.run_id < pulled.run_id);
        let stats = h.coordinator.stats();
        assert_eq!(stats.push_runs, 1);
        assert_eq!(stats.pull_runs, 1);
        assert_eq!(stats.records_pushed, 1);
        assert!(stats.last_completed_at.is_some());
    }

    #[tokio::test(start_paused = true)]
    async fn pull_time_budget_still_completes() {
        let config = SyncConfig::default().with_pull_time_budget(Duration::from_secs(3));
        let h = harness(&[], config);
        h.transport.queue_pull((0..5).map(|i| {
            let record = SyncRecord::new(format!("r{i}"), i, Default::default());
            MockReply::Ok(PullPage::ok(vec![record], true))
        }));
        let mut events = h.coordinator.subscribe();

        let event = h.coordinator.on_app_launch().wait().await;

        assert_eq!(event.state, JobState::Completed);
        assert!(matches!(
            event.report,
            Some(JobReport::Pull(PullReport {
                exit: PullExit::TimeBudget,
                ..
            }))
        ));
        assert_eq!(events.recv().await.unwrap().run_id, event.run_id);
        assert!(events.try_recv().is_err());
    }

    #[tokio::test(start_paused = true)]
    async fn pull_api_failure_marks_run_failed() {
        let h = harness(&[], SyncConfig::default());
        h.transport.queue_pull(std::iter::repeat(MockReply::Status(500)).take(3));

        let event = h.coordinator.start_pull().wait().await;

        assert_eq!(event.state, JobState::Failed);
        assert_eq!(event.error.as_deref(), Some("api error: HTTP 500"));
        assert_eq!(
            h.coordinator.stats().last_error.as_deref(),
            Some("api error: HTTP 500")
        );
    }

    #[tokio::test(start_paused = true)]
    async fn shutdown_waits_for_runs() {
        let h = harness(&["a", "b"], SyncConfig::default());
        h.transport.set_latency(Duration::from_millis(100));

        let run = h.coordinator.start_push();
        tokio::time::sleep(Duration::from_millis(10)).await;
        h.coordinator.shutdown().await;

        assert_eq!(h.coordinator.state(JobKind::Push), JobState::Cancelled);
        assert_eq!(run.wait().await.state, JobState::Cancelled);
    }

    #[test]
    fn job_state_terminality() {
        assert!(!JobState::Idle.is_terminal());
        assert!(!JobState::Running.is_terminal());
        assert!(JobState::Completed.is_terminal());
        assert!(JobState::Cancelled.is_terminal());
        assert!(JobState::Failed.is_terminal());
    }
}
