//! Async access to the local store.

use crate::error::{SyncError, SyncResult};
use async_trait::async_trait;
use lexis_storage::{CursorStore, RecordStore, StatusUpdate, StorageResult, UpsertOutcome};
use lexis_sync_protocol::{MergePolicy, SyncCursor, SyncRecord, SyncStream};
use std::sync::Arc;
use tokio::sync::Semaphore;

/// The local-store operations the engines need, as async calls.
#[async_trait]
pub trait LocalStore: Send + Sync {
    /// See [`RecordStore::unsynced_records`].
    async fn unsynced_records(&self, stream: SyncStream) -> SyncResult<Vec<SyncRecord>>;

    /// See [`RecordStore::update_sync_status`].
    async fn update_sync_status(
        &self,
        stream: SyncStream,
        uid: &str,
        update: StatusUpdate,
    ) -> SyncResult<bool>;

    /// See [`RecordStore::upsert_records`].
    async fn upsert_records(
        &self,
        stream: SyncStream,
        records: Vec<SyncRecord>,
        policy: MergePolicy,
    ) -> SyncResult<UpsertOutcome>;

    /// See [`RecordStore::pending_count`].
    async fn pending_count(&self, stream: SyncStream) -> SyncResult<usize>;

    /// See [`CursorStore::cursor`].
    async fn cursor(&self, stream: SyncStream) -> SyncResult<SyncCursor>;

    /// See [`CursorStore::set_cursor`].
    async fn set_cursor(&self, stream: SyncStream, cursor: SyncCursor) -> SyncResult<()>;
}

/// Runs store calls on the blocking thread pool, at most `workers` at a time.
///
/// Store implementations block on locks and disk I/O; this keeps that work
/// off the async worker threads.
pub struct PooledStore<S> {
    inner: Arc<S>,
    permits: Arc<Semaphore>,
}

impl<S> PooledStore<S>
where
    S: RecordStore + CursorStore + 'static,
{
    /// Creates a pool of `workers` over `inner`. Zero is treated as one.
    pub fn new(inner: Arc<S>, workers: usize) -> Self {
        Self {
            inner,
            permits: Arc::new(Semaphore::new(workers.max(1))),
        }
    }

    /// Returns the wrapped store.
    pub fn inner(&self) -> &Arc<S> {
        &self.inner
    }

    /// Returns the number of idle workers.
    pub fn idle_workers(&self) -> usize {
        self.permits.available_permits()
    }

    async fn run<T, F>(&self, task: F) -> SyncResult<T>
    where
        T: Send + 'static,
        F: FnOnce(&S) -> StorageResult<T> + Send + 'static,
    {
        let permit = Arc::clone(&self.permits)
            .acquire_owned()
            .await
            .map_err(|e| SyncError::WorkerPool(e.to_string()))?;
        let inner = Arc::clone(&self.inner);

        let result = tokio::task::spawn_blocking(move || {
            let _permit = permit;
            task(inner.as_ref())
        })
        .await
        .map_err(|e| SyncError::WorkerPool(e.to_string()))?;

        Ok(result?)
    }
}

#[async_trait]
impl<S> LocalStore for PooledStore<S>
where
    S: RecordStore + CursorStore + 'static,
{
    async fn unsynced_records(&self, stream: SyncStream) -> SyncResult<Vec<SyncRecord>> {
        self.run(move |store| store.unsynced_records(stream)).await
    }

    async fn update_sync_status(
        &self,
        stream: SyncStream,
        uid: &str,
        update: StatusUpdate,
    ) -> SyncResult<bool> {
        let uid = uid.to_string();
        self.run(move |store| store.update_sync_status(stream, &uid, &update))
            .await
    }

    async fn upsert_records(
        &self,
        stream: SyncStream,
        records: Vec<SyncRecord>,
        policy: MergePolicy,
    ) -> SyncResult<UpsertOutcome> {
        self.run(move |store| store.upsert_records(stream, &records, policy))
            .await
    }

    async fn pending_count(&self, stream: SyncStream) -> SyncResult<usize> {
        self.run(move |store| store.pending_count(stream)).await
    }

    async fn cursor(&self, stream: SyncStream) -> SyncResult<SyncCursor> {
        self.run(move |store| store.cursor(stream)).await
    }

    async fn set_cursor(&self, stream: SyncStream, cursor: SyncCursor) -> SyncResult<()> {
        self.run(move |store| store.set_cursor(stream, &cursor))
            .await
    }
}

/// Calls the store inline on the current task.
///
/// Suitable for in-memory stores, and for tests that run on a paused clock.
pub struct DirectStore<S> {
    inner: Arc<S>,
}

impl<S> DirectStore<S>
where
    S: RecordStore + CursorStore,
{
    /// Wraps `inner`.
    pub fn new(inner: Arc<S>) -> Self {
        Self { inner }
    }

    /// Returns the wrapped store.
    pub fn inner(&self) -> &Arc<S> {
        &self.inner
    }
}

#[async_trait]
impl<S> LocalStore for DirectStore<S>
where
    S: RecordStore + CursorStore,
{
    async fn unsynced_records(&self, stream: SyncStream) -> SyncResult<Vec<SyncRecord>> {
        Ok(self.inner.unsynced_records(stream)?)
    }

    async fn update_sync_status(
        &self,
        stream: SyncStream,
        uid: &str,
        update: StatusUpdate,
    ) -> SyncResult<bool> {
        Ok(self.inner.update_sync_status(stream, uid, &update)?)
    }

    async fn upsert_records(
        &self,
        stream: SyncStream,
        records: Vec<SyncRecord>,
        policy: MergePolicy,
    ) -> SyncResult<UpsertOutcome> {
        Ok(self.inner.upsert_records(stream, &records, policy)?)
    }

    async fn pending_count(&self, stream: SyncStream) -> SyncResult<usize> {
        Ok(self.inner.pending_count(stream)?)
    }

    async fn cursor(&self, stream: SyncStream) -> SyncResult<SyncCursor> {
        Ok(self.inner.cursor(stream)?)
    }

    async fn set_cursor(&self, stream: SyncStream, cursor: SyncCursor) -> SyncResult<()> {
        Ok(self.inner.set_cursor(stream, &cursor)?)
    }
}
