//! Store traits consumed by the sync engine and the application.

use crate::error::StorageResult;
use lexis_sync_protocol::{MergePolicy, Payload, SyncCursor, SyncRecord, SyncStatus, SyncStream};

/// Push bookkeeping written back to a record after an upload attempt.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StatusUpdate {
    /// New sync status.
    pub status: SyncStatus,
    /// New retry count.
    pub retry_count: u32,
    /// Time of this attempt; `None` keeps the stored value.
    pub last_sync_attempt: Option<i64>,
    /// The `updated_at` the writer saw when it read the record.
    pub observed_updated_at: i64,
}

impl StatusUpdate {
    /// Creates an update for a record observed at `observed_updated_at`.
    pub fn new(status: SyncStatus, observed_updated_at: i64) -> Self {
        Self {
            status,
            retry_count: 0,
            last_sync_attempt: None,
            observed_updated_at,
        }
    }

    /// Sets the retry count.
    pub fn with_retry_count(mut self, retry_count: u32) -> Self {
        self.retry_count = retry_count;
        self
    }

    /// Sets the attempt timestamp.
    pub fn with_attempt(mut self, at: i64) -> Self {
        self.last_sync_attempt = Some(at);
        self
    }
}

/// Counts from one upsert call.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct UpsertOutcome {
    /// Records whose uid was unknown.
    pub inserted: usize,
    /// Existing records that were overwritten.
    pub updated: usize,
    /// Records left untouched by the merge policy.
    pub skipped: usize,
}

impl UpsertOutcome {
    /// Returns the number of records written.
    pub fn applied(&self) -> usize {
        self.inserted + self.updated
    }
}

/// Record storage shared by the application and the sync engine.
///
/// Every [`SyncStream`] has its own table: an operation only sees and
/// changes the records of the stream it is given.
///
/// # Invariants
///
/// - `uid` is unique within a stream and never reassigned
/// - `id` is assigned once per stream, on first insert, and preserved by upserts
/// - Status writes follow [`SyncStatus::can_transition_to`]
/// - Every write is atomic per record
///
/// # Implementors
///
/// - [`super::InMemoryStore`] - For testing
/// - [`super::FileStore`] - For persistent storage
pub trait RecordStore: Send + Sync {
    /// Returns every record of `stream` that still has a change to upload.
    ///
    /// This covers PENDING, IN_PROGRESS and FAILED records plus tombstones
    /// the server has not acknowledged. Records come back oldest change
    /// first; the order is stable for a given store state.
    ///
    /// # Errors
    ///
    /// Returns an error if the store cannot be read.
    fn unsynced_records(&self, stream: SyncStream) -> StorageResult<Vec<SyncRecord>>;

    /// Writes push bookkeeping for one record.
    ///
    /// Returns `Ok(false)` without writing if the record no longer exists or
    /// its `updated_at` differs from `update.observed_updated_at`, meaning
    /// it was edited after the caller read it.
    ///
    /// # Errors
    ///
    /// Returns [`StorageError::InvalidTransition`](crate::StorageError::InvalidTransition)
    /// if the status change is not allowed, or an I/O error.
    fn update_sync_status(
        &self,
        stream: SyncStream,
        uid: &str,
        update: &StatusUpdate,
    ) -> StorageResult<bool>;

    /// Applies pulled records to `stream`, keyed by `uid`.
    ///
    /// Applied records are stored as SYNCED, or as acknowledged tombstones
    /// when they arrive DELETED. Applying the same records twice leaves the
    /// store unchanged after the first application.
    ///
    /// # Errors
    ///
    /// Returns an error if the store cannot be written. No record of the
    /// batch is applied in that case.
    fn upsert_records(
        &self,
        stream: SyncStream,
        records: &[SyncRecord],
        policy: MergePolicy,
    ) -> StorageResult<UpsertOutcome>;

    /// Inserts a new local record and returns it with its assigned `id`.
    ///
    /// # Errors
    ///
    /// Returns [`StorageError::Duplicate`](crate::StorageError::Duplicate)
    /// if the uid already exists.
    fn insert(&self, stream: SyncStream, record: SyncRecord) -> StorageResult<SyncRecord>;

    /// Replaces a record's payload, bumps `updated_at` and marks it PENDING.
    ///
    /// # Errors
    ///
    /// Returns an error if the record does not exist or is deleted.
    fn edit(&self, stream: SyncStream, uid: &str, payload: Payload) -> StorageResult<SyncRecord>;

    /// Marks a record DELETED so the deletion is pushed.
    ///
    /// # Errors
    ///
    /// Returns an error if the record does not exist.
    fn soft_delete(&self, stream: SyncStream, uid: &str) -> StorageResult<SyncRecord>;

    /// Removes a record outright. Nothing is pushed.
    ///
    /// Returns false if there was no such record.
    ///
    /// # Errors
    ///
    /// Returns an error if the store cannot be written.
    fn hard_delete(&self, stream: SyncStream, uid: &str) -> StorageResult<bool>;

    /// Looks up a record by uid.
    ///
    /// # Errors
    ///
    /// Returns an error if the store cannot be read.
    fn get(&self, stream: SyncStream, uid: &str) -> StorageResult<Option<SyncRecord>>;

    /// Returns all live (non-deleted) records in insertion order.
    ///
    /// # Errors
    ///
    /// Returns an error if the store cannot be read.
    fn list(&self, stream: SyncStream) -> StorageResult<Vec<SyncRecord>>;

    /// Returns the number of records waiting to be pushed.
    ///
    /// # Errors
    ///
    /// Returns an error if the store cannot be read.
    fn pending_count(&self, stream: SyncStream) -> StorageResult<usize>;
}

/// Durable pull cursors, one per [`SyncStream`].
pub trait CursorStore: Send + Sync {
    /// Returns the cursor for `stream`, or the initial cursor.
    ///
    /// # Errors
    ///
    /// Returns an error if the store cannot be read.
    fn cursor(&self, stream: SyncStream) -> StorageResult<SyncCursor>;

    /// Persists the cursor for `stream`.
    ///
    /// # Errors
    ///
    /// Returns an error if the store cannot be written.
    fn set_cursor(&self, stream: SyncStream, cursor: &SyncCursor) -> StorageResult<()>;

    /// Forgets every cursor so the next pull starts from the beginning.
    ///
    /// # Errors
    ///
    /// Returns an error if the store cannot be written.
    fn reset_cursors(&self) -> StorageResult<()>;
}
