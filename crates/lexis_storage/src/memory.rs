//! In-memory store for testing.

use crate::error::StorageResult;
use crate::store::{CursorStore, RecordStore, StatusUpdate, UpsertOutcome};
use crate::table::Table;
use lexis_sync_protocol::{
    now_millis, MergePolicy, Payload, SyncCursor, SyncRecord, SyncStream,
};
use parking_lot::RwLock;

/// An in-memory record and cursor store.
///
/// This store keeps everything in memory and is suitable for:
/// - Unit tests
/// - Integration tests
/// - Ephemeral sessions that don't need persistence
///
/// # Thread Safety
///
/// This store is thread-safe and can be shared across threads.
#[derive(Debug, Default)]
pub struct InMemoryStore {
    table: RwLock<Table>,
}

impl InMemoryStore {
    /// Creates a new empty store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a store with `records` in `stream`, keeping their statuses.
    ///
    /// # Errors
    ///
    /// Returns an error if two records share a uid.
    pub fn with_records(
        stream: SyncStream,
        records: impl IntoIterator<Item = SyncRecord>,
    ) -> StorageResult<Self> {
        let store = Self::new();
        for record in records {
            store.insert(stream, record)?;
        }
        Ok(store)
    }
}

impl RecordStore for InMemoryStore {
    fn unsynced_records(&self, stream: SyncStream) -> StorageResult<Vec<SyncRecord>> {
        Ok(self.table.read().unsynced(stream))
    }

    fn update_sync_status(
        &self,
        stream: SyncStream,
        uid: &str,
        update: &StatusUpdate,
    ) -> StorageResult<bool> {
        self.table.write().update_status(stream, uid, update)
    }

    fn upsert_records(
        &self,
        stream: SyncStream,
        records: &[SyncRecord],
        policy: MergePolicy,
    ) -> StorageResult<UpsertOutcome> {
        Ok(self.table.write().upsert(stream, records, policy))
    }

    fn insert(&self, stream: SyncStream, record: SyncRecord) -> StorageResult<SyncRecord> {
        self.table.write().insert(stream, record)
    }

    fn edit(&self, stream: SyncStream, uid: &str, payload: Payload) -> StorageResult<SyncRecord> {
        self.table.write().edit(stream, uid, payload, now_millis())
    }

    fn soft_delete(&self, stream: SyncStream, uid: &str) -> StorageResult<SyncRecord> {
        self.table.write().soft_delete(stream, uid, now_millis())
    }

    fn hard_delete(&self, stream: SyncStream, uid: &str) -> StorageResult<bool> {
        Ok(self.table.write().hard_delete(stream, uid))
    }

    fn get(&self, stream: SyncStream, uid: &str) -> StorageResult<Option<SyncRecord>> {
        Ok(self.table.read().get(stream, uid))
    }

    fn list(&self, stream: SyncStream) -> StorageResult<Vec<SyncRecord>> {
        Ok(self.table.read().list(stream))
    }

    fn pending_count(&self, stream: SyncStream) -> StorageResult<usize> {
        Ok(self.table.read().pending_count(stream))
    }
}

impl CursorStore for InMemoryStore {
    fn cursor(&self, stream: SyncStream) -> StorageResult<SyncCursor> {
        Ok(self.table.read().cursor(stream))
    }

    fn set_cursor(&self, stream: SyncStream, cursor: &SyncCursor) -> StorageResult<()> {
        self.table.write().set_cursor(stream, cursor);
        Ok(())
    }

    fn reset_cursors(&self) -> StorageResult<()> {
        self.table.write().reset_cursors();
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use lexis_sync_protocol::{SyncStatus, Word};

    const WORDS: SyncStream = SyncStream::Words;

    #[test]
    fn memory_edit_requeues_synced_record() {
        let record = Word::new("apricity").into_record().unwrap();
        let uid = record.uid.clone();
        let store =
            InMemoryStore::with_records(WORDS, [record.with_status(SyncStatus::Synced)]).unwrap();
        assert_eq!(store.pending_count(WORDS).unwrap(), 0);

        let payload = Word::new("apricity")
            .with_meaning("the warmth of the sun in winter")
            .to_payload()
            .unwrap();
        let edited = store.edit(WORDS, &uid, payload).unwrap();

        assert_eq!(edited.sync_status, SyncStatus::Pending);
        assert_eq!(store.pending_count(WORDS).unwrap(), 1);
        assert_eq!(
            Word::from_record(&store.get(WORDS, &uid).unwrap().unwrap())
                .unwrap()
                .short_meaning,
            "the warmth of the sun in winter"
        );
    }

    #[test]
    fn memory_edit_missing_record() {
        let store = InMemoryStore::new();
        assert!(store.edit(WORDS, "nope", Payload::new()).is_err());
    }

    #[test]
    fn memory_streams_do_not_share_records() {
        let record = Word::new("hygge").into_record().unwrap();
        let uid = record.uid.clone();
        let store = InMemoryStore::with_records(WORDS, [record]).unwrap();

        assert!(store.unsynced_records(SyncStream::Categories).unwrap().is_empty());
        assert!(store.get(SyncStream::Categories, &uid).unwrap().is_none());
        assert!(store.edit(SyncStream::Categories, &uid, Payload::new()).is_err());
        assert_eq!(store.pending_count(WORDS).unwrap(), 1);
    }

    #[test]
    fn memory_cursor_roundtrip() {
        let store = InMemoryStore::new();
        let cursor = SyncCursor::new(99, Some("z".into()));
        store.set_cursor(WORDS, &cursor).unwrap();
        assert_eq!(store.cursor(WORDS).unwrap(), cursor);
    }
}
