//! The record tables shared by every store implementation.

use crate::error::{StorageError, StorageResult};
use crate::store::{StatusUpdate, UpsertOutcome};
use lexis_sync_protocol::{MergePolicy, Payload, SyncCursor, SyncRecord, SyncStatus, SyncStream};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// One table per stream.
///
/// Stores wrap a `Table` in a lock; the table itself is plain data so it
/// can be snapshotted to disk as one JSON document.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub(crate) struct Table {
    #[serde(default)]
    streams: BTreeMap<SyncStream, StreamTable>,
}

/// Records of one stream keyed by uid, plus that stream's cursor.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
struct StreamTable {
    #[serde(default)]
    last_id: i64,
    #[serde(default)]
    records: BTreeMap<String, SyncRecord>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    cursor: Option<SyncCursor>,
}

impl Table {
    fn stream(&self, stream: SyncStream) -> Option<&StreamTable> {
        self.streams.get(&stream)
    }

    fn stream_mut(&mut self, stream: SyncStream) -> &mut StreamTable {
        self.streams.entry(stream).or_default()
    }

    fn records(&self, stream: SyncStream) -> impl Iterator<Item = &SyncRecord> {
        self.stream(stream)
            .into_iter()
            .flat_map(|table| table.records.values())
    }

    pub(crate) fn unsynced(&self, stream: SyncStream) -> Vec<SyncRecord> {
        let mut pending: Vec<SyncRecord> = self
            .records(stream)
            .filter(|r| r.needs_push())
            .cloned()
            .collect();
        pending.sort_by_key(|r| (r.updated_at, r.id));
        pending
    }

    pub(crate) fn update_status(
        &mut self,
        stream: SyncStream,
        uid: &str,
        update: &StatusUpdate,
    ) -> StorageResult<bool> {
        let Some(record) = self
            .streams
            .get_mut(&stream)
            .and_then(|table| table.records.get_mut(uid))
        else {
            return Ok(false);
        };
        if record.updated_at != update.observed_updated_at {
            return Ok(false);
        }
        if !record.sync_status.can_transition_to(update.status) {
            return Err(StorageError::InvalidTransition {
                uid: uid.to_string(),
                from: record.sync_status,
                to: update.status,
            });
        }

        record.sync_status = update.status;
        record.retry_count = update.retry_count;
        if let Some(at) = update.last_sync_attempt {
            record.last_sync_attempt = Some(at);
        }
        Ok(true)
    }

    pub(crate) fn upsert(
        &mut self,
        stream: SyncStream,
        incoming: &[SyncRecord],
        policy: MergePolicy,
    ) -> UpsertOutcome {
        let mut outcome = UpsertOutcome::default();
        if incoming.is_empty() {
            return outcome;
        }
        let table = self.stream_mut(stream);

        for record in incoming {
            let existing = table.records.get(&record.uid);
            if !policy.should_apply(existing, record) {
                outcome.skipped += 1;
                continue;
            }

            let mut stored = record.clone();
            stored.retry_count = 0;
            if stored.is_tombstone() {
                stored.last_sync_attempt = Some(stored.updated_at);
            } else {
                stored.sync_status = SyncStatus::Synced;
            }

            match existing {
                Some(local) => {
                    stored.id = local.id;
                    outcome.updated += 1;
                }
                None => {
                    table.last_id += 1;
                    stored.id = table.last_id;
                    outcome.inserted += 1;
                }
            }
            table.records.insert(stored.uid.clone(), stored);
        }

        outcome
    }

    pub(crate) fn insert(
        &mut self,
        stream: SyncStream,
        mut record: SyncRecord,
    ) -> StorageResult<SyncRecord> {
        if self
            .stream(stream)
            .is_some_and(|table| table.records.contains_key(&record.uid))
        {
            return Err(StorageError::Duplicate(record.uid));
        }
        let table = self.stream_mut(stream);
        table.last_id += 1;
        record.id = table.last_id;
        table.records.insert(record.uid.clone(), record.clone());
        Ok(record)
    }

    pub(crate) fn edit(
        &mut self,
        stream: SyncStream,
        uid: &str,
        payload: Payload,
        now: i64,
    ) -> StorageResult<SyncRecord> {
        let record = self.existing_mut(stream, uid)?;
        if !record.sync_status.can_transition_to(SyncStatus::Pending) {
            return Err(StorageError::InvalidTransition {
                uid: uid.to_string(),
                from: record.sync_status,
                to: SyncStatus::Pending,
            });
        }
        record.payload = payload;
        record.sync_status = SyncStatus::Pending;
        record.touch(now);
        Ok(record.clone())
    }

    pub(crate) fn soft_delete(
        &mut self,
        stream: SyncStream,
        uid: &str,
        now: i64,
    ) -> StorageResult<SyncRecord> {
        let record = self.existing_mut(stream, uid)?;
        record.sync_status = SyncStatus::Deleted;
        record.retry_count = 0;
        record.touch(now);
        Ok(record.clone())
    }

    pub(crate) fn hard_delete(&mut self, stream: SyncStream, uid: &str) -> bool {
        self.streams
            .get_mut(&stream)
            .is_some_and(|table| table.records.remove(uid).is_some())
    }

    pub(crate) fn get(&self, stream: SyncStream, uid: &str) -> Option<SyncRecord> {
        self.stream(stream)
            .and_then(|table| table.records.get(uid))
            .cloned()
    }

    pub(crate) fn list(&self, stream: SyncStream) -> Vec<SyncRecord> {
        let mut live: Vec<SyncRecord> = self
            .records(stream)
            .filter(|r| !r.is_tombstone())
            .cloned()
            .collect();
        live.sort_by_key(|r| r.id);
        live
    }

    pub(crate) fn pending_count(&self, stream: SyncStream) -> usize {
        self.records(stream).filter(|r| r.needs_push()).count()
    }

    pub(crate) fn cursor(&self, stream: SyncStream) -> SyncCursor {
        self.stream(stream)
            .and_then(|table| table.cursor.clone())
            .unwrap_or_default()
    }

    pub(crate) fn set_cursor(&mut self, stream: SyncStream, cursor: &SyncCursor) {
        self.stream_mut(stream).cursor = Some(cursor.clone());
    }

    pub(crate) fn reset_cursors(&mut self) -> bool {
        let mut changed = false;
        for table in self.streams.values_mut() {
            changed |= table.cursor.take().is_some();
        }
        changed
    }

    fn existing_mut(&mut self, stream: SyncStream, uid: &str) -> StorageResult<&mut SyncRecord> {
        self.streams
            .get_mut(&stream)
            .and_then(|table| table.records.get_mut(uid))
            .ok_or_else(|| StorageError::NotFound(uid.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;
    use serde_json::json;

    const WORDS: SyncStream = SyncStream::Words;

    fn record(uid: &str, updated_at: i64) -> SyncRecord {
        let mut payload = Payload::new();
        payload.insert("word".into(), json!(uid));
        SyncRecord::new(uid, updated_at, payload)
    }

    #[test]
    fn insert_assigns_sequential_ids() {
        let mut table = Table::default();
        assert_eq!(table.insert(WORDS, record("a", 1)).unwrap().id, 1);
        assert_eq!(table.insert(WORDS, record("b", 1)).unwrap().id, 2);
        assert!(matches!(
            table.insert(WORDS, record("a", 5)),
            Err(StorageError::Duplicate(_))
        ));
    }

    #[test]
    fn records_are_partitioned_by_stream() {
        let mut table = Table::default();
        table.insert(WORDS, record("w", 1)).unwrap();
        let category = table.insert(SyncStream::Categories, record("c", 2)).unwrap();
        assert_eq!(category.id, 1);

        let uids = |stream: SyncStream| -> Vec<String> {
            table.unsynced(stream).into_iter().map(|r| r.uid).collect()
        };
        assert_eq!(uids(WORDS), vec!["w"]);
        assert_eq!(uids(SyncStream::Categories), vec!["c"]);
        assert!(uids(SyncStream::NoteCategories).is_empty());
        assert!(table.get(SyncStream::Categories, "w").is_none());
        assert_eq!(table.pending_count(WORDS), 1);

        // The same uid may exist in two streams.
        table.insert(SyncStream::Categories, record("w", 3)).unwrap();
        table.upsert(
            SyncStream::Categories,
            &[record("w", 9).with_status(SyncStatus::Synced)],
            MergePolicy::LastWriteWins,
        );
        assert_eq!(table.get(WORDS, "w").unwrap().sync_status, SyncStatus::Pending);
        assert_eq!(table.get(WORDS, "w").unwrap().updated_at, 1);
        assert!(table.hard_delete(SyncStream::Categories, "w"));
        assert!(table.get(WORDS, "w").is_some());
    }

    #[test]
    fn unsynced_is_ordered_by_change_time() {
        let mut table = Table::default();
        table.insert(WORDS, record("late", 30)).unwrap();
        table.insert(WORDS, record("early", 10)).unwrap();
        table
            .insert(WORDS, record("done", 20).with_status(SyncStatus::Synced))
            .unwrap();

        let uids: Vec<_> = table.unsynced(WORDS).into_iter().map(|r| r.uid).collect();
        assert_eq!(uids, vec!["early", "late"]);
    }

    #[test]
    fn status_update_skips_concurrent_edit() {
        let mut table = Table::default();
        table.insert(WORDS, record("a", 10)).unwrap();
        table.edit(WORDS, "a", Payload::new(), 11).unwrap();

        let update = StatusUpdate::new(SyncStatus::InProgress, 10);
        assert!(!table.update_status(WORDS, "a", &update).unwrap());
        assert_eq!(table.get(WORDS, "a").unwrap().sync_status, SyncStatus::Pending);

        let update = StatusUpdate::new(SyncStatus::InProgress, 11);
        assert!(table.update_status(WORDS, "a", &update).unwrap());
    }

    #[test]
    fn status_update_rejects_invalid_transition() {
        let mut table = Table::default();
        table.insert(WORDS, record("a", 10)).unwrap();

        let update = StatusUpdate::new(SyncStatus::Synced, 10);
        assert!(matches!(
            table.update_status(WORDS, "a", &update),
            Err(StorageError::InvalidTransition { .. })
        ));
    }

    #[test]
    fn status_update_on_missing_record() {
        let mut table = Table::default();
        table.insert(WORDS, record("a", 10)).unwrap();
        let update = StatusUpdate::new(SyncStatus::InProgress, 10);
        assert!(!table.update_status(WORDS, "ghost", &update).unwrap());
        assert!(!table
            .update_status(SyncStream::Categories, "a", &update)
            .unwrap());
    }

    #[test]
    fn upsert_preserves_local_id_and_marks_synced() {
        let mut table = Table::default();
        table.insert(WORDS, record("a", 10)).unwrap();

        let outcome = table.upsert(
            WORDS,
            &[record("a", 20), record("b", 15)],
            MergePolicy::LastWriteWins,
        );
        assert_eq!(outcome.updated, 1);
        assert_eq!(outcome.inserted, 1);

        let a = table.get(WORDS, "a").unwrap();
        assert_eq!(a.id, 1);
        assert_eq!(a.updated_at, 20);
        assert_eq!(a.sync_status, SyncStatus::Synced);
        assert_eq!(table.get(WORDS, "b").unwrap().id, 2);
        assert_eq!(table.pending_count(WORDS), 0);
    }

    #[test]
    fn upsert_keeps_newer_local_edit() {
        let mut table = Table::default();
        table.insert(WORDS, record("a", 50)).unwrap();

        let outcome = table.upsert(WORDS, &[record("a", 40)], MergePolicy::LastWriteWins);
        assert_eq!(outcome.skipped, 1);
        assert_eq!(table.get(WORDS, "a").unwrap().sync_status, SyncStatus::Pending);

        let outcome = table.upsert(WORDS, &[record("a", 40)], MergePolicy::ServerWins);
        assert_eq!(outcome.updated, 1);
        assert_eq!(table.get(WORDS, "a").unwrap().updated_at, 40);
    }

    #[test]
    fn pulled_tombstone_is_acknowledged() {
        let mut table = Table::default();
        table.insert(WORDS, record("a", 10)).unwrap();
        table.upsert(
            WORDS,
            &[record("a", 20).with_status(SyncStatus::Deleted)],
            MergePolicy::LastWriteWins,
        );

        let a = table.get(WORDS, "a").unwrap();
        assert!(a.is_acknowledged_tombstone());
        assert!(table.unsynced(WORDS).is_empty());
        assert!(table.list(WORDS).is_empty());
    }

    #[test]
    fn soft_delete_queues_tombstone_and_blocks_edits() {
        let mut table = Table::default();
        table
            .insert(WORDS, record("a", 10).with_status(SyncStatus::Synced))
            .unwrap();

        let deleted = table.soft_delete(WORDS, "a", 12).unwrap();
        assert_eq!(deleted.sync_status, SyncStatus::Deleted);
        assert_eq!(deleted.updated_at, 12);
        assert_eq!(table.pending_count(WORDS), 1);
        assert!(matches!(
            table.edit(WORDS, "a", Payload::new(), 13),
            Err(StorageError::InvalidTransition { .. })
        ));
        assert!(table.hard_delete(WORDS, "a"));
        assert!(!table.hard_delete(WORDS, "a"));
    }

    #[test]
    fn cursors_are_per_stream() {
        let mut table = Table::default();
        table.set_cursor(WORDS, &SyncCursor::new(5, Some("x".into())));
        assert_eq!(table.cursor(WORDS).last_sync_time, 5);
        assert!(table.cursor(SyncStream::Categories).is_initial());

        assert!(table.reset_cursors());
        assert!(table.cursor(WORDS).is_initial());
        assert!(!table.reset_cursors());
    }

    #[test]
    fn snapshot_nests_records_under_stream_names() {
        let mut table = Table::default();
        table.insert(SyncStream::NoteCategories, record("n", 1)).unwrap();
        let value = serde_json::to_value(&table).unwrap();
        assert_eq!(value["streams"]["note_categories"]["records"]["n"]["uid"], "n");
        assert!(value["streams"].get("words").is_none());
    }

    fn page_strategy() -> impl Strategy<Value = Vec<(u8, i64)>> {
        prop::collection::vec((0u8..8, 0i64..100), 0..20)
    }

    proptest! {
        #[test]
        fn upsert_is_idempotent(
            local in page_strategy(),
            page in page_strategy(),
            server_wins in any::<bool>(),
        ) {
            let policy = if server_wins { MergePolicy::ServerWins } else { MergePolicy::LastWriteWins };
            let mut table = Table::default();
            for (uid, at) in local {
                let _ = table.insert(WORDS, record(&format!("u{uid}"), at));
            }
            let page: Vec<SyncRecord> = page
                .into_iter()
                .map(|(uid, at)| record(&format!("u{uid}"), at))
                .collect();

            table.upsert(WORDS, &page, policy);
            let once = table.clone();
            table.upsert(WORDS, &page, policy);
            prop_assert_eq!(table, once);
        }
    }
}
