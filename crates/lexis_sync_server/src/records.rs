//! Server-side record storage.

use lexis_sync_protocol::{PullQuery, SyncRecord, SyncStatus, SyncStream};
use parking_lot::RwLock;
use std::collections::{BTreeSet, HashMap};
use std::ops::Bound;

/// Records of one stream: current version by uid plus a pull-order index.
#[derive(Debug, Default)]
struct StreamLog {
    by_uid: HashMap<String, SyncRecord>,
    order: BTreeSet<(i64, String)>,
}

/// Server-side record log.
///
/// Holds the latest version of every record per stream. Pull order is
/// `(updatedAt, uid)`, so a cursor at the last record of a page resumes
/// exactly after it.
#[derive(Debug, Default)]
pub struct RecordLog {
    streams: RwLock<HashMap<SyncStream, StreamLog>>,
}

impl RecordLog {
    /// Creates an empty log.
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates or replaces a record. Returns true if the uid was new.
    ///
    /// Client bookkeeping is dropped: stored records are SYNCED, or DELETED
    /// for tombstones, with no retry history.
    pub fn put(&self, stream: SyncStream, mut record: SyncRecord) -> bool {
        record.id = 0;
        record.retry_count = 0;
        record.last_sync_attempt = None;
        if record.sync_status != SyncStatus::Deleted {
            record.sync_status = SyncStatus::Synced;
        }

        let mut streams = self.streams.write();
        let log = streams.entry(stream).or_default();
        let key = (record.updated_at, record.uid.clone());
        let previous = log.by_uid.insert(record.uid.clone(), record);
        if let Some(previous) = previous.as_ref() {
            log.order.remove(&(previous.updated_at, previous.uid.clone()));
        }
        log.order.insert(key);
        previous.is_none()
    }

    /// Returns up to `limit` records after `query`, and whether more follow.
    pub fn page(&self, stream: SyncStream, query: &PullQuery, limit: usize) -> (Vec<SyncRecord>, bool) {
        let streams = self.streams.read();
        let Some(log) = streams.get(&stream) else {
            return (Vec::new(), false);
        };

        let start = (query.since, query.last_id.clone().unwrap_or_default());
        let mut keys = log
            .order
            .range((Bound::Excluded(start), Bound::Unbounded));
        let data: Vec<SyncRecord> = keys
            .by_ref()
            .take(limit)
            .filter_map(|(_, uid)| log.by_uid.get(uid).cloned())
            .collect();
        let has_more = keys.next().is_some();
        (data, has_more)
    }

    /// Returns the current version of a record.
    pub fn get(&self, stream: SyncStream, uid: &str) -> Option<SyncRecord> {
        self.streams
            .read()
            .get(&stream)
            .and_then(|log| log.by_uid.get(uid).cloned())
    }

    /// Returns the number of records in a stream.
    pub fn len(&self, stream: SyncStream) -> usize {
        self.streams
            .read()
            .get(&stream)
            .map_or(0, |log| log.by_uid.len())
    }

    /// Returns true if no stream holds any record.
    pub fn is_empty(&self) -> bool {
        self.streams.read().values().all(|log| log.by_uid.is_empty())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use lexis_sync_protocol::Payload;

    fn record(uid: &str, updated_at: i64) -> SyncRecord {
        SyncRecord::new(uid, updated_at, Payload::new())
    }

    fn uids(records: &[SyncRecord]) -> Vec<&str> {
        records.iter().map(|r| r.uid.as_str()).collect()
    }

    #[test]
    fn put_normalises_bookkeeping() {
        let log = RecordLog::new();
        let mut incoming = record("a", 10).with_status(SyncStatus::InProgress);
        incoming.retry_count = 4;
        incoming.id = 9;

        assert!(log.put(SyncStream::Words, incoming));
        let stored = log.get(SyncStream::Words, "a").unwrap();
        assert_eq!(stored.sync_status, SyncStatus::Synced);
        assert_eq!(stored.retry_count, 0);
        assert_eq!(stored.id, 0);

        log.put(SyncStream::Words, record("b", 11).with_status(SyncStatus::Deleted));
        assert_eq!(
            log.get(SyncStream::Words, "b").unwrap().sync_status,
            SyncStatus::Deleted
        );
    }

    #[test]
    fn replace_moves_record_in_pull_order() {
        let log = RecordLog::new();
        log.put(SyncStream::Words, record("a", 10));
        log.put(SyncStream::Words, record("b", 20));
        assert!(!log.put(SyncStream::Words, record("a", 30)));

        let (page, has_more) = log.page(SyncStream::Words, &PullQuery::default(), 10);
        assert_eq!(uids(&page), ["b", "a"]);
        assert!(!has_more);
        assert_eq!(log.len(SyncStream::Words), 2);
    }

    #[test]
    fn replace_with_same_timestamp_keeps_single_entry() {
        let log = RecordLog::new();
        log.put(SyncStream::Words, record("a", 10));
        log.put(SyncStream::Words, record("a", 10));

        let (page, _) = log.page(SyncStream::Words, &PullQuery::default(), 10);
        assert_eq!(uids(&page), ["a"]);
    }

    #[test]
    fn pages_break_ties_by_uid() {
        let log = RecordLog::new();
        for uid in ["c", "a", "b"] {
            log.put(SyncStream::Words, record(uid, 100));
        }
        log.put(SyncStream::Words, record("d", 200));

        let (first, has_more) = log.page(SyncStream::Words, &PullQuery::default(), 2);
        assert_eq!(uids(&first), ["a", "b"]);
        assert!(has_more);

        let next = PullQuery {
            since: 100,
            last_id: Some("b".into()),
        };
        let (second, has_more) = log.page(SyncStream::Words, &next, 2);
        assert_eq!(uids(&second), ["c", "d"]);
        assert!(!has_more);
    }

    #[test]
    fn streams_are_independent() {
        let log = RecordLog::new();
        log.put(SyncStream::Categories, record("x", 1));

        assert_eq!(log.len(SyncStream::Words), 0);
        assert!(log.get(SyncStream::Words, "x").is_none());
        assert!(!log.is_empty());
        let (page, has_more) = log.page(SyncStream::Words, &PullQuery::default(), 5);
        assert!(page.is_empty() && !has_more);
    }
}
