//! File-based store for persistent storage.

use crate::error::{StorageError, StorageResult};
use crate::store::{CursorStore, RecordStore, StatusUpdate, UpsertOutcome};
use crate::table::Table;
use fs2::FileExt;
use lexis_sync_protocol::{
    now_millis, MergePolicy, Payload, SyncCursor, SyncRecord, SyncStream,
};
use parking_lot::RwLock;
use std::fs::{self, File, OpenOptions};
use std::io::Write;
use std::path::{Path, PathBuf};

/// A file-based record and cursor store.
///
/// The whole table is kept in memory and written to disk as one JSON
/// document after every mutation that changes it. Data survives process
/// restarts.
///
/// # Durability
///
/// Each write goes to a sibling temp file which is `sync_all`ed and then
/// renamed over the store file, so a crash leaves either the old or the new
/// snapshot, never a torn one. If the write fails the in-memory table is
/// reloaded from the last snapshot.
///
/// Every committed mutation rewrites the full snapshot, so a push run over
/// `n` pending records writes `O(n)` snapshots. This suits a personal
/// vocabulary; larger data sets want an append-only log.
///
/// # Locking
///
/// The store holds an exclusive advisory lock on a sibling `.lock` file for
/// as long as it is open. A second `FileStore` on the same path, in this or
/// another process, fails with [`StorageError::Locked`].
///
/// # Thread Safety
///
/// This store is thread-safe and can be shared across threads. Writers are
/// serialized by an internal lock held across the disk write.
///
/// # Example
///
/// ```no_run
/// use lexis_storage::{FileStore, RecordStore};
/// use lexis_sync_protocol::SyncStream;
/// use std::path::Path;
///
/// let store = FileStore::open(Path::new("lexis.json")).unwrap();
/// println!("{} pending", store.pending_count(SyncStream::Words).unwrap());
/// ```
#[derive(Debug)]
pub struct FileStore {
    path: PathBuf,
    table: RwLock<Table>,
    /// Held for exclusive access; released on drop.
    _lock_file: File,
}

impl FileStore {
    /// Opens the store at `path`, starting empty if the file doesn't exist.
    ///
    /// # Errors
    ///
    /// Returns an error if:
    /// - Another store holds the lock ([`StorageError::Locked`])
    /// - The file exists but cannot be read
    /// - It is not a valid snapshot ([`StorageError::Corrupted`])
    pub fn open(path: &Path) -> StorageResult<Self> {
        let lock_file = OpenOptions::new()
            .create(true)
            .truncate(false)
            .write(true)
            .open(path.with_extension("lock"))?;
        if lock_file.try_lock_exclusive().is_err() {
            return Err(StorageError::Locked(path.display().to_string()));
        }

        let table = Self::load(path)?;
        Ok(Self {
            path: path.to_path_buf(),
            table: RwLock::new(table),
            _lock_file: lock_file,
        })
    }

    /// Opens the store, creating parent directories if needed.
    ///
    /// # Errors
    ///
    /// Returns an error if directories cannot be created or the file cannot be opened.
    pub fn open_with_create_dirs(path: &Path) -> StorageResult<Self> {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }
        Self::open(path)
    }

    /// Returns the path to the store file.
    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }

    fn load(path: &Path) -> StorageResult<Table> {
        match fs::read(path) {
            Ok(bytes) if bytes.is_empty() => Ok(Table::default()),
            Ok(bytes) => serde_json::from_slice(&bytes)
                .map_err(|e| StorageError::Corrupted(format!("{}: {e}", path.display()))),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(Table::default()),
            Err(e) => Err(e.into()),
        }
    }

    /// Applies `apply` to the table and persists it when `changed` says the
    /// result modified it.
    ///
    /// Table operations validate before they write, so an `Err` from
    /// `apply` leaves the table untouched.
    fn mutate<T>(
        &self,
        apply: impl FnOnce(&mut Table) -> StorageResult<T>,
        changed: impl FnOnce(&T) -> bool,
    ) -> StorageResult<T> {
        let mut table = self.table.write();
        let value = apply(&mut *table)?;
        if changed(&value) {
            if let Err(e) = self.persist(&*table) {
                if let Ok(previous) = Self::load(&self.path) {
                    *table = previous;
                }
                return Err(e);
            }
        }
        Ok(value)
    }

    fn persist(&self, table: &Table) -> StorageResult<()> {
        let bytes = serde_json::to_vec(table)?;
        let tmp = self.path.with_extension("tmp");
        {
            let mut file = File::create(&tmp)?;
            file.write_all(&bytes)?;
            file.sync_all()?;
        }
        fs::rename(&tmp, &self.path)?;
        Ok(())
    }
}

fn always<T>(_: &T) -> bool {
    true
}

impl RecordStore for FileStore {
    fn unsynced_records(&self, stream: SyncStream) -> StorageResult<Vec<SyncRecord>> {
        Ok(self.table.read().unsynced(stream))
    }

    fn update_sync_status(
        &self,
        stream: SyncStream,
        uid: &str,
        update: &StatusUpdate,
    ) -> StorageResult<bool> {
        self.mutate(
            |table| table.update_status(stream, uid, update),
            |written| *written,
        )
    }

    fn upsert_records(
        &self,
        stream: SyncStream,
        records: &[SyncRecord],
        policy: MergePolicy,
    ) -> StorageResult<UpsertOutcome> {
        self.mutate(
            |table| Ok(table.upsert(stream, records, policy)),
            |outcome| outcome.applied() > 0,
        )
    }

    fn insert(&self, stream: SyncStream, record: SyncRecord) -> StorageResult<SyncRecord> {
        self.mutate(|table| table.insert(stream, record), always)
    }

    fn edit(&self, stream: SyncStream, uid: &str, payload: Payload) -> StorageResult<SyncRecord> {
        self.mutate(|table| table.edit(stream, uid, payload, now_millis()), always)
    }

    fn soft_delete(&self, stream: SyncStream, uid: &str) -> StorageResult<SyncRecord> {
        self.mutate(|table| table.soft_delete(stream, uid, now_millis()), always)
    }

    fn hard_delete(&self, stream: SyncStream, uid: &str) -> StorageResult<bool> {
        self.mutate(|table| Ok(table.hard_delete(stream, uid)), |removed| *removed)
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

impl CursorStore for FileStore {
    fn cursor(&self, stream: SyncStream) -> StorageResult<SyncCursor> {
        Ok(self.table.read().cursor(stream))
    }

    fn set_cursor(&self, stream: SyncStream, cursor: &SyncCursor) -> StorageResult<()> {
        self.mutate(
            |table| {
                table.set_cursor(stream, cursor);
                Ok(())
            },
            always,
        )
    }

    fn reset_cursors(&self) -> StorageResult<()> {
        self.mutate(|table| Ok(table.reset_cursors()), |changed| *changed)
            .map(|_| ())
    }
}
