//! Delete command implementation.

use super::{CommandResult, Context};
use lexis_storage::RecordStore;
use lexis_sync_protocol::SyncStream;

/// Deletes the word `uid`.
///
/// A soft delete leaves a DELETED tombstone that is pushed to the server;
/// a hard delete removes the row locally without syncing.
pub fn apply(store: &impl RecordStore, uid: &str, hard: bool) -> CommandResult<()> {
    if hard {
        if !store.hard_delete(SyncStream::Words, uid)? {
            return Err(format!("no word with uid {uid}").into());
        }
    } else {
        store.soft_delete(SyncStream::Words, uid)?;
    }
    Ok(())
}

/// Runs the delete command.
pub async fn run(ctx: &Context, uid: &str, hard: bool, push: bool) -> CommandResult<()> {
    apply(ctx.store(), uid, hard)?;
    println!("deleted {uid}{}", if hard { " (local only)" } else { "" });

    if push && !hard {
        let coordinator = ctx.coordinator_for(SyncStream::Words)?;
        let event = coordinator.start_push().wait().await;
        ctx.report_run(&event)?;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use lexis_storage::InMemoryStore;
    use lexis_sync_protocol::{SyncStatus, Word};

    fn stored(store: &InMemoryStore) -> String {
        store
            .insert(SyncStream::Words, Word::new("vellichor").into_record().unwrap())
            .unwrap()
            .uid
    }

    #[test]
    fn soft_delete_leaves_tombstone_to_push() {
        let store = InMemoryStore::new();
        let uid = stored(&store);

        apply(&store, &uid, false).unwrap();

        assert!(store.list(SyncStream::Words).unwrap().is_empty());
        let tombstone = store.get(SyncStream::Words, &uid).unwrap().unwrap();
        assert_eq!(tombstone.sync_status, SyncStatus::Deleted);
        assert_eq!(store.pending_count(SyncStream::Words).unwrap(), 1);
    }

    #[test]
    fn hard_delete_removes_row() {
        let store = InMemoryStore::new();
        let uid = stored(&store);

        apply(&store, &uid, true).unwrap();

        assert!(store.get(SyncStream::Words, &uid).unwrap().is_none());
        assert_eq!(store.pending_count(SyncStream::Words).unwrap(), 0);
        assert!(apply(&store, &uid, true).is_err());
    }
}
