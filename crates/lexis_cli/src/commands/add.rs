//! Add command implementation.

use super::{print_record_line, CommandResult, Context};
use lexis_storage::RecordStore;
use lexis_sync_protocol::{SyncRecord, SyncStream, Word};

/// Fields of a word given on the command line.
#[derive(Debug, Default)]
pub struct NewWord {
    /// The word itself.
    pub word: String,
    /// Short meaning.
    pub meaning: String,
    /// Longer explanation.
    pub details: String,
    /// Usage examples.
    pub examples: String,
    /// Favorite flag.
    pub favorite: bool,
}

impl NewWord {
    fn into_word(self) -> Word {
        let mut word = Word::new(self.word).with_meaning(self.meaning);
        word.details = self.details;
        word.examples = self.examples;
        word.is_favorite = self.favorite;
        word
    }
}

/// Inserts a new PENDING word for `fields`.
pub fn save(store: &impl RecordStore, fields: NewWord) -> CommandResult<SyncRecord> {
    if fields.word.trim().is_empty() {
        return Err("word must not be empty".into());
    }
    let record = fields.into_word().into_record()?;
    Ok(store.insert(SyncStream::Words, record)?)
}

/// Runs the add command.
pub async fn run(ctx: &Context, fields: NewWord, push: bool) -> CommandResult<()> {
    let record = save(ctx.store(), fields)?;
    ctx.print(&record, print_record_line)?;

    if push {
        let coordinator = ctx.coordinator_for(SyncStream::Words)?;
        let event = coordinator.on_record_saved().wait().await;
        ctx.report_run(&event)?;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use lexis_storage::InMemoryStore;
    use lexis_sync_protocol::SyncStatus;

    #[test]
    fn add_inserts_pending_word() {
        let store = InMemoryStore::new();
        let record = save(
            &store,
            NewWord {
                word: "limerence".into(),
                meaning: "infatuation".into(),
                favorite: true,
                ..NewWord::default()
            },
        )
        .unwrap();

        assert_eq!(record.sync_status, SyncStatus::Pending);
        assert_eq!(store.pending_count(SyncStream::Words).unwrap(), 1);
        let stored = store.get(SyncStream::Words, &record.uid).unwrap().unwrap();
        let word = Word::from_record(&stored).unwrap();
        assert_eq!(word.short_meaning, "infatuation");
        assert!(word.is_favorite);
    }

    #[test]
    fn add_rejects_blank_word() {
        let store = InMemoryStore::new();
        assert!(save(&store, NewWord::default()).is_err());
        assert_eq!(store.pending_count(SyncStream::Words).unwrap(), 0);
    }
}
