//! Edit command implementation.

use super::{print_record_line, CommandResult, Context};
use lexis_storage::RecordStore;
use lexis_sync_protocol::{SyncRecord, SyncStream, Word};

/// Field changes given on the command line; `None` keeps the stored value.
#[derive(Debug, Default)]
pub struct WordChanges {
    /// New spelling.
    pub word: Option<String>,
    /// New short meaning.
    pub meaning: Option<String>,
    /// New explanation.
    pub details: Option<String>,
    /// New usage examples.
    pub examples: Option<String>,
    /// New favorite flag.
    pub favorite: Option<bool>,
    /// New proficiency level.
    pub proficiency: Option<String>,
}

impl WordChanges {
    fn is_empty(&self) -> bool {
        self.word.is_none()
            && self.meaning.is_none()
            && self.details.is_none()
            && self.examples.is_none()
            && self.favorite.is_none()
            && self.proficiency.is_none()
    }

    fn apply(self, word: &mut Word) {
        if let Some(value) = self.word {
            word.word = value;
        }
        if let Some(value) = self.meaning {
            word.short_meaning = value;
        }
        if let Some(value) = self.details {
            word.details = value;
        }
        if let Some(value) = self.examples {
            word.examples = value;
        }
        if let Some(value) = self.favorite {
            word.is_favorite = value;
        }
        if let Some(value) = self.proficiency {
            word.proficiency_level = value;
        }
    }
}

/// Applies `changes` to the word `uid`, marking it PENDING.
pub fn save(store: &impl RecordStore, uid: &str, changes: WordChanges) -> CommandResult<SyncRecord> {
    if changes.is_empty() {
        return Err("nothing to change".into());
    }
    let current = store
        .get(SyncStream::Words, uid)?
        .ok_or_else(|| format!("no word with uid {uid}"))?;
    let mut word = Word::from_record(&current)?;
    changes.apply(&mut word);
    Ok(store.edit(SyncStream::Words, uid, word.to_payload()?)?)
}

/// Runs the edit command.
pub async fn run(ctx: &Context, uid: &str, changes: WordChanges, push: bool) -> CommandResult<()> {
    let record = save(ctx.store(), uid, changes)?;
    ctx.print(&record, print_record_line)?;

    if push {
        let coordinator = ctx.coordinator_for(SyncStream::Words)?;
        let event = coordinator.start_push().wait().await;
        ctx.report_run(&event)?;
    }
    Ok(())
}
