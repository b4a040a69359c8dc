//! List command implementation.

use super::{print_record_line, CommandResult, Context};
use lexis_storage::RecordStore;
use lexis_sync_protocol::{SyncRecord, SyncStream};

/// Returns the records of `stream` to show.
///
/// `pending` selects records still waiting to be pushed, tombstones
/// included; otherwise all live records are returned.
pub fn select(
    store: &impl RecordStore,
    stream: SyncStream,
    pending: bool,
) -> CommandResult<Vec<SyncRecord>> {
    let records = if pending {
        store.unsynced_records(stream)?
    } else {
        store.list(stream)?
    };
    Ok(records)
}

/// Runs the list command on the selected stream.
pub fn run(ctx: &Context, pending: bool) -> CommandResult<()> {
    let records = select(ctx.store(), ctx.stream(), pending)?;
    ctx.print(&records, |records| {
        if records.is_empty() {
            println!("no {}", ctx.stream());
        }
        for record in records {
            print_record_line(record);
        }
    })
}
