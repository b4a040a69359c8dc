//! Status command implementation.

use super::{CommandResult, Context};
use lexis_storage::{CursorStore, RecordStore};
use lexis_sync_protocol::{SyncStatus, SyncStream};
use serde::Serialize;
use std::collections::BTreeMap;

/// Sync status of the local store.
#[derive(Debug, Serialize)]
pub struct StatusReport {
    /// Store file.
    pub store: String,
    /// Records waiting to be pushed across all streams.
    pub pending: usize,
    /// Status of every stream.
    pub streams: Vec<StreamStatus>,
}

/// Sync status of one stream.
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct StreamStatus {
    /// Stream name.
    pub stream: &'static str,
    /// Live records by sync status.
    pub by_status: BTreeMap<&'static str, usize>,
    /// Records waiting to be pushed, tombstones included.
    pub pending: usize,
    /// Pull watermark in epoch milliseconds.
    pub last_sync_time: i64,
    /// Tie-breaking uid of the pull cursor.
    pub last_id: Option<String>,
}

fn stream_status<S: RecordStore + CursorStore>(
    store: &S,
    stream: SyncStream,
) -> CommandResult<StreamStatus> {
    let mut by_status: BTreeMap<&'static str, usize> = SyncStatus::ALL
        .iter()
        .filter(|status| **status != SyncStatus::Deleted)
        .map(|status| (status.as_str(), 0))
        .collect();
    for record in store.list(stream)? {
        *by_status.entry(record.sync_status.as_str()).or_default() += 1;
    }
    let cursor = store.cursor(stream)?;

    Ok(StreamStatus {
        stream: stream.as_str(),
        by_status,
        pending: store.pending_count(stream)?,
        last_sync_time: cursor.last_sync_time,
        last_id: cursor.last_id,
    })
}

/// Collects the status of every stream in `store`.
pub fn collect<S: RecordStore + CursorStore>(store: &S, label: String) -> CommandResult<StatusReport> {
    let streams = SyncStream::ALL
        .into_iter()
        .map(|stream| stream_status(store, stream))
        .collect::<CommandResult<Vec<_>>>()?;

    Ok(StatusReport {
        store: label,
        pending: streams.iter().map(|s| s.pending).sum(),
        streams,
    })
}

/// Runs the status command.
pub fn run(ctx: &Context) -> CommandResult<()> {
    let report = collect(ctx.store(), ctx.store().path().display().to_string())?;
    ctx.print(&report, print_text)
}

fn print_text(report: &StatusReport) {
    println!("Lexis Sync Status");
    println!("=================");
    println!();
    println!("Store: {}", report.store);
    println!("{} items pending", report.pending);

    for stream in &report.streams {
        println!();
        println!("{} ({} pending)", stream.stream, stream.pending);
        for (status, count) in &stream.by_status {
            println!("  {status:<12} {count}");
        }
        match &stream.last_id {
            Some(last_id) => println!("  cursor       {} after {}", stream.last_sync_time, last_id),
            None if stream.last_sync_time == 0 => println!("  cursor       never pulled"),
            None => println!("  cursor       {}", stream.last_sync_time),
        }
    }
}
