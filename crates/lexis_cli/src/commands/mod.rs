//! CLI command implementations.

pub mod add;
pub mod delete;
pub mod edit;
pub mod list;
pub mod reset_cursor;
pub mod status;
pub mod sync;

use crate::Format;
use lexis_storage::FileStore;
use lexis_sync_engine::{
    ConnectivityFlag, HttpTransport, JobReport, JobState, ReqwestClient, SyncConfig, SyncCoordinator,
    SyncEvent,
};
use lexis_sync_protocol::{SyncRecord, SyncStream, Word};
use serde::Serialize;
use std::error::Error;
use std::path::Path;
use std::sync::Arc;

/// Result type of command implementations.
pub type CommandResult<T> = Result<T, Box<dyn Error>>;

/// Remote endpoint settings from flags and environment.
#[derive(Debug, Clone)]
pub struct Remote {
    /// Base URL of the sync API.
    pub api_url: Option<String>,
    /// API key.
    pub api_key: Option<String>,
    /// Secret key.
    pub secret_key: Option<String>,
    /// Stream to sync.
    pub stream: SyncStream,
    /// Whether to treat the network as down.
    pub offline: bool,
}

/// Shared state of one CLI invocation.
pub struct Context {
    store: Arc<FileStore>,
    remote: Remote,
    format: Format,
}

impl Context {
    /// Opens the store at `path`, creating parent directories.
    pub fn open(path: &Path, remote: Remote, format: Format) -> CommandResult<Self> {
        let store = FileStore::open_with_create_dirs(path)?;
        Ok(Self {
            store: Arc::new(store),
            remote,
            format,
        })
    }

    /// Returns the local store.
    pub fn store(&self) -> &FileStore {
        &self.store
    }

    /// Returns the stream selected with `--stream`.
    pub fn stream(&self) -> SyncStream {
        self.remote.stream
    }

    /// Builds the sync configuration for the selected stream.
    pub fn config(&self) -> CommandResult<SyncConfig> {
        self.config_for(self.stream())
    }

    /// Builds the sync configuration for `stream`.
    pub fn config_for(&self, stream: SyncStream) -> CommandResult<SyncConfig> {
        let url = self
            .remote
            .api_url
            .as_deref()
            .ok_or("API URL required (--api-url or LEXIS_API_URL)")?;
        let mut config = SyncConfig::new(url).with_stream(stream);
        config.api_key = self.remote.api_key.clone();
        config.secret_key = self.remote.secret_key.clone();
        Ok(config)
    }

    /// Builds a coordinator for the selected stream.
    pub fn coordinator(&self) -> CommandResult<SyncCoordinator> {
        self.coordinator_for(self.stream())
    }

    /// Builds a coordinator syncing `stream` with the remote API over HTTP.
    pub fn coordinator_for(&self, stream: SyncStream) -> CommandResult<SyncCoordinator> {
        let config = self.config_for(stream)?;
        let client = ReqwestClient::new(config.request_timeout)?;
        let transport = HttpTransport::from_config(&config, client)?;
        let connectivity = ConnectivityFlag::new(!self.remote.offline);
        Ok(SyncCoordinator::with_blocking_store(
            config,
            Arc::clone(&self.store),
            Arc::new(transport),
            Arc::new(connectivity),
        ))
    }

    /// Prints `value` as JSON, or with `text` in text mode.
    pub fn print<T: Serialize>(&self, value: &T, text: impl FnOnce(&T)) -> CommandResult<()> {
        match self.format {
            Format::Json => println!("{}", serde_json::to_string_pretty(value)?),
            Format::Text => text(value),
        }
        Ok(())
    }

    /// Prints the outcome of a sync run; fails if the run failed.
    pub fn report_run(&self, event: &SyncEvent) -> CommandResult<()> {
        self.print(&RunSummary::from_event(event), print_run_text)?;
        if event.state == JobState::Failed {
            let error = event.error.as_deref().unwrap_or("unknown error");
            return Err(format!("{} failed: {error}", event.kind).into());
        }
        Ok(())
    }
}

/// Serializable outcome of one sync run.
#[derive(Debug, Serialize)]
pub struct RunSummary {
    /// Job kind.
    pub kind: &'static str,
    /// Run identifier.
    pub run_id: u64,
    /// Terminal state.
    pub state: &'static str,
    /// Why the run stopped.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub stop: Option<String>,
    /// Records acknowledged by the server.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub synced: Option<usize>,
    /// Records left FAILED.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub failed: Option<usize>,
    /// Pages received.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub pages: Option<usize>,
    /// Pulled records written locally.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub applied: Option<usize>,
    /// Failure message.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl RunSummary {
    /// Summarises a terminal event.
    pub fn from_event(event: &SyncEvent) -> Self {
        let mut summary = Self {
            kind: event.kind.as_str(),
            run_id: event.run_id,
            state: event.state.as_str(),
            stop: None,
            synced: None,
            failed: None,
            pages: None,
            applied: None,
            error: event.error.clone(),
        };
        match &event.report {
            Some(JobReport::Push(report)) => {
                summary.stop = Some(format!("{:?}", report.stop));
                summary.synced = Some(report.synced);
                summary.failed = Some(report.failed);
            }
            Some(JobReport::Pull(report)) => {
                summary.stop = Some(format!("{:?}", report.exit));
                summary.pages = Some(report.pages);
                summary.applied = Some(report.applied);
            }
            None => {}
        }
        summary
    }
}

fn print_run_text(summary: &RunSummary) {
    let mut line = format!("{} #{}: {}", summary.kind, summary.run_id, summary.state);
    if let Some(stop) = &summary.stop {
        line.push_str(&format!(" ({stop})"));
    }
    if let (Some(synced), Some(failed)) = (summary.synced, summary.failed) {
        line.push_str(&format!(", {synced} synced, {failed} failed"));
    }
    if let (Some(pages), Some(applied)) = (summary.pages, summary.applied) {
        line.push_str(&format!(", {pages} pages, {applied} records applied"));
    }
    if let Some(error) = &summary.error {
        line.push_str(&format!(": {error}"));
    }
    println!("{line}");
}

/// Prints one record as a text line.
pub fn print_record_line(record: &SyncRecord) {
    match Word::from_record(record) {
        Ok(word) if word.short_meaning.is_empty() => {
            println!("{}  {:<11}  {}", record.uid, record.sync_status.as_str(), word.word)
        }
        Ok(word) => println!(
            "{}  {:<11}  {}: {}",
            record.uid,
            record.sync_status.as_str(),
            word.word,
            word.short_meaning
        ),
        Err(_) => println!(
            "{}  {:<11}  {}",
            record.uid,
            record.sync_status.as_str(),
            serde_json::Value::Object(record.payload.clone())
        ),
    }
}
