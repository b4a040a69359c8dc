//! Pull cursors and the streams they belong to.

use crate::error::ProtocolError;
use crate::record::SyncRecord;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// A family of records pulled independently, each with its own cursor.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SyncStream {
    /// Vocabulary words.
    Words,
    /// Word categories.
    Categories,
    /// Note categories.
    NoteCategories,
}

impl SyncStream {
    /// All streams.
    pub const ALL: [SyncStream; 3] = [
        SyncStream::Words,
        SyncStream::Categories,
        SyncStream::NoteCategories,
    ];

    /// Returns the stream name used in configuration and on the CLI.
    pub fn as_str(&self) -> &'static str {
        match self {
            SyncStream::Words => "words",
            SyncStream::Categories => "categories",
            SyncStream::NoteCategories => "note_categories",
        }
    }

    /// Returns the remote API resource segment for this stream.
    pub fn resource(&self) -> &'static str {
        match self {
            SyncStream::Words => "word",
            SyncStream::Categories => "category",
            SyncStream::NoteCategories => "note-category",
        }
    }

    /// Looks a stream up by its API resource segment.
    pub fn from_resource(resource: &str) -> Option<Self> {
        SyncStream::ALL
            .into_iter()
            .find(|stream| stream.resource() == resource)
    }
}

impl fmt::Display for SyncStream {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for SyncStream {
    type Err = ProtocolError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let normalized = s.replace('-', "_");
        SyncStream::ALL
            .into_iter()
            .find(|stream| stream.as_str().eq_ignore_ascii_case(&normalized))
            .ok_or_else(|| ProtocolError::UnknownStream(s.to_string()))
    }
}

/// Watermark of the last successfully applied pull page.
///
/// `last_id` breaks ties between records sharing the same `updatedAt`
/// so page boundaries neither skip nor re-fetch them.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SyncCursor {
    /// Epoch-millisecond watermark, 0 before the first pull.
    pub last_sync_time: i64,
    /// uid of the last applied record, if any.
    #[serde(default)]
    pub last_id: Option<String>,
}

impl SyncCursor {
    /// Creates a cursor at the given position.
    pub fn new(last_sync_time: i64, last_id: Option<String>) -> Self {
        Self {
            last_sync_time,
            last_id,
        }
    }

    /// Returns true if no page has ever been applied.
    pub fn is_initial(&self) -> bool {
        self.last_sync_time == 0 && self.last_id.is_none()
    }

    /// Returns the cursor positioned at the last record of a page.
    ///
    /// Returns `None` for an empty page; empty pages never move the cursor.
    pub fn after_page(page: &[SyncRecord]) -> Option<Self> {
        page.last()
            .map(|last| Self::new(last.updated_at, Some(last.uid.clone())))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::record::Payload;

    #[test]
    fn stream_names_round_trip() {
        for stream in SyncStream::ALL {
            assert_eq!(stream.as_str().parse::<SyncStream>().unwrap(), stream);
        }
        assert_eq!(
            "note-categories".parse::<SyncStream>().unwrap(),
            SyncStream::NoteCategories
        );
        assert!("notes".parse::<SyncStream>().is_err());
    }

    #[test]
    fn streams_by_resource() {
        for stream in SyncStream::ALL {
            assert_eq!(SyncStream::from_resource(stream.resource()), Some(stream));
        }
        assert_eq!(SyncStream::from_resource("words"), None);
    }

    #[test]
    fn cursor_follows_last_record() {
        let page = vec![
            SyncRecord::new("a", 10, Payload::new()),
            SyncRecord::new("b", 20, Payload::new()),
        ];
        let cursor = SyncCursor::after_page(&page).unwrap();
        assert_eq!(cursor.last_sync_time, 20);
        assert_eq!(cursor.last_id.as_deref(), Some("b"));
        assert!(SyncCursor::after_page(&[]).is_none());
    }

    #[test]
    fn default_cursor_is_initial() {
        assert!(SyncCursor::default().is_initial());
        assert!(!SyncCursor::new(5, None).is_initial());
    }
}
