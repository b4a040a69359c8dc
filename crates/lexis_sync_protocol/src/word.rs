//! Typed vocabulary payload.

use crate::error::{ProtocolError, ProtocolResult};
use crate::record::{Payload, SyncRecord};
use serde::{Deserialize, Serialize};

fn default_kind() -> String {
    "word".to_string()
}

fn default_proficiency() -> String {
    "Beginner".to_string()
}

/// A vocabulary entry, the payload of the `words` stream.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Word {
    /// The word or phrase itself.
    pub word: String,
    /// Entry kind, `"word"` unless the application says otherwise.
    #[serde(rename = "type", default = "default_kind")]
    pub kind: String,
    /// One-line meaning.
    #[serde(default)]
    pub short_meaning: String,
    /// Long-form notes.
    #[serde(default)]
    pub details: String,
    /// Example sentences.
    #[serde(default)]
    pub examples: String,
    /// Whether the user starred this entry.
    #[serde(default)]
    pub is_favorite: bool,
    /// Learner's self-assessed level.
    #[serde(default = "default_proficiency")]
    pub proficiency_level: String,
    /// Times the entry was opened.
    #[serde(default)]
    pub view_count: u32,
    /// Days since the entry was last opened.
    #[serde(default)]
    pub last_viewed_days_ago: u32,
}

impl Word {
    /// Creates an entry with default metadata.
    pub fn new(word: impl Into<String>) -> Self {
        Self {
            word: word.into(),
            kind: default_kind(),
            short_meaning: String::new(),
            details: String::new(),
            examples: String::new(),
            is_favorite: false,
            proficiency_level: default_proficiency(),
            view_count: 0,
            last_viewed_days_ago: 0,
        }
    }

    /// Sets the short meaning.
    pub fn with_meaning(mut self, meaning: impl Into<String>) -> Self {
        self.short_meaning = meaning.into();
        self
    }

    /// Converts the entry into an opaque record payload.
    pub fn to_payload(&self) -> ProtocolResult<Payload> {
        match serde_json::to_value(self)? {
            serde_json::Value::Object(map) => Ok(map),
            other => Err(ProtocolError::InvalidPayload(format!(
                "word serialized to {other}"
            ))),
        }
    }

    /// Reads the entry back out of a record.
    pub fn from_record(record: &SyncRecord) -> ProtocolResult<Self> {
        let value = serde_json::Value::Object(record.payload.clone());
        serde_json::from_value(value).map_err(|e| {
            ProtocolError::InvalidPayload(format!("record {} is not a word: {e}", record.uid))
        })
    }

    /// Wraps the entry in a new local record.
    pub fn into_record(self) -> ProtocolResult<SyncRecord> {
        Ok(SyncRecord::new_local(self.to_payload()?))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn word_payload_uses_wire_names() {
        let payload = Word::new("laconic").with_meaning("brief").to_payload().unwrap();
        assert_eq!(payload["type"], "word");
        assert_eq!(payload["shortMeaning"], "brief");
        assert_eq!(payload["proficiencyLevel"], "Beginner");
    }

    #[test]
    fn word_survives_record_wire_trip() {
        let record = Word::new("laconic").into_record().unwrap();
        let json = serde_json::to_string(&record).unwrap();
        let back: SyncRecord = serde_json::from_str(&json).unwrap();
        assert_eq!(Word::from_record(&back).unwrap().word, "laconic");
    }

    #[test]
    fn defaults_fill_sparse_payloads() {
        let mut record = SyncRecord::new("u", 1, Payload::new());
        record.payload.insert("word".into(), json!("terse"));
        let word = Word::from_record(&record).unwrap();
        assert_eq!(word.kind, "word");
        assert_eq!(word.proficiency_level, "Beginner");
        assert!(!word.is_favorite);
    }

    #[test]
    fn non_word_payload_is_rejected() {
        let record = SyncRecord::new("u", 1, Payload::new());
        assert!(matches!(
            Word::from_record(&record),
            Err(ProtocolError::InvalidPayload(_))
        ));
    }
}
