//! Synchronizable records and their status state machine.

use crate::error::ProtocolError;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use std::time::{SystemTime, UNIX_EPOCH};

/// Opaque payload fields of a record.
///
/// The sync engine never interprets these; they are carried verbatim
/// between the local store and the remote API.
pub type Payload = serde_json::Map<String, serde_json::Value>;

/// Returns the current wall-clock time in epoch milliseconds.
pub fn now_millis() -> i64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis() as i64)
        .unwrap_or_default()
}

/// Synchronization status of a record.
///
/// ```text
/// PENDING ──► IN_PROGRESS ──► SYNCED ──(edit)──► PENDING
///    ▲             │
///    │             └────────► FAILED ──────────► IN_PROGRESS
///    └─────────(abandoned)─────┘
///
/// any ──(soft delete)──► DELETED
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum SyncStatus {
    /// Local change not yet uploaded.
    #[default]
    Pending,
    /// An upload is currently being attempted.
    InProgress,
    /// The server acknowledged the current version.
    Synced,
    /// The last upload exhausted its retries.
    Failed,
    /// Soft-deleted tombstone.
    Deleted,
}

impl SyncStatus {
    /// All statuses, in declaration order.
    pub const ALL: [SyncStatus; 5] = [
        SyncStatus::Pending,
        SyncStatus::InProgress,
        SyncStatus::Synced,
        SyncStatus::Failed,
        SyncStatus::Deleted,
    ];

    /// Returns the wire name of this status.
    pub fn as_str(&self) -> &'static str {
        match self {
            SyncStatus::Pending => "PENDING",
            SyncStatus::InProgress => "IN_PROGRESS",
            SyncStatus::Synced => "SYNCED",
            SyncStatus::Failed => "FAILED",
            SyncStatus::Deleted => "DELETED",
        }
    }

    /// Returns true if a record may move from `self` to `next`.
    ///
    /// Rewriting the current status is always allowed. DELETED is reachable
    /// from everywhere and only leads back to itself, which lets push
    /// bookkeeping be written on tombstones.
    pub fn can_transition_to(&self, next: SyncStatus) -> bool {
        use SyncStatus::*;
        match (*self, next) {
            (current, next) if current == next => true,
            (_, Deleted) => true,
            (Deleted, _) => false,
            (Pending | Failed, InProgress) => true,
            (InProgress, Synced | Failed | Pending) => true,
            (Synced | Failed | Pending, Pending) => true,
            _ => false,
        }
    }
}

impl fmt::Display for SyncStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for SyncStatus {
    type Err = ProtocolError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        SyncStatus::ALL
            .into_iter()
            .find(|status| status.as_str().eq_ignore_ascii_case(s))
            .ok_or_else(|| ProtocolError::UnknownStatus(s.to_string()))
    }
}

/// A unit of user data subject to synchronization.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SyncRecord {
    /// Locally assigned sequence number, 0 before the first local insert.
    #[serde(default)]
    pub id: i64,
    /// Client-generated global identifier, stable across sync.
    pub uid: String,
    /// Creation time in epoch milliseconds.
    pub created_at: i64,
    /// Time of the last local mutation in epoch milliseconds.
    pub updated_at: i64,
    /// Current sync status.
    #[serde(default)]
    pub sync_status: SyncStatus,
    /// Number of failed push attempts since the last success.
    #[serde(default)]
    pub retry_count: u32,
    /// Time of the most recent push attempt.
    #[serde(default)]
    pub last_sync_attempt: Option<i64>,
    /// Domain fields, opaque to the sync engine.
    #[serde(flatten)]
    pub payload: Payload,
}

impl SyncRecord {
    /// Creates a record with the given uid and timestamps set to `updated_at`.
    pub fn new(uid: impl Into<String>, updated_at: i64, payload: Payload) -> Self {
        Self {
            id: 0,
            uid: uid.into(),
            created_at: updated_at,
            updated_at,
            sync_status: SyncStatus::Pending,
            retry_count: 0,
            last_sync_attempt: None,
            payload,
        }
    }

    /// Creates a brand-new local record with a fresh v4 uid, stamped now.
    pub fn new_local(payload: Payload) -> Self {
        Self::new(uuid::Uuid::new_v4().to_string(), now_millis(), payload)
    }

    /// Sets the sync status.
    pub fn with_status(mut self, status: SyncStatus) -> Self {
        self.sync_status = status;
        self
    }

    /// Returns true if this record is a soft-deleted tombstone.
    pub fn is_tombstone(&self) -> bool {
        self.sync_status == SyncStatus::Deleted
    }

    /// Returns true if the server has acknowledged this tombstone.
    pub fn is_acknowledged_tombstone(&self) -> bool {
        self.is_tombstone()
            && self.retry_count == 0
            && self
                .last_sync_attempt
                .is_some_and(|attempt| attempt >= self.updated_at)
    }

    /// Returns true if this record still has a change to upload.
    pub fn needs_push(&self) -> bool {
        match self.sync_status {
            SyncStatus::Synced => false,
            SyncStatus::Deleted => !self.is_acknowledged_tombstone(),
            _ => true,
        }
    }

    /// Records a local mutation at `now`.
    ///
    /// `updated_at` strictly increases on every mutation, even if the wall
    /// clock stalls or moves backwards, so observers can detect the edit.
    pub fn touch(&mut self, now: i64) {
        self.updated_at = now.max(self.updated_at.saturating_add(1));
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn payload() -> Payload {
        let mut map = Payload::new();
        map.insert("word".into(), json!("ephemeral"));
        map
    }

    #[test]
    fn status_wire_names() {
        assert_eq!(
            serde_json::to_string(&SyncStatus::InProgress).unwrap(),
            "\"IN_PROGRESS\""
        );
        assert_eq!("synced".parse::<SyncStatus>().unwrap(), SyncStatus::Synced);
        assert!("ARCHIVED".parse::<SyncStatus>().is_err());
    }

    #[test]
    fn status_transitions() {
        use SyncStatus::*;
        assert!(Pending.can_transition_to(InProgress));
        assert!(InProgress.can_transition_to(Synced));
        assert!(InProgress.can_transition_to(Failed));
        assert!(Failed.can_transition_to(InProgress));
        assert!(Synced.can_transition_to(Pending));
        assert!(Synced.can_transition_to(Deleted));
        assert!(Deleted.can_transition_to(Deleted));
        assert!(Synced.can_transition_to(Synced));

        assert!(!Pending.can_transition_to(Synced));
        assert!(!Synced.can_transition_to(InProgress));
        assert!(!Deleted.can_transition_to(Pending));
        assert!(!Deleted.can_transition_to(Synced));
    }

    #[test]
    fn record_json_is_flat_camel_case() {
        let record = SyncRecord::new("abc", 42, payload());
        let value = serde_json::to_value(&record).unwrap();

        assert_eq!(value["uid"], "abc");
        assert_eq!(value["updatedAt"], 42);
        assert_eq!(value["syncStatus"], "PENDING");
        assert_eq!(value["retryCount"], 0);
        assert_eq!(value["word"], "ephemeral");
        assert!(value.get("payload").is_none());
    }

    #[test]
    fn record_decodes_with_missing_bookkeeping() {
        let record: SyncRecord = serde_json::from_value(json!({
            "uid": "u1",
            "createdAt": 1,
            "updatedAt": 2,
            "word": "lucid",
            "isFavorite": true
        }))
        .unwrap();

        assert_eq!(record.id, 0);
        assert_eq!(record.sync_status, SyncStatus::Pending);
        assert_eq!(record.last_sync_attempt, None);
        assert_eq!(record.payload["word"], "lucid");
        assert_eq!(record.payload["isFavorite"], true);
    }

    #[test]
    fn new_local_assigns_unique_uids() {
        let a = SyncRecord::new_local(payload());
        let b = SyncRecord::new_local(payload());
        assert_ne!(a.uid, b.uid);
        assert_eq!(a.created_at, a.updated_at);
    }

    #[test]
    fn needs_push_by_status() {
        let base = SyncRecord::new("u", 100, payload());
        assert!(base.clone().needs_push());
        assert!(base.clone().with_status(SyncStatus::Failed).needs_push());
        assert!(!base.clone().with_status(SyncStatus::Synced).needs_push());

        let mut tombstone = base.with_status(SyncStatus::Deleted);
        assert!(tombstone.needs_push());
        tombstone.last_sync_attempt = Some(100);
        assert!(!tombstone.needs_push());
        tombstone.retry_count = 2;
        assert!(tombstone.needs_push());
    }

    #[test]
    fn touch_is_monotonic() {
        let mut record = SyncRecord::new("u", 500, payload());
        record.touch(400);
        assert_eq!(record.updated_at, 501);
        record.touch(900);
        assert_eq!(record.updated_at, 900);
    }
}
