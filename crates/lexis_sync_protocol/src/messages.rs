//! Pull request and response messages.

use crate::cursor::SyncCursor;
use crate::error::ProtocolResult;
use crate::record::SyncRecord;
use serde::{Deserialize, Serialize};

/// Request header carrying the API key.
pub const API_KEY_HEADER: &str = "x-api-key";
/// Request header carrying the secret key.
pub const SECRET_KEY_HEADER: &str = "x-secret-key";

/// Query parameters of a pull request.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PullQuery {
    /// Return records changed at or after this time.
    pub since: i64,
    /// Tie-breaker: skip records at `since` whose uid is not after this one.
    pub last_id: Option<String>,
}

impl PullQuery {
    /// Builds the query for the page following `cursor`.
    pub fn from_cursor(cursor: &SyncCursor) -> Self {
        Self {
            since: cursor.last_sync_time,
            last_id: cursor.last_id.clone(),
        }
    }

    /// Encodes the query as `since=..&last_id=..`.
    ///
    /// An absent `last_id` is sent as an empty value.
    pub fn to_query_string(&self) -> String {
        url::form_urlencoded::Serializer::new(String::new())
            .append_pair("since", &self.since.to_string())
            .append_pair("last_id", self.last_id.as_deref().unwrap_or(""))
            .finish()
    }

    /// Returns true if `record` lies after this query's position.
    ///
    /// Records are ordered by `(updatedAt, uid)`; an absent `last_id`
    /// admits every record at `since`.
    pub fn admits(&self, record: &SyncRecord) -> bool {
        let last_id = self.last_id.as_deref().unwrap_or("");
        record.updated_at > self.since
            || (record.updated_at == self.since && record.uid.as_str() > last_id)
    }

    /// Parses a query string produced by [`PullQuery::to_query_string`].
    ///
    /// Missing or malformed values fall back to the initial cursor.
    pub fn parse(query: &str) -> Self {
        let mut parsed = Self::default();
        for (key, value) in url::form_urlencoded::parse(query.as_bytes()) {
            match key.as_ref() {
                "since" => parsed.since = value.parse().unwrap_or(0),
                "last_id" if !value.is_empty() => parsed.last_id = Some(value.into_owned()),
                _ => {}
            }
        }
        parsed
    }
}

/// One page of a pull response.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PullPage {
    /// Server-reported status string.
    #[serde(default)]
    pub status: String,
    /// Records in server order.
    #[serde(default)]
    pub data: Vec<SyncRecord>,
    /// Whether more pages follow.
    #[serde(rename = "hasMore", default)]
    pub has_more: bool,
}

impl PullPage {
    /// Creates a successful page.
    pub fn ok(data: Vec<SyncRecord>, has_more: bool) -> Self {
        Self {
            status: "success".to_string(),
            data,
            has_more,
        }
    }

    /// Decodes a page from a JSON body.
    pub fn decode(body: &[u8]) -> ProtocolResult<Self> {
        Ok(serde_json::from_slice(body)?)
    }

    /// Encodes the page as a JSON body.
    pub fn encode(&self) -> ProtocolResult<Vec<u8>> {
        Ok(serde_json::to_vec(self)?)
    }

    /// Returns true if the pull loop must stop after this page.
    pub fn is_last(&self) -> bool {
        self.data.is_empty() || !self.has_more
    }
}
