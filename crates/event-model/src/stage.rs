//! Model and data types for the pluggable pipeline stages.
//!
//! Each stage is looked up in the component registry by a
//! `(model, data)` pair:
//!
//! | stage      | model              | data              |
//! |------------|--------------------|-------------------|
//! | storage    | [`EventDatabase`]  | [`EventDbResult`] |
//! | formatting | [`EventFormatData`]| [`EventByteArray`]|
//! | transport  | [`EventUrl`]       | [`EventResponse`] |
//! | encoding   | [`EventEncoder`]   | [`EventEncoder`]  |

use crate::{Event, EventCategory, SendPolicy};
use std::collections::BTreeMap;

/// A storage operation.
#[derive(Debug, Clone, PartialEq)]
pub enum EventDatabase {
    Insert(Event),
    Query { policy: SendPolicy, limit: usize },
    QueryAndDelete { policy: SendPolicy, limit: usize },
    Delete {
        last_id: i64,
        policy: SendPolicy,
        category: EventCategory,
    },
    RemoveOverdue,
    Clear,
    MigrateLegacy,
}

impl EventDatabase {
    pub fn insert(event: Event) -> Self {
        Self::Insert(event)
    }

    pub fn query(policy: SendPolicy, limit: usize) -> Self {
        Self::Query { policy, limit }
    }

    pub fn query_and_delete(policy: SendPolicy, limit: usize) -> Self {
        Self::QueryAndDelete { policy, limit }
    }

    pub fn delete(last_id: i64, policy: SendPolicy, category: EventCategory) -> Self {
        Self::Delete {
            last_id,
            policy,
            category,
        }
    }

    pub fn outdated() -> Self {
        Self::RemoveOverdue
    }

    pub fn clear() -> Self {
        Self::Clear
    }

    pub fn migrate_legacy() -> Self {
        Self::MigrateLegacy
    }

    /// Operation name for logs.
    pub fn name(&self) -> &'static str {
        match self {
            Self::Insert(_) => "insert",
            Self::Query { .. } => "query",
            Self::QueryAndDelete { .. } => "query_and_delete",
            Self::Delete { .. } => "delete",
            Self::RemoveOverdue => "remove_overdue",
            Self::Clear => "clear",
            Self::MigrateLegacy => "migrate_legacy",
        }
    }
}

/// A row of the event table.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StoredEventRow {
    pub row_id: i64,
    pub category: EventCategory,
    pub send_policy: SendPolicy,
    pub payload: Vec<u8>,
    pub inserted_at_ms: i64,
}

/// Outcome of a storage operation.
///
/// `sum` is the exact number of rows the operation acted upon. Storage
/// faults never escape as errors; they show up as `success == false` and
/// `sum == 0`.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct EventDbResult {
    pub success: bool,
    pub sum: usize,
    /// Highest row id in `rows`, `0` when empty.
    pub last_id: i64,
    /// Category shared by every row in `rows`.
    pub category: Option<EventCategory>,
    pub rows: Vec<StoredEventRow>,
    /// Merged wire envelope of `rows`, filled in by the storage component.
    pub data: Option<Vec<u8>>,
    pub media_type: Option<String>,
}

impl EventDbResult {
    pub fn succeeded(sum: usize) -> Self {
        Self {
            success: true,
            sum,
            ..Default::default()
        }
    }

    pub fn failed() -> Self {
        Self::default()
    }

    /// A successful result carrying the given rows.
    pub fn with_rows(rows: Vec<StoredEventRow>) -> Self {
        let last_id = rows.iter().map(|row| row.row_id).max().unwrap_or(0);
        let category = rows.first().map(|row| row.category);
        Self {
            success: true,
            sum: rows.len(),
            last_id,
            category,
            rows,
            data: None,
            media_type: None,
        }
    }

    pub fn is_success(&self) -> bool {
        self.success
    }

    pub fn sum(&self) -> usize {
        self.sum
    }
}

/// A formatting request.
#[derive(Debug, Clone, PartialEq)]
pub enum EventFormatData {
    /// Serialize a single event as one record.
    Serialize(Event),
    /// Merge already-serialized records into one envelope.
    Merge(Vec<Vec<u8>>),
}

impl EventFormatData {
    pub fn serialize(event: Event) -> Self {
        Self::Serialize(event)
    }

    pub fn merge(records: Vec<Vec<u8>>) -> Self {
        Self::Merge(records)
    }
}

/// Bytes produced by a formatter along with their content type.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct EventByteArray {
    pub data: Vec<u8>,
    pub media_type: String,
    /// Records contained in `data`.
    pub count: usize,
}

/// A delivery request to the collection server.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EventUrl {
    pub host: String,
    pub project_id: String,
    /// Client send time, sent as the `stm` query parameter.
    pub timestamp_ms: i64,
    pub headers: BTreeMap<String, String>,
    pub body: Vec<u8>,
    pub media_type: String,
}

impl EventUrl {
    pub fn new(host: impl Into<String>, project_id: impl Into<String>, timestamp_ms: i64) -> Self {
        Self {
            host: host.into(),
            project_id: project_id.into(),
            timestamp_ms,
            headers: BTreeMap::new(),
            body: Vec::new(),
            media_type: String::new(),
        }
    }

    pub fn with_body(mut self, body: Vec<u8>, media_type: impl Into<String>) -> Self {
        self.body = body;
        self.media_type = media_type.into();
        self
    }

    pub fn add_header(&mut self, name: impl Into<String>, value: impl Into<String>) {
        self.headers.insert(name.into(), value.into());
    }

    /// Path below the host: `v3/projects/{projectId}/collect`.
    pub fn path(&self) -> String {
        format!("v3/projects/{}/collect", self.project_id)
    }

    /// Full request URL including the `stm` parameter.
    pub fn url(&self) -> String {
        format!(
            "{}/{}?stm={}",
            self.host.trim_end_matches('/'),
            self.path(),
            self.timestamp_ms
        )
    }
}

/// Result of a delivery attempt.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct EventResponse {
    pub succeeded: bool,
    /// Final HTTP status, `None` when no response was received.
    pub status: Option<u16>,
    /// Body bytes put on the wire.
    pub used_bytes: u64,
}

impl EventResponse {
    pub fn failed(status: Option<u16>) -> Self {
        Self {
            succeeded: false,
            status,
            used_bytes: 0,
        }
    }
}

/// A request passing through the body encoder. Model and data are the
/// same type: the encoder returns the rewritten request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EventEncoder {
    pub request: EventUrl,
}

impl EventEncoder {
    pub fn new(request: EventUrl) -> Self {
        Self { request }
    }
}
