use serde::{Deserialize, Serialize};

/// An event carried on a stream: `{id, stream, payload, retry_count, timestamp}`.
///
/// Ids are monotonically increasing within a stream (an auto-increment
/// SQLite rowid, formatted as a string so callers don't assume a numeric
/// type — a real Redis Streams id has a `<ms>-<seq>` shape and callers
/// should treat ids as opaque strings either way).
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct StreamEvent {
    pub id: String,
    pub stream: String,
    pub payload: serde_json::Value,
    pub retry_count: u32,
    pub timestamp: String,
}

/// One pending (delivered, not yet acked) entry for a consumer group.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct PendingEntry {
    pub id: String,
    pub consumer: String,
    pub idle_ms: u64,
    pub delivery_count: u32,
}

/// Summary diagnostics for a stream.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct StreamInfo {
    pub length: u64,
    pub groups: u64,
    pub first_id: Option<String>,
    pub last_id: Option<String>,
}

/// A dead-lettered event, preserving provenance of the original.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct DlqEvent {
    pub id: String,
    pub original_id: String,
    pub original_stream: String,
    pub failure_reason: String,
    pub retry_count: u32,
    pub timestamp: String,
    pub payload: Option<serde_json::Value>,
}
