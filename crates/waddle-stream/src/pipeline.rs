//! Append-only per-topic event log with consumer groups, ack, and a DLQ.
//!
//! Backed by `rusqlite` rather than Redis Streams — no crate in the
//! reference corpus depends on a Redis client, so the durable tier reuses
//! the same `Mutex<Connection>` pattern the rest of the workspace already
//! uses for persistence. In-process consumers are woken via a `Notify`
//! per stream instead of a server-side blocking `XREAD`.

use std::sync::{Arc, Mutex};
use std::time::Duration;

use chrono::Utc;
use dashmap::DashMap;
use rusqlite::{params, Connection, OptionalExtension};
use tokio::sync::Notify;
use tracing::{debug, info, warn};

use crate::error::{Result, StreamError};
use crate::types::{DlqEvent, PendingEntry, StreamEvent, StreamInfo};

const SCHEMA: &str = r#"
CREATE TABLE IF NOT EXISTS stream_events (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    stream TEXT NOT NULL,
    payload TEXT NOT NULL,
    retry_count INTEGER NOT NULL DEFAULT 0,
    timestamp TEXT NOT NULL
);
CREATE INDEX IF NOT EXISTS idx_stream_events_stream ON stream_events(stream, id);

CREATE TABLE IF NOT EXISTS consumer_groups (
    stream TEXT NOT NULL,
    group_name TEXT NOT NULL,
    last_delivered_id INTEGER NOT NULL DEFAULT 0,
    PRIMARY KEY (stream, group_name)
);

CREATE TABLE IF NOT EXISTS pending_entries (
    stream TEXT NOT NULL,
    group_name TEXT NOT NULL,
    event_id INTEGER NOT NULL,
    consumer TEXT NOT NULL,
    delivered_at TEXT NOT NULL,
    delivery_count INTEGER NOT NULL DEFAULT 1,
    PRIMARY KEY (stream, group_name, event_id)
);

CREATE TABLE IF NOT EXISTS dlq_events (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    dlq_stream TEXT NOT NULL,
    original_id TEXT NOT NULL,
    original_stream TEXT NOT NULL,
    failure_reason TEXT NOT NULL,
    retry_count INTEGER NOT NULL,
    timestamp TEXT NOT NULL,
    payload TEXT
);
CREATE INDEX IF NOT EXISTS idx_dlq_events_stream ON dlq_events(dlq_stream, id);
"#;

pub struct StreamPipelineConfig {
    pub enabled: bool,
    pub stream_prefix: String,
    pub dlq_prefix: String,
    pub max_retries: u32,
    pub batch_size: usize,
    pub block_ms: u64,
    pub max_len: usize,
}

impl Default for StreamPipelineConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            stream_prefix: "waddlebot:stream".to_string(),
            dlq_prefix: "waddlebot:dlq".to_string(),
            max_retries: 3,
            batch_size: 10,
            block_ms: 5000,
            max_len: 10_000,
        }
    }
}

pub struct StreamPipeline {
    conn: Mutex<Connection>,
    config: StreamPipelineConfig,
    notifiers: DashMap<String, Arc<Notify>>,
}

impl StreamPipeline {
    pub fn open(path: &str, config: StreamPipelineConfig) -> Result<Self> {
        let conn = Connection::open(path)?;
        conn.execute_batch(SCHEMA)?;
        info!(
            enabled = config.enabled,
            max_retries = config.max_retries,
            batch_size = config.batch_size,
            block_ms = config.block_ms,
            "stream pipeline initialized"
        );
        Ok(Self {
            conn: Mutex::new(conn),
            config,
            notifiers: DashMap::new(),
        })
    }

    pub fn open_in_memory(config: StreamPipelineConfig) -> Result<Self> {
        Self::open(":memory:", config)
    }

    fn full_name(&self, stream: &str) -> String {
        format!("{}:{}", self.config.stream_prefix, stream)
    }

    fn dlq_name(&self, full_stream: &str) -> String {
        let bare = full_stream
            .strip_prefix(&format!("{}:", self.config.stream_prefix))
            .unwrap_or(full_stream);
        format!("{}:{}", self.config.dlq_prefix, bare)
    }

    fn notifier_for(&self, stream: &str) -> Arc<Notify> {
        self.notifiers
            .entry(stream.to_string())
            .or_insert_with(|| Arc::new(Notify::new()))
            .clone()
    }

    /// `publish(stream, payload, max_len) -> id`. No-op returning a
    /// synthetic id when the pipeline is disabled.
    pub async fn publish(
        &self,
        stream: &str,
        payload: serde_json::Value,
        max_len: Option<usize>,
    ) -> Result<String> {
        self.publish_with_retry_count(stream, payload, max_len, 0).await
    }

    /// Re-enqueue an event with its retry counter incremented. Used by
    /// [`handle_consumer_result`] instead of a bare `publish` so the
    /// retried copy still carries its failure history.
    pub async fn republish(
        &self,
        stream: &str,
        payload: serde_json::Value,
        retry_count: u32,
    ) -> Result<String> {
        self.publish_with_retry_count(stream, payload, None, retry_count)
            .await
    }

    async fn publish_with_retry_count(
        &self,
        stream: &str,
        payload: serde_json::Value,
        max_len: Option<usize>,
        retry_count: u32,
    ) -> Result<String> {
        if !self.config.enabled {
            return Ok("disabled-0".to_string());
        }

        let full = self.full_name(stream);
        let now = Utc::now().to_rfc3339();
        let id = {
            let conn = self.conn.lock().unwrap();
            conn.execute(
                "INSERT INTO stream_events (stream, payload, retry_count, timestamp) VALUES (?1, ?2, ?3, ?4)",
                params![full, payload.to_string(), retry_count, now],
            )?;
            conn.last_insert_rowid()
        };

        self.trim_stream(stream, max_len.unwrap_or(self.config.max_len), true)
            .await?;

        self.notifier_for(&full).notify_waiters();
        debug!(stream = %full, id, "published event");
        Ok(id.to_string())
    }

    /// `consume(stream, group, consumer, count, block_ms) -> [events]`.
    pub async fn consume(
        &self,
        stream: &str,
        group: &str,
        consumer: &str,
        count: Option<usize>,
        block_ms: Option<u64>,
    ) -> Result<Vec<StreamEvent>> {
        if !self.config.enabled {
            return Ok(Vec::new());
        }

        self.create_consumer_group(stream, group, "0").await?;

        let count = count.unwrap_or(self.config.batch_size);
        let block_ms = block_ms.unwrap_or(self.config.block_ms);

        let events = self.read_new(stream, group, consumer, count)?;
        if !events.is_empty() || block_ms == 0 {
            return Ok(events);
        }

        let full = self.full_name(stream);
        let notify = self.notifier_for(&full);
        let _ = tokio::time::timeout(Duration::from_millis(block_ms), notify.notified()).await;
        self.read_new(stream, group, consumer, count)
    }

    fn read_new(
        &self,
        stream: &str,
        group: &str,
        consumer: &str,
        count: usize,
    ) -> Result<Vec<StreamEvent>> {
        let full = self.full_name(stream);
        let now = Utc::now().to_rfc3339();
        let conn = self.conn.lock().unwrap();

        let last_delivered: i64 = conn
            .query_row(
                "SELECT last_delivered_id FROM consumer_groups WHERE stream=?1 AND group_name=?2",
                params![full, group],
                |r| r.get(0),
            )
            .unwrap_or(0);

        let mut stmt = conn.prepare(
            "SELECT id, stream, payload, retry_count, timestamp FROM stream_events
             WHERE stream=?1 AND id > ?2 ORDER BY id ASC LIMIT ?3",
        )?;
        let rows = stmt.query_map(params![full, last_delivered, count as i64], |r| {
            let id: i64 = r.get(0)?;
            let stream: String = r.get(1)?;
            let payload_str: String = r.get(2)?;
            let retry_count: u32 = r.get(3)?;
            let timestamp: String = r.get(4)?;
            Ok((id, stream, payload_str, retry_count, timestamp))
        })?;

        let mut events = Vec::new();
        let mut max_id = last_delivered;
        for row in rows {
            let (id, stream_name, payload_str, retry_count, timestamp) = row?;
            let payload: serde_json::Value = serde_json::from_str(&payload_str)?;
            conn.execute(
                "INSERT INTO pending_entries (stream, group_name, event_id, consumer, delivered_at, delivery_count)
                 VALUES (?1, ?2, ?3, ?4, ?5, 1)
                 ON CONFLICT(stream, group_name, event_id) DO UPDATE SET
                    consumer=excluded.consumer, delivered_at=excluded.delivered_at,
                    delivery_count=pending_entries.delivery_count+1",
                params![full, group, id, consumer, now],
            )?;
            max_id = max_id.max(id);
            events.push(StreamEvent {
                id: id.to_string(),
                stream: stream_name,
                payload,
                retry_count,
                timestamp,
            });
        }

        if max_id > last_delivered {
            conn.execute(
                "UPDATE consumer_groups SET last_delivered_id=?1 WHERE stream=?2 AND group_name=?3",
                params![max_id, full, group],
            )?;
        }

        Ok(events)
    }

    /// `ack(stream, group, id) -> ok`.
    pub async fn ack(&self, stream: &str, group: &str, id: &str) -> Result<bool> {
        if !self.config.enabled {
            return Ok(false);
        }
        let full = self.full_name(stream);
        let event_id: i64 = id
            .parse()
            .map_err(|_| StreamError::NotFound(id.to_string()))?;
        let conn = self.conn.lock().unwrap();
        let affected = conn.execute(
            "DELETE FROM pending_entries WHERE stream=?1 AND group_name=?2 AND event_id=?3",
            params![full, group, event_id],
        )?;
        if affected == 0 {
            warn!(stream = %full, %group, id, "ack on an entry that was not pending");
        }
        Ok(affected > 0)
    }

    /// `pending(stream, group, consumer?) -> [{id, consumer, idle_ms, delivery_count}]`.
    pub async fn pending(
        &self,
        stream: &str,
        group: &str,
        consumer: Option<&str>,
    ) -> Result<Vec<PendingEntry>> {
        let full = self.full_name(stream);
        let now = Utc::now();
        let conn = self.conn.lock().unwrap();

        let mut stmt = if consumer.is_some() {
            conn.prepare(
                "SELECT event_id, consumer, delivered_at, delivery_count FROM pending_entries
                 WHERE stream=?1 AND group_name=?2 AND consumer=?3 ORDER BY event_id ASC",
            )?
        } else {
            conn.prepare(
                "SELECT event_id, consumer, delivered_at, delivery_count FROM pending_entries
                 WHERE stream=?1 AND group_name=?2 ORDER BY event_id ASC",
            )?
        };

        let map_row = |r: &rusqlite::Row| -> rusqlite::Result<(i64, String, String, u32)> {
            Ok((r.get(0)?, r.get(1)?, r.get(2)?, r.get(3)?))
        };

        let rows: Vec<_> = if let Some(c) = consumer {
            stmt.query_map(params![full, group, c], map_row)?
                .collect::<std::result::Result<_, _>>()?
        } else {
            stmt.query_map(params![full, group], map_row)?
                .collect::<std::result::Result<_, _>>()?
        };

        Ok(rows
            .into_iter()
            .map(|(id, consumer, delivered_at, delivery_count)| {
                let delivered = chrono::DateTime::parse_from_rfc3339(&delivered_at)
                    .map(|d| d.with_timezone(&Utc))
                    .unwrap_or(now);
                let idle_ms = (now - delivered).num_milliseconds().max(0) as u64;
                PendingEntry {
                    id: id.to_string(),
                    consumer,
                    idle_ms,
                    delivery_count,
                }
            })
            .collect())
    }

    /// Re-deliver entries idle past `min_idle_ms` to `new_consumer`.
    /// Standard Redis Streams reclamation (`XCLAIM`), exposed explicitly
    /// since the distilled contract only names `pending`.
    pub async fn reclaim_stale(
        &self,
        stream: &str,
        group: &str,
        min_idle_ms: u64,
        new_consumer: &str,
    ) -> Result<Vec<StreamEvent>> {
        let full = self.full_name(stream);
        let stale_ids: Vec<i64> = {
            let pending = self.pending(stream, group, None).await?;
            pending
                .into_iter()
                .filter(|p| p.idle_ms >= min_idle_ms)
                .map(|p| p.id.parse().unwrap())
                .collect()
        };
        if stale_ids.is_empty() {
            return Ok(Vec::new());
        }

        let now = Utc::now().to_rfc3339();
        let conn = self.conn.lock().unwrap();
        let mut events = Vec::new();
        for id in stale_ids {
            conn.execute(
                "UPDATE pending_entries SET consumer=?1, delivered_at=?2, delivery_count=delivery_count+1
                 WHERE stream=?3 AND group_name=?4 AND event_id=?5",
                params![new_consumer, now, full, group, id],
            )?;
            let row = conn
                .query_row(
                    "SELECT id, stream, payload, retry_count, timestamp FROM stream_events WHERE id=?1",
                    params![id],
                    |r| {
                        let id: i64 = r.get(0)?;
                        let stream: String = r.get(1)?;
                        let payload_str: String = r.get(2)?;
                        let retry_count: u32 = r.get(3)?;
                        let timestamp: String = r.get(4)?;
                        Ok((id, stream, payload_str, retry_count, timestamp))
                    },
                )
                .optional()?;
            if let Some((id, stream_name, payload_str, retry_count, timestamp)) = row {
                events.push(StreamEvent {
                    id: id.to_string(),
                    stream: stream_name,
                    payload: serde_json::from_str(&payload_str)?,
                    retry_count,
                    timestamp,
                });
            }
        }
        Ok(events)
    }

    /// `move_to_dlq(stream, id, reason, payload, retry_count) -> ok`.
    pub async fn move_to_dlq(
        &self,
        stream: &str,
        id: &str,
        reason: &str,
        payload: Option<serde_json::Value>,
        retry_count: u32,
    ) -> Result<bool> {
        let full = self.full_name(stream);
        let dlq = self.dlq_name(&full);
        let now = Utc::now().to_rfc3339();
        let payload_str = payload.as_ref().map(|p| p.to_string());

        let conn = self.conn.lock().unwrap();
        conn.execute(
            "INSERT INTO dlq_events (dlq_stream, original_id, original_stream, failure_reason, retry_count, timestamp, payload)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
            params![dlq, id, full, reason, retry_count, now, payload_str],
        )?;

        // Drop from every group's pending set so it is not redelivered;
        // this is not an ack (no ack counter is incremented anywhere).
        let event_id: i64 = id.parse().unwrap_or(-1);
        conn.execute(
            "DELETE FROM pending_entries WHERE stream=?1 AND event_id=?2",
            params![full, event_id],
        )?;

        warn!(stream = %full, id, reason, retry_count, "event moved to DLQ");
        Ok(true)
    }

    /// `stream_info(stream) -> {length, groups, first, last}`.
    pub async fn stream_info(&self, stream: &str) -> Result<StreamInfo> {
        let full = self.full_name(stream);
        let conn = self.conn.lock().unwrap();

        let length: u64 = conn.query_row(
            "SELECT COUNT(*) FROM stream_events WHERE stream=?1",
            params![full],
            |r| r.get(0),
        )?;
        let groups: u64 = conn.query_row(
            "SELECT COUNT(*) FROM consumer_groups WHERE stream=?1",
            params![full],
            |r| r.get(0),
        )?;
        let first_id: Option<i64> = conn
            .query_row(
                "SELECT MIN(id) FROM stream_events WHERE stream=?1",
                params![full],
                |r| r.get(0),
            )
            .optional()?
            .flatten();
        let last_id: Option<i64> = conn
            .query_row(
                "SELECT MAX(id) FROM stream_events WHERE stream=?1",
                params![full],
                |r| r.get(0),
            )
            .optional()?
            .flatten();

        Ok(StreamInfo {
            length,
            groups,
            first_id: first_id.map(|i| i.to_string()),
            last_id: last_id.map(|i| i.to_string()),
        })
    }

    /// `get_dlq_events(stream, count) -> [dlq events]`.
    pub async fn get_dlq_events(&self, stream: &str, count: usize) -> Result<Vec<DlqEvent>> {
        let full = self.full_name(stream);
        let dlq = self.dlq_name(&full);
        let conn = self.conn.lock().unwrap();

        let mut stmt = conn.prepare(
            "SELECT id, original_id, original_stream, failure_reason, retry_count, timestamp, payload
             FROM dlq_events WHERE dlq_stream=?1 ORDER BY id ASC LIMIT ?2",
        )?;
        let rows = stmt.query_map(params![dlq, count as i64], |r| {
            let id: i64 = r.get(0)?;
            let payload_str: Option<String> = r.get(6)?;
            Ok(DlqEvent {
                id: id.to_string(),
                original_id: r.get(1)?,
                original_stream: r.get(2)?,
                failure_reason: r.get(3)?,
                retry_count: r.get(4)?,
                timestamp: r.get(5)?,
                payload: payload_str.and_then(|s| serde_json::from_str(&s).ok()),
            })
        })?;
        rows.collect::<std::result::Result<Vec<_>, _>>()
            .map_err(StreamError::from)
    }

    /// Create a consumer group. Idempotent — "already exists" is success.
    pub async fn create_consumer_group(
        &self,
        stream: &str,
        group: &str,
        start_id: &str,
    ) -> Result<bool> {
        let full = self.full_name(stream);
        let start: i64 = if start_id == "$" {
            let conn = self.conn.lock().unwrap();
            conn.query_row(
                "SELECT COALESCE(MAX(id),0) FROM stream_events WHERE stream=?1",
                params![full],
                |r| r.get(0),
            )?
        } else {
            start_id.parse().unwrap_or(0)
        };

        let conn = self.conn.lock().unwrap();
        conn.execute(
            "INSERT OR IGNORE INTO consumer_groups (stream, group_name, last_delivered_id) VALUES (?1, ?2, ?3)",
            params![full, group, start],
        )?;
        Ok(true)
    }

    /// Trim a stream to `max_len`, discarding the oldest entries first.
    pub async fn trim_stream(&self, stream: &str, max_len: usize, _approximate: bool) -> Result<bool> {
        let full = self.full_name(stream);
        let conn = self.conn.lock().unwrap();
        conn.execute(
            "DELETE FROM stream_events WHERE stream=?1 AND id NOT IN (
                SELECT id FROM stream_events WHERE stream=?1 ORDER BY id DESC LIMIT ?2
            )",
            params![full, max_len as i64],
        )?;
        Ok(true)
    }

    pub fn is_enabled(&self) -> bool {
        self.config.enabled
    }
}

/// Classify whether a failure should retry or go straight to the DLQ.
pub fn should_retry(retry_count: u32, max_retries: u32, retryable: bool) -> bool {
    retryable && retry_count < max_retries
}

/// Apply the stream-consumer failure policy: ack on success, republish with
/// `retry_count+1` while retryable and under the limit, otherwise move to
/// the DLQ.
pub async fn handle_consumer_result(
    pipeline: &StreamPipeline,
    stream: &str,
    group: &str,
    event: &StreamEvent,
    outcome: std::result::Result<(), (String, bool)>,
) -> Result<()> {
    match outcome {
        Ok(()) => {
            pipeline.ack(stream, group, &event.id).await?;
        }
        Err((reason, retryable)) => {
            if should_retry(event.retry_count, pipeline.config.max_retries, retryable) {
                pipeline
                    .republish(stream, event.payload.clone(), event.retry_count + 1)
                    .await?;
                pipeline.ack(stream, group, &event.id).await?;
            } else {
                pipeline
                    .move_to_dlq(stream, &event.id, &reason, Some(event.payload.clone()), event.retry_count)
                    .await?;
                pipeline.ack(stream, group, &event.id).await?;
            }
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn test_pipeline() -> StreamPipeline {
        StreamPipeline::open_in_memory(StreamPipelineConfig {
            enabled: true,
            ..Default::default()
        })
        .unwrap()
    }

    #[tokio::test]
    async fn disabled_publish_is_noop() {
        let pipeline = StreamPipeline::open_in_memory(StreamPipelineConfig::default()).unwrap();
        let id = pipeline
            .publish("events:commands", serde_json::json!({"a":1}), None)
            .await
            .unwrap();
        assert_eq!(id, "disabled-0");
        let events = pipeline
            .consume("events:commands", "g1", "c1", None, Some(0))
            .await
            .unwrap();
        assert!(events.is_empty());
    }

    #[tokio::test]
    async fn publish_then_consume_then_ack() {
        let pipeline = test_pipeline();
        pipeline
            .publish("events:commands", serde_json::json!({"cmd":"translate"}), None)
            .await
            .unwrap();

        let events = pipeline
            .consume("events:commands", "router-group", "router-1", None, Some(0))
            .await
            .unwrap();
        assert_eq!(events.len(), 1);
        assert_eq!(events[0].retry_count, 0);

        let pending = pipeline
            .pending("events:commands", "router-group", None)
            .await
            .unwrap();
        assert_eq!(pending.len(), 1);

        let acked = pipeline
            .ack("events:commands", "router-group", &events[0].id)
            .await
            .unwrap();
        assert!(acked);

        let pending_after = pipeline
            .pending("events:commands", "router-group", None)
            .await
            .unwrap();
        assert!(pending_after.is_empty());
    }

    #[tokio::test]
    async fn consumer_group_creation_is_idempotent() {
        let pipeline = test_pipeline();
        assert!(pipeline
            .create_consumer_group("events:commands", "g1", "0")
            .await
            .unwrap());
        assert!(pipeline
            .create_consumer_group("events:commands", "g1", "0")
            .await
            .unwrap());
    }

    #[tokio::test]
    async fn move_to_dlq_preserves_provenance() {
        let pipeline = test_pipeline();
        pipeline
            .publish("events:commands", serde_json::json!({"cmd":"x"}), None)
            .await
            .unwrap();
        let events = pipeline
            .consume("events:commands", "g1", "c1", None, Some(0))
            .await
            .unwrap();
        let e = &events[0];

        pipeline
            .move_to_dlq("events:commands", &e.id, "non_retryable", Some(e.payload.clone()), 0)
            .await
            .unwrap();

        let dlq = pipeline.get_dlq_events("events:commands", 10).await.unwrap();
        assert_eq!(dlq.len(), 1);
        assert_eq!(dlq[0].original_id, e.id);
        assert_eq!(dlq[0].failure_reason, "non_retryable");
        assert!(dlq[0].payload.is_some());
    }

    #[tokio::test]
    async fn trim_stream_keeps_most_recent() {
        let pipeline = test_pipeline();
        for i in 0..5 {
            pipeline
                .publish("events:inbound", serde_json::json!({"i": i}), None)
                .await
                .unwrap();
        }
        pipeline.trim_stream("events:inbound", 2, true).await.unwrap();
        let info = pipeline.stream_info("events:inbound").await.unwrap();
        assert_eq!(info.length, 2);
    }

    #[tokio::test]
    async fn reclaim_stale_redelivers_idle_entries() {
        let pipeline = test_pipeline();
        pipeline
            .publish("events:commands", serde_json::json!({"cmd":"x"}), None)
            .await
            .unwrap();
        pipeline
            .consume("events:commands", "g1", "c1", None, Some(0))
            .await
            .unwrap();

        let reclaimed = pipeline
            .reclaim_stale("events:commands", "g1", 0, "c2")
            .await
            .unwrap();
        assert_eq!(reclaimed.len(), 1);

        let pending = pipeline.pending("events:commands", "g1", Some("c2")).await.unwrap();
        assert_eq!(pending.len(), 1);
        assert_eq!(pending[0].delivery_count, 2);
    }
}
