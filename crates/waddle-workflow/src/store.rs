//! Durable `WorkflowDefinition` storage, keyed by the community that owns
//! it and the command string that triggers it. The Workflow Engine is
//! invoked by the Router whenever an inbound event matches a workflow
//! trigger.

use rusqlite::{params, Connection, OptionalExtension};

use crate::error::Result;
use crate::types::WorkflowDefinition;

const SCHEMA: &str = r#"
CREATE TABLE IF NOT EXISTS workflows (
    id            TEXT PRIMARY KEY,
    community_id  INTEGER NOT NULL,
    command       TEXT NOT NULL,
    definition    TEXT NOT NULL,
    enabled       INTEGER NOT NULL DEFAULT 1,
    created_at    TEXT NOT NULL,
    updated_at    TEXT NOT NULL
);
CREATE INDEX IF NOT EXISTS idx_workflows_community_command ON workflows(community_id, command) WHERE enabled = 1;
"#;

pub struct WorkflowStore {
    db: std::sync::Mutex<Connection>,
}

impl WorkflowStore {
    pub fn new(conn: Connection) -> Result<Self> {
        conn.execute_batch(SCHEMA)?;
        Ok(Self {
            db: std::sync::Mutex::new(conn),
        })
    }

    /// Save (insert or replace) a community's workflow, bound to the
    /// command string the router matches triggers against.
    pub fn save(&self, community_id: i64, command: &str, definition: &WorkflowDefinition) -> Result<()> {
        let db = self.db.lock().unwrap();
        let now = chrono::Utc::now().to_rfc3339();
        let json = serde_json::to_string(definition)?;
        db.execute(
            "INSERT INTO workflows (id, community_id, command, definition, enabled, created_at, updated_at)
             VALUES (?1, ?2, ?3, ?4, 1, ?5, ?5)
             ON CONFLICT(id) DO UPDATE SET
                command = excluded.command, definition = excluded.definition, updated_at = excluded.updated_at",
            params![definition.id, community_id, command, json, now],
        )?;
        Ok(())
    }

    pub fn set_enabled(&self, workflow_id: &str, enabled: bool) -> Result<()> {
        let db = self.db.lock().unwrap();
        db.execute(
            "UPDATE workflows SET enabled = ?1 WHERE id = ?2",
            params![enabled, workflow_id],
        )?;
        Ok(())
    }

    /// Resolve a community's enabled workflow bound to `command`, if any —
    /// the lookup the dispatcher performs before invoking [`crate::WorkflowEngine`].
    pub fn find_for_command(&self, community_id: i64, command: &str) -> Result<Option<WorkflowDefinition>> {
        let db = self.db.lock().unwrap();
        let row: Option<String> = db
            .query_row(
                "SELECT definition FROM workflows WHERE community_id = ?1 AND command = ?2 AND enabled = 1",
                params![community_id, command],
                |r| r.get(0),
            )
            .optional()?;
        row.map(|s| serde_json::from_str(&s).map_err(Into::into))
            .transpose()
    }

    pub fn get(&self, workflow_id: &str) -> Result<Option<WorkflowDefinition>> {
        let db = self.db.lock().unwrap();
        let row: Option<String> = db
            .query_row(
                "SELECT definition FROM workflows WHERE id = ?1",
                params![workflow_id],
                |r| r.get(0),
            )
            .optional()?;
        row.map(|s| serde_json::from_str(&s).map_err(Into::into))
            .transpose()
    }

    pub fn list_for_community(&self, community_id: i64) -> Result<Vec<WorkflowDefinition>> {
        let db = self.db.lock().unwrap();
        let mut stmt = db.prepare("SELECT definition FROM workflows WHERE community_id = ?1 AND enabled = 1")?;
        let rows = stmt.query_map(params![community_id], |r| r.get::<_, String>(0))?;
        let mut out = Vec::new();
        for row in rows {
            out.push(serde_json::from_str(&row?)?);
        }
        Ok(out)
    }

    /// Every enabled workflow across all communities — used at startup to
    /// bootstrap schedule-triggered workflows into the scheduler, since
    /// there is no per-community context to scope that enumeration by.
    pub fn list_all_enabled(&self) -> Result<Vec<WorkflowDefinition>> {
        let db = self.db.lock().unwrap();
        let mut stmt = db.prepare("SELECT definition FROM workflows WHERE enabled = 1")?;
        let rows = stmt.query_map([], |r| r.get::<_, String>(0))?;
        let mut out = Vec::new();
        for row in rows {
            out.push(serde_json::from_str(&row?)?);
        }
        Ok(out)
    }
}
