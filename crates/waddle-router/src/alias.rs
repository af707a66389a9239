//! Entity-scoped command aliases behind `!alias add/remove/list`.
//!
//! `(entity_id, alias_name)` is unique among *active* aliases — removal is a
//! soft delete (`active=false`) so usage history and counters survive
//! rather than a hard row delete.

use chrono::Utc;
use rusqlite::{params, Connection, OptionalExtension};
use tracing::{debug, info};

use crate::error::{Result, RouterError};

/// One entity-scoped alias row.
#[derive(Debug, Clone, serde::Serialize)]
pub struct Alias {
    pub entity_id: String,
    pub alias_name: String,
    pub command_text: String,
    pub creator: String,
    pub active: bool,
    pub usage_count: u64,
    pub last_used: Option<String>,
    pub created_at: String,
    pub updated_at: String,
}

pub struct AliasStore {
    db: std::sync::Mutex<Connection>,
}

impl AliasStore {
    pub fn new(conn: Connection) -> Result<Self> {
        init_db(&conn)?;
        Ok(Self {
            db: std::sync::Mutex::new(conn),
        })
    }

    /// `!alias add <name> <command>` — errors with `Conflict` if an active
    /// alias by this name already exists for the entity, matching the
    /// original's "already exists, remove first" behavior.
    pub fn add(&self, entity_id: &str, alias_name: &str, command_text: &str, creator: &str) -> Result<Alias> {
        if self.get_active(entity_id, alias_name)?.is_some() {
            return Err(RouterError::Conflict(format!(
                "alias '{alias_name}' already exists for this entity"
            )));
        }
        let db = self.db.lock().unwrap();
        let now = Utc::now().to_rfc3339();
        db.execute(
            "INSERT INTO aliases (entity_id, alias_name, command_text, creator, active, usage_count, last_used, created_at, updated_at)
             VALUES (?1, ?2, ?3, ?4, 1, 0, NULL, ?5, ?5)",
            params![entity_id, alias_name, command_text, creator, now],
        )?;
        info!(entity_id, alias_name, "alias created");
        Ok(Alias {
            entity_id: entity_id.to_string(),
            alias_name: alias_name.to_string(),
            command_text: command_text.to_string(),
            creator: creator.to_string(),
            active: true,
            usage_count: 0,
            last_used: None,
            created_at: now.clone(),
            updated_at: now,
        })
    }

    /// `!alias remove <name>` — soft delete.
    pub fn remove(&self, entity_id: &str, alias_name: &str) -> Result<bool> {
        let db = self.db.lock().unwrap();
        let now = Utc::now().to_rfc3339();
        let affected = db.execute(
            "UPDATE aliases SET active = 0, updated_at = ?1
             WHERE entity_id = ?2 AND alias_name = ?3 AND active = 1",
            params![now, entity_id, alias_name],
        )?;
        Ok(affected > 0)
    }

    /// `!alias list` — active aliases for an entity, alphabetical.
    pub fn list(&self, entity_id: &str) -> Result<Vec<Alias>> {
        let db = self.db.lock().unwrap();
        let mut stmt = db.prepare(
            "SELECT entity_id, alias_name, command_text, creator, active, usage_count, last_used, created_at, updated_at
             FROM aliases WHERE entity_id = ?1 AND active = 1 ORDER BY alias_name ASC",
        )?;
        let rows = stmt.query_map(params![entity_id], row_to_alias)?;
        rows.collect::<std::result::Result<Vec<_>, _>>()
            .map_err(RouterError::from)
    }

    pub fn get_active(&self, entity_id: &str, alias_name: &str) -> Result<Option<Alias>> {
        let db = self.db.lock().unwrap();
        db.query_row(
            "SELECT entity_id, alias_name, command_text, creator, active, usage_count, last_used, created_at, updated_at
             FROM aliases WHERE entity_id = ?1 AND alias_name = ?2 AND active = 1",
            params![entity_id, alias_name],
            row_to_alias,
        )
        .optional()
        .map_err(RouterError::from)
    }

    /// Increment `usage_count` and stamp `last_used` — called every time
    /// the router expands this alias into a downstream command.
    pub fn record_usage(&self, entity_id: &str, alias_name: &str) -> Result<()> {
        let db = self.db.lock().unwrap();
        let now = Utc::now().to_rfc3339();
        db.execute(
            "UPDATE aliases SET usage_count = usage_count + 1, last_used = ?1
             WHERE entity_id = ?2 AND alias_name = ?3 AND active = 1",
            params![now, entity_id, alias_name],
        )?;
        debug!(entity_id, alias_name, "alias usage recorded");
        Ok(())
    }
}

fn row_to_alias(r: &rusqlite::Row) -> rusqlite::Result<Alias> {
    Ok(Alias {
        entity_id: r.get(0)?,
        alias_name: r.get(1)?,
        command_text: r.get(2)?,
        creator: r.get(3)?,
        active: r.get(4)?,
        usage_count: r.get(5)?,
        last_used: r.get(6)?,
        created_at: r.get(7)?,
        updated_at: r.get(8)?,
    })
}

fn init_db(conn: &Connection) -> rusqlite::Result<()> {
    conn.execute_batch(
        "CREATE TABLE IF NOT EXISTS aliases (
            entity_id     TEXT NOT NULL,
            alias_name    TEXT NOT NULL,
            command_text  TEXT NOT NULL,
            creator       TEXT NOT NULL,
            active        INTEGER NOT NULL DEFAULT 1,
            usage_count   INTEGER NOT NULL DEFAULT 0,
            last_used     TEXT,
            created_at    TEXT NOT NULL,
            updated_at    TEXT NOT NULL
        );
        CREATE UNIQUE INDEX IF NOT EXISTS idx_aliases_active_unique
            ON aliases(entity_id, alias_name) WHERE active = 1;",
    )
}

/// Expand an alias's stored command text against the invoking message,
/// interpolating `{user}`, `{arg1..n}`, and `{all_args}` — the dispatcher's
/// `Resolving Alias` step. `invoking_args` are the whitespace-split
/// arguments that followed the alias name in the original message.
pub fn expand(command_text: &str, user: &str, invoking_args: &[&str]) -> String {
    let mut out = command_text.replace("{user}", user);
    out = out.replace("{all_args}", &invoking_args.join(" "));
    for (i, arg) in invoking_args.iter().enumerate() {
        out = out.replace(&format!("{{arg{}}}", i + 1), arg);
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    fn store() -> AliasStore {
        AliasStore::new(Connection::open_in_memory().unwrap()).unwrap()
    }

    #[test]
    fn add_then_list_round_trips() {
        let s = store();
        s.add("twitch:s1:c7", "!so", "shoutout {arg1}", "mod-1").unwrap();
        let list = s.list("twitch:s1:c7").unwrap();
        assert_eq!(list.len(), 1);
        assert_eq!(list[0].command_text, "shoutout {arg1}");
    }

    #[test]
    fn duplicate_active_alias_conflicts() {
        let s = store();
        s.add("e1", "!so", "shoutout {arg1}", "mod-1").unwrap();
        let err = s.add("e1", "!so", "different", "mod-1").unwrap_err();
        assert_eq!(err.code(), "conflict");
    }

    #[test]
    fn remove_then_readd_succeeds() {
        let s = store();
        s.add("e1", "!so", "shoutout {arg1}", "mod-1").unwrap();
        assert!(s.remove("e1", "!so").unwrap());
        s.add("e1", "!so", "new text", "mod-2").unwrap();
        assert_eq!(s.get_active("e1", "!so").unwrap().unwrap().command_text, "new text");
    }

    #[test]
    fn record_usage_increments_count_and_stamps_last_used() {
        let s = store();
        s.add("e1", "!so", "shoutout {arg1}", "mod-1").unwrap();
        s.record_usage("e1", "!so").unwrap();
        s.record_usage("e1", "!so").unwrap();
        let a = s.get_active("e1", "!so").unwrap().unwrap();
        assert_eq!(a.usage_count, 2);
        assert!(a.last_used.is_some());
    }

    #[test]
    fn expand_interpolates_user_and_args() {
        let expanded = expand("shoutout {arg1} from {user}, all: {all_args}", "alice", &["bob", "extra"]);
        assert_eq!(expanded, "shoutout bob from alice, all: bob extra");
    }
}
