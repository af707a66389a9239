use chrono::Utc;
use rusqlite::{params, Connection, OptionalExtension};
use tracing::{debug, info};
use waddle_core::community::CommunityConfig;
use waddle_core::types::{CommunityId, EntityId, Platform};

use crate::error::Result;

/// A platform-addressable location: `platform:server:channel`. Created by
/// the Gateway Creator when a community activates a platform channel;
/// destroyed on deactivation.
#[derive(Debug, Clone)]
pub struct Entity {
    pub id: EntityId,
    pub platform: Platform,
    pub server_id: String,
    pub channel_id: String,
    pub community_id: CommunityId,
    pub active: bool,
}

/// Durable `(platform, server_id, channel_id) -> (entity, community)`
/// lookup the router's `Resolving` step consults on every inbound event,
/// and that the Gateway Creator writes on activation/deactivation.
pub struct EntityStore {
    db: std::sync::Mutex<Connection>,
}

impl EntityStore {
    pub fn new(conn: Connection) -> Result<Self> {
        init_db(&conn)?;
        Ok(Self {
            db: std::sync::Mutex::new(conn),
        })
    }

    /// Create-if-missing: re-activating an existing `(platform, server,
    /// channel)` triple updates its community and flips `active` back on
    /// rather than erroring, matching the Gateway Creator's tolerant
    /// create-if-missing contract.
    pub fn create_or_activate(
        &self,
        platform: Platform,
        server_id: &str,
        channel_id: &str,
        community_id: CommunityId,
    ) -> Result<Entity> {
        let id = EntityId::new(&platform, server_id, channel_id);
        let db = self.db.lock().unwrap();
        db.execute(
            "INSERT INTO entities (entity_id, platform, server_id, channel_id, community_id, active)
             VALUES (?1, ?2, ?3, ?4, ?5, 1)
             ON CONFLICT(entity_id) DO UPDATE SET
                community_id = excluded.community_id, active = 1",
            params![id.as_str(), platform.to_string(), server_id, channel_id, community_id.0],
        )?;
        info!(entity_id = %id, community_id = community_id.0, "entity activated");
        Ok(Entity {
            id,
            platform,
            server_id: server_id.to_string(),
            channel_id: channel_id.to_string(),
            community_id,
            active: true,
        })
    }

    /// Soft-deactivate an entity. Tolerates the entity not existing, since
    /// the Gateway Creator's delete path must tolerate partial cleanup.
    pub fn deactivate(&self, platform: Platform, server_id: &str, channel_id: &str) -> Result<()> {
        let id = EntityId::new(&platform, server_id, channel_id);
        let db = self.db.lock().unwrap();
        db.execute(
            "UPDATE entities SET active = 0 WHERE entity_id = ?1",
            params![id.as_str()],
        )?;
        debug!(entity_id = %id, "entity deactivated");
        Ok(())
    }

    /// Resolve `(platform, server_id, channel_id)` to its entity, if an
    /// active one exists — the router's `Resolving` step.
    pub fn resolve(&self, platform: Platform, server_id: &str, channel_id: &str) -> Result<Option<Entity>> {
        let id = EntityId::new(&platform, server_id, channel_id);
        let db = self.db.lock().unwrap();
        let row = db
            .query_row(
                "SELECT server_id, channel_id, community_id, active FROM entities
                 WHERE entity_id = ?1 AND active = 1",
                params![id.as_str()],
                |r| {
                    Ok((
                        r.get::<_, String>(0)?,
                        r.get::<_, String>(1)?,
                        r.get::<_, i64>(2)?,
                        r.get::<_, bool>(3)?,
                    ))
                },
            )
            .optional()?;

        Ok(row.map(|(server_id, channel_id, community_id, active)| Entity {
            id: id.clone(),
            platform,
            server_id,
            channel_id,
            community_id: CommunityId(community_id),
            active,
        }))
    }
}

/// Durable community records: id, owning user, and the config map. Entities
/// belong to exactly one community; a community may own many.
pub struct CommunityStore {
    db: std::sync::Mutex<Connection>,
}

impl CommunityStore {
    pub fn new(conn: Connection) -> Result<Self> {
        init_db(&conn)?;
        Ok(Self {
            db: std::sync::Mutex::new(conn),
        })
    }

    pub fn create(&self, owner_user_id: &str) -> Result<CommunityId> {
        let db = self.db.lock().unwrap();
        let now = Utc::now().to_rfc3339();
        let config = serde_json::to_string(&CommunityConfig::default())?;
        db.execute(
            "INSERT INTO communities (owner_user_id, config, created_at) VALUES (?1, ?2, ?3)",
            params![owner_user_id, config, now],
        )?;
        Ok(CommunityId(db.last_insert_rowid()))
    }

    pub fn get(&self, id: CommunityId) -> Result<Option<(String, CommunityConfig)>> {
        let db = self.db.lock().unwrap();
        let row = db
            .query_row(
                "SELECT owner_user_id, config FROM communities WHERE id = ?1",
                params![id.0],
                |r| Ok((r.get::<_, String>(0)?, r.get::<_, String>(1)?)),
            )
            .optional()?;
        Ok(match row {
            Some((owner, config_str)) => Some((owner, serde_json::from_str(&config_str)?)),
            None => None,
        })
    }

    pub fn update_config(&self, id: CommunityId, config: &CommunityConfig) -> Result<()> {
        let db = self.db.lock().unwrap();
        let config_str = serde_json::to_string(config)?;
        db.execute(
            "UPDATE communities SET config = ?1 WHERE id = ?2",
            params![config_str, id.0],
        )?;
        Ok(())
    }
}

fn init_db(conn: &Connection) -> Result<()> {
    conn.execute_batch(
        "CREATE TABLE IF NOT EXISTS communities (
            id            INTEGER PRIMARY KEY AUTOINCREMENT,
            owner_user_id TEXT NOT NULL,
            config        TEXT NOT NULL,
            created_at    TEXT NOT NULL
        );

        CREATE TABLE IF NOT EXISTS entities (
            entity_id     TEXT PRIMARY KEY,
            platform      TEXT NOT NULL,
            server_id     TEXT NOT NULL,
            channel_id    TEXT NOT NULL,
            community_id  INTEGER NOT NULL,
            active        INTEGER NOT NULL DEFAULT 1
        );
        CREATE INDEX IF NOT EXISTS idx_entities_community ON entities(community_id);",
    )?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn conn() -> Connection {
        Connection::open_in_memory().unwrap()
    }

    #[test]
    fn unresolved_entity_is_none() {
        let store = EntityStore::new(conn()).unwrap();
        assert!(store.resolve(Platform::Twitch, "s1", "c7").unwrap().is_none());
    }

    #[test]
    fn create_then_resolve_round_trips() {
        let store = EntityStore::new(conn()).unwrap();
        store
            .create_or_activate(Platform::Twitch, "s1", "c7", CommunityId(42))
            .unwrap();
        let e = store.resolve(Platform::Twitch, "s1", "c7").unwrap().unwrap();
        assert_eq!(e.community_id, CommunityId(42));
        assert!(e.active);
    }

    #[test]
    fn deactivate_makes_resolve_return_none() {
        let store = EntityStore::new(conn()).unwrap();
        store
            .create_or_activate(Platform::Twitch, "s1", "c7", CommunityId(42))
            .unwrap();
        store.deactivate(Platform::Twitch, "s1", "c7").unwrap();
        assert!(store.resolve(Platform::Twitch, "s1", "c7").unwrap().is_none());
    }

    #[test]
    fn reactivating_updates_community() {
        let store = EntityStore::new(conn()).unwrap();
        store
            .create_or_activate(Platform::Twitch, "s1", "c7", CommunityId(1))
            .unwrap();
        store
            .create_or_activate(Platform::Twitch, "s1", "c7", CommunityId(2))
            .unwrap();
        let e = store.resolve(Platform::Twitch, "s1", "c7").unwrap().unwrap();
        assert_eq!(e.community_id, CommunityId(2));
    }

    #[test]
    fn community_create_then_get() {
        let store = CommunityStore::new(conn()).unwrap();
        let id = store.create("owner-1").unwrap();
        let (owner, config) = store.get(id).unwrap().unwrap();
        assert_eq!(owner, "owner-1");
        assert!(!config.translation_enabled);
    }
}
