use std::sync::Mutex;

use rusqlite::{params, Connection, OptionalExtension};
use waddle_core::types::{CommunityId, Platform};

use crate::error::Result;
use crate::types::{Gateway, PlatformServer};

pub struct GatewayStore {
    db: Mutex<Connection>,
}

impl GatewayStore {
    pub fn new(conn: Connection) -> Result<Self> {
        init_db(&conn)?;
        Ok(Self { db: Mutex::new(conn) })
    }

    /// Create-if-missing platform server record.
    pub fn ensure_platform_server(&self, platform: Platform, server_id: &str, community_id: CommunityId) -> Result<PlatformServer> {
        let db = self.db.lock().unwrap();
        db.execute(
            "INSERT INTO platform_servers (platform, server_id, community_id) VALUES (?1, ?2, ?3)
             ON CONFLICT(platform, server_id) DO NOTHING",
            params![platform.to_string(), server_id, community_id.0],
        )?;
        Ok(PlatformServer {
            platform,
            server_id: server_id.to_string(),
            community_id,
        })
    }

    /// Register a gateway with its activation code.
    pub fn register_gateway(
        &self,
        platform: Platform,
        server_id: &str,
        channel_id: &str,
        community_id: CommunityId,
        activation_code: &str,
    ) -> Result<()> {
        let db = self.db.lock().unwrap();
        db.execute(
            "INSERT INTO gateways (platform, server_id, channel_id, community_id, activation_code, activated)
             VALUES (?1, ?2, ?3, ?4, ?5, 0)
             ON CONFLICT(platform, server_id, channel_id) DO UPDATE SET
                community_id = excluded.community_id, activation_code = excluded.activation_code",
            params![platform.to_string(), server_id, channel_id, community_id.0, activation_code],
        )?;
        Ok(())
    }

    pub fn mark_activated(&self, platform: Platform, server_id: &str, channel_id: &str) -> Result<()> {
        let db = self.db.lock().unwrap();
        db.execute(
            "UPDATE gateways SET activated = 1 WHERE platform = ?1 AND server_id = ?2 AND channel_id = ?3",
            params![platform.to_string(), server_id, channel_id],
        )?;
        Ok(())
    }

    pub fn get_gateway(&self, platform: Platform, server_id: &str, channel_id: &str) -> Result<Option<Gateway>> {
        let db = self.db.lock().unwrap();
        let row = db
            .query_row(
                "SELECT community_id, activation_code, activated FROM gateways
                 WHERE platform = ?1 AND server_id = ?2 AND channel_id = ?3",
                params![platform.to_string(), server_id, channel_id],
                |r| {
                    Ok((
                        r.get::<_, i64>(0)?,
                        r.get::<_, String>(1)?,
                        r.get::<_, bool>(2)?,
                    ))
                },
            )
            .optional()?;

        Ok(row.map(|(community_id, activation_code, activated)| Gateway {
            platform,
            server_id: server_id.to_string(),
            channel_id: channel_id.to_string(),
            community_id: CommunityId(community_id),
            activation_code,
            activated,
        }))
    }

    /// Reverse of registration — used by the delete path, which tolerates
    /// the row not existing.
    pub fn remove_gateway(&self, platform: Platform, server_id: &str, channel_id: &str) -> Result<()> {
        let db = self.db.lock().unwrap();
        db.execute(
            "DELETE FROM gateways WHERE platform = ?1 AND server_id = ?2 AND channel_id = ?3",
            params![platform.to_string(), server_id, channel_id],
        )?;
        Ok(())
    }
}

fn init_db(conn: &Connection) -> Result<()> {
    conn.execute_batch(
        "CREATE TABLE IF NOT EXISTS platform_servers (
            platform     TEXT NOT NULL,
            server_id    TEXT NOT NULL,
            community_id INTEGER NOT NULL,
            PRIMARY KEY (platform, server_id)
        );

        CREATE TABLE IF NOT EXISTS gateways (
            platform         TEXT NOT NULL,
            server_id        TEXT NOT NULL,
            channel_id       TEXT NOT NULL,
            community_id     INTEGER NOT NULL,
            activation_code  TEXT NOT NULL,
            activated        INTEGER NOT NULL DEFAULT 0,
            PRIMARY KEY (platform, server_id, channel_id)
        );",
    )?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn store() -> GatewayStore {
        GatewayStore::new(Connection::open_in_memory().unwrap()).unwrap()
    }

    #[test]
    fn register_then_get_round_trips() {
        let store = store();
        store.ensure_platform_server(Platform::Twitch, "s1", CommunityId(1)).unwrap();
        store.register_gateway(Platform::Twitch, "s1", "c1", CommunityId(1), "abc123").unwrap();
        let gw = store.get_gateway(Platform::Twitch, "s1", "c1").unwrap().unwrap();
        assert_eq!(gw.activation_code, "abc123");
        assert!(!gw.activated);
    }

    #[test]
    fn mark_activated_flips_flag() {
        let store = store();
        store.register_gateway(Platform::Twitch, "s1", "c1", CommunityId(1), "abc123").unwrap();
        store.mark_activated(Platform::Twitch, "s1", "c1").unwrap();
        let gw = store.get_gateway(Platform::Twitch, "s1", "c1").unwrap().unwrap();
        assert!(gw.activated);
    }

    #[test]
    fn remove_missing_gateway_is_not_an_error() {
        let store = store();
        store.remove_gateway(Platform::Twitch, "s1", "c1").unwrap();
    }
}
