use rusqlite::{Connection, Result};

/// Initialise membership and grant tables. Safe to call on every startup.
pub fn init_db(conn: &Connection) -> Result<()> {
    conn.execute_batch(
        "CREATE TABLE IF NOT EXISTS community_members (
            community_id  INTEGER NOT NULL,
            user_id       TEXT NOT NULL,
            role          TEXT NOT NULL,
            joined_at     TEXT NOT NULL,
            PRIMARY KEY (community_id, user_id)
        );

        CREATE TABLE IF NOT EXISTS delegated_grants (
            id            INTEGER PRIMARY KEY AUTOINCREMENT,
            community_id  INTEGER NOT NULL,
            user_id       TEXT NOT NULL,
            resource      TEXT NOT NULL,
            capability    TEXT NOT NULL,
            granted_by    TEXT NOT NULL,
            granted_at    TEXT NOT NULL,
            expires_at    TEXT
        );
        CREATE INDEX IF NOT EXISTS idx_grants_lookup
            ON delegated_grants(community_id, user_id, resource, capability);",
    )
}
