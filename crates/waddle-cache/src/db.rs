use rusqlite::{Connection, Result};

/// Initialise the L3 durable tier. Safe to call on every startup (idempotent).
pub fn init_db(conn: &Connection) -> Result<()> {
    conn.execute_batch(
        "CREATE TABLE IF NOT EXISTS cache_entries (
            key           TEXT PRIMARY KEY,
            value         TEXT NOT NULL,
            created_at    TEXT NOT NULL,
            access_count  INTEGER NOT NULL DEFAULT 0,
            last_accessed TEXT NOT NULL
        );
        CREATE INDEX IF NOT EXISTS idx_cache_entries_last_accessed
            ON cache_entries(last_accessed);",
    )
}
