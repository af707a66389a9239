use rusqlite::{Connection, Result};

/// Initialise the session correlation table — the audit record of each
/// session's terminal outcome. Active sessions live in-process; only the
/// final state is persisted here.
pub fn init_db(conn: &Connection) -> Result<()> {
    conn.execute_batch(
        "CREATE TABLE IF NOT EXISTS session_correlation (
            session_id   TEXT PRIMARY KEY,
            platform     TEXT NOT NULL,
            user_id      TEXT NOT NULL,
            state        TEXT NOT NULL,
            detail       TEXT,
            created_at   TEXT NOT NULL,
            updated_at   TEXT NOT NULL
        );
        CREATE INDEX IF NOT EXISTS idx_session_correlation_user
            ON session_correlation(user_id, created_at DESC);",
    )
}
