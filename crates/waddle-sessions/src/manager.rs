use std::sync::Mutex;

use chrono::Utc;
use rusqlite::{params, Connection};
use tracing::{debug, instrument};

use crate::aggregator::SessionAggregator;
use crate::db::init_db;
use crate::error::Result;
use crate::types::{Session, SessionState};

/// Owns the active-session table and the response aggregator. One instance
/// per router process; sessions are ephemeral in-process state plus a
/// durable correlation row recording each session's terminal outcome.
pub struct SessionManager {
    db: Mutex<Connection>,
    active: dashmap::DashMap<String, Session>,
    pub aggregator: SessionAggregator,
}

impl SessionManager {
    pub fn new(conn: Connection) -> Result<Self> {
        init_db(&conn)?;
        Ok(Self {
            db: Mutex::new(conn),
            active: dashmap::DashMap::new(),
            aggregator: SessionAggregator::new(),
        })
    }

    /// Construct a session from an inbound event and enter `Received`.
    #[instrument(skip(self, session))]
    pub fn begin(&self, session: Session) -> Result<()> {
        let now = Utc::now().to_rfc3339();
        {
            let db = self.db.lock().unwrap();
            db.execute(
                "INSERT INTO session_correlation
                 (session_id, platform, user_id, state, detail, created_at, updated_at)
                 VALUES (?1, ?2, ?3, ?4, NULL, ?5, ?5)",
                params![
                    session.id.as_str(),
                    session.platform.to_string(),
                    session.user_id,
                    session.state.label(),
                    now
                ],
            )?;
        }
        self.aggregator.open(session.id.as_str());
        self.active.insert(session.id.as_str().to_string(), session);
        Ok(())
    }

    pub fn get(&self, session_id: &str) -> Option<Session> {
        self.active.get(session_id).map(|s| s.clone())
    }

    /// Move a session to a new lifecycle state, persisting terminal states
    /// to the correlation table.
    #[instrument(skip(self))]
    pub fn transition(&self, session_id: &str, state: SessionState) -> Result<()> {
        debug!(session_id, new_state = state.label(), "session transition");
        let terminal = state.is_terminal();
        let detail = match &state {
            SessionState::Rejected { reason } | SessionState::Failed { reason } => Some(reason.clone()),
            _ => None,
        };

        if let Some(mut entry) = self.active.get_mut(session_id) {
            entry.state = state.clone();
        }

        let now = Utc::now().to_rfc3339();
        let db = self.db.lock().unwrap();
        db.execute(
            "UPDATE session_correlation SET state = ?1, detail = ?2, updated_at = ?3 WHERE session_id = ?4",
            params![state.label(), detail, now, session_id],
        )?;
        drop(db);

        if terminal {
            self.active.remove(session_id);
            self.aggregator.close(session_id);
        }
        Ok(())
    }

    pub fn correlation_state(&self, session_id: &str) -> Result<Option<String>> {
        let db = self.db.lock().unwrap();
        let state: Option<String> = db
            .query_row(
                "SELECT state FROM session_correlation WHERE session_id = ?1",
                params![session_id],
                |r| r.get(0),
            )
            .ok();
        Ok(state)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use waddle_core::types::{MessageType, Platform};

    fn manager() -> SessionManager {
        SessionManager::new(Connection::open_in_memory().unwrap()).unwrap()
    }

    fn sample_session() -> Session {
        Session::new(Platform::Twitch, "u1", "alice", None, "!help", MessageType::ChatMessage)
    }

    #[test]
    fn begin_then_get_round_trips() {
        let m = manager();
        let s = sample_session();
        let id = s.id.to_string();
        m.begin(s).unwrap();
        assert!(m.get(&id).is_some());
        assert_eq!(m.correlation_state(&id).unwrap().as_deref(), Some("received"));
    }

    #[test]
    fn terminal_transition_removes_from_active_and_persists() {
        let m = manager();
        let s = sample_session();
        let id = s.id.to_string();
        m.begin(s).unwrap();
        m.transition(&id, SessionState::Completed).unwrap();
        assert!(m.get(&id).is_none());
        assert_eq!(m.correlation_state(&id).unwrap().as_deref(), Some("completed"));
    }

    #[test]
    fn rejected_transition_persists_reason() {
        let m = manager();
        let s = sample_session();
        let id = s.id.to_string();
        m.begin(s).unwrap();
        m.transition(
            &id,
            SessionState::Rejected {
                reason: "unknown_entity".to_string(),
            },
        )
        .unwrap();
        let db = m.db.lock().unwrap();
        let detail: Option<String> = db
            .query_row(
                "SELECT detail FROM session_correlation WHERE session_id = ?1",
                params![id],
                |r| r.get(0),
            )
            .unwrap();
        assert_eq!(detail.as_deref(), Some("unknown_entity"));
    }
}
