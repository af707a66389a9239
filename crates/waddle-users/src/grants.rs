use chrono::Utc;
use rusqlite::{params, Connection};
use waddle_core::types::CommunityId;

use crate::error::Result;
use crate::types::DelegatedGrant;

/// Store for per-event delegated capability grants — the third policy kind
/// in the authorization chain (e.g. calendar event-admin delegation).
pub struct GrantStore {
    db: std::sync::Mutex<Connection>,
}

impl GrantStore {
    pub fn new(conn: Connection) -> Result<Self> {
        crate::db::init_db(&conn)?;
        Ok(Self {
            db: std::sync::Mutex::new(conn),
        })
    }

    pub fn grant(
        &self,
        community_id: CommunityId,
        user_id: &str,
        resource: &str,
        capability: &str,
        granted_by: &str,
        expires_at: Option<&str>,
    ) -> Result<()> {
        let db = self.db.lock().unwrap();
        let now = Utc::now().to_rfc3339();
        db.execute(
            "INSERT INTO delegated_grants
             (community_id, user_id, resource, capability, granted_by, granted_at, expires_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
            params![community_id.0, user_id, resource, capability, granted_by, now, expires_at],
        )?;
        Ok(())
    }

    /// Whether `user_id` currently holds `capability` on `resource`,
    /// ignoring grants whose `expires_at` has passed.
    pub fn has_capability(
        &self,
        community_id: CommunityId,
        user_id: &str,
        resource: &str,
        capability: &str,
    ) -> Result<bool> {
        let db = self.db.lock().unwrap();
        let now = Utc::now().to_rfc3339();
        let count: i64 = db.query_row(
            "SELECT COUNT(*) FROM delegated_grants
             WHERE community_id = ?1 AND user_id = ?2 AND resource = ?3 AND capability = ?4
               AND (expires_at IS NULL OR expires_at > ?5)",
            params![community_id.0, user_id, resource, capability, now],
            |r| r.get(0),
        )?;
        Ok(count > 0)
    }

    pub fn grants_for(&self, community_id: CommunityId, user_id: &str) -> Result<Vec<DelegatedGrant>> {
        let db = self.db.lock().unwrap();
        let mut stmt = db.prepare(
            "SELECT resource, capability, granted_by, granted_at, expires_at
             FROM delegated_grants WHERE community_id = ?1 AND user_id = ?2",
        )?;
        let rows = stmt.query_map(params![community_id.0, user_id], |r| {
            Ok(DelegatedGrant {
                community_id,
                user_id: user_id.to_string(),
                resource: r.get(0)?,
                capability: r.get(1)?,
                granted_by: r.get(2)?,
                granted_at: r.get(3)?,
                expires_at: r.get(4)?,
            })
        })?;
        rows.collect::<std::result::Result<Vec<_>, _>>()
            .map_err(crate::error::PolicyError::from)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn store() -> GrantStore {
        GrantStore::new(Connection::open_in_memory().unwrap()).unwrap()
    }

    #[test]
    fn ungranted_capability_is_absent() {
        let s = store();
        assert!(!s
            .has_capability(CommunityId(1), "u1", "event-42", "event_admin")
            .unwrap());
    }

    #[test]
    fn grant_then_has_capability() {
        let s = store();
        s.grant(CommunityId(1), "u1", "event-42", "event_admin", "owner-1", None)
            .unwrap();
        assert!(s
            .has_capability(CommunityId(1), "u1", "event-42", "event_admin")
            .unwrap());
    }

    #[test]
    fn expired_grant_is_not_honored() {
        let s = store();
        s.grant(
            CommunityId(1),
            "u1",
            "event-42",
            "event_admin",
            "owner-1",
            Some("2000-01-01T00:00:00Z"),
        )
        .unwrap();
        assert!(!s
            .has_capability(CommunityId(1), "u1", "event-42", "event_admin")
            .unwrap());
    }
}
