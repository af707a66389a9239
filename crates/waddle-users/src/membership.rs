use chrono::Utc;
use rusqlite::{params, Connection, OptionalExtension};
use tracing::debug;
use waddle_core::types::{CommunityId, UserRole};

use crate::error::Result;
use crate::types::CommunityMember;

/// Community membership and role store. Users not yet seen in a community
/// default to `Visitor` rather than erroring
/// — a first-time chatter is still a valid session participant.
pub struct MembershipStore {
    db: std::sync::Mutex<Connection>,
}

impl MembershipStore {
    pub fn new(conn: Connection) -> Result<Self> {
        crate::db::init_db(&conn)?;
        Ok(Self {
            db: std::sync::Mutex::new(conn),
        })
    }

    /// Look up a user's role in a community, defaulting to `Visitor`.
    pub fn role_of(&self, community_id: CommunityId, user_id: &str) -> Result<UserRole> {
        let db = self.db.lock().unwrap();
        let role: Option<String> = db
            .query_row(
                "SELECT role FROM community_members WHERE community_id = ?1 AND user_id = ?2",
                params![community_id.0, user_id],
                |r| r.get(0),
            )
            .optional()?;
        Ok(role
            .and_then(|s| s.parse().ok())
            .unwrap_or(UserRole::Visitor))
    }

    /// Upsert a member's role — used by moderation commands that
    /// promote/demote, and by first-contact auto-enrollment at `Member`.
    pub fn set_role(&self, community_id: CommunityId, user_id: &str, role: UserRole) -> Result<()> {
        let db = self.db.lock().unwrap();
        let now = Utc::now().to_rfc3339();
        db.execute(
            "INSERT INTO community_members (community_id, user_id, role, joined_at)
             VALUES (?1, ?2, ?3, ?4)
             ON CONFLICT(community_id, user_id) DO UPDATE SET role = excluded.role",
            params![community_id.0, user_id, role.to_string(), now],
        )?;
        debug!(community_id = community_id.0, user_id, %role, "role set");
        Ok(())
    }

    pub fn member(&self, community_id: CommunityId, user_id: &str) -> Result<Option<CommunityMember>> {
        let db = self.db.lock().unwrap();
        let row = db
            .query_row(
                "SELECT role, joined_at FROM community_members WHERE community_id = ?1 AND user_id = ?2",
                params![community_id.0, user_id],
                |r| Ok((r.get::<_, String>(0)?, r.get::<_, String>(1)?)),
            )
            .optional()?;
        Ok(row.map(|(role, joined_at)| CommunityMember {
            community_id,
            user_id: user_id.to_string(),
            role: role.parse().unwrap_or(UserRole::Visitor),
            joined_at,
        }))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn store() -> MembershipStore {
        MembershipStore::new(Connection::open_in_memory().unwrap()).unwrap()
    }

    #[test]
    fn unknown_user_defaults_to_visitor() {
        let s = store();
        assert_eq!(s.role_of(CommunityId(1), "u1").unwrap(), UserRole::Visitor);
    }

    #[test]
    fn set_role_then_role_of_round_trips() {
        let s = store();
        s.set_role(CommunityId(1), "u1", UserRole::Moderator).unwrap();
        assert_eq!(s.role_of(CommunityId(1), "u1").unwrap(), UserRole::Moderator);
    }

    #[test]
    fn roles_are_scoped_per_community() {
        let s = store();
        s.set_role(CommunityId(1), "u1", UserRole::Owner).unwrap();
        assert_eq!(s.role_of(CommunityId(2), "u1").unwrap(), UserRole::Visitor);
    }
}
