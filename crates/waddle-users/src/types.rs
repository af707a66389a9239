use serde::{Deserialize, Serialize};
use waddle_core::types::{CommunityId, UserRole};

/// A user's role within one community. Roles do not carry across
/// communities — the same person may be `Owner` in one and `Visitor` in
/// another.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CommunityMember {
    pub community_id: CommunityId,
    pub user_id: String,
    pub role: UserRole,
    pub joined_at: String,
}

/// A per-event delegated capability grant — the third policy kind, e.g.
/// event-admin delegation for the calendar module: a user who
/// is not a community moderator may still be allowed to act on one
/// specific resource because the owning module delegated it to them.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DelegatedGrant {
    pub community_id: CommunityId,
    pub user_id: String,
    /// The module-defined resource this grant applies to, e.g. an event id.
    pub resource: String,
    /// The capability granted, e.g. `"event_admin"`.
    pub capability: String,
    pub granted_by: String,
    pub granted_at: String,
    /// `None` means the grant never expires.
    pub expires_at: Option<String>,
}

/// The outcome of one policy check, and of the full four-kind chain.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum PolicyDecision {
    Allowed,
    Denied { reason: String },
}

impl PolicyDecision {
    pub fn is_allowed(&self) -> bool {
        matches!(self, PolicyDecision::Allowed)
    }

    pub fn denied(reason: impl Into<String>) -> Self {
        PolicyDecision::Denied { reason: reason.into() }
    }
}
