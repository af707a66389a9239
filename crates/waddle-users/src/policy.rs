use tracing::info;
use waddle_core::types::{CommunityId, UserRole};

use crate::error::Result;
use crate::grants::GrantStore;
use crate::membership::MembershipStore;
use crate::ratelimit::RateLimiter;
use crate::types::PolicyDecision;

/// One policy request: everything the four-kind chain needs to decide
/// whether a module invocation proceeds.
pub struct PolicyRequest<'a> {
    pub community_id: CommunityId,
    pub user_id: &'a str,
    pub module: &'a str,
    pub required_role: UserRole,
    pub rate_limit: u32,
    pub rate_window_secs: u64,
    /// A delegated-grant check, when the module needs one for this
    /// specific resource (e.g. calendar event id). `None` skips this kind.
    pub required_capability: Option<(&'a str, &'a str)>,
    /// Feature flags already resolved by the caller (e.g. translation
    /// enabled) — the policy engine only asserts they are all true.
    pub feature_flags_satisfied: bool,
}

/// Evaluates the four policy kinds in a fixed order:
/// rate limit → community membership/role → delegated grants → content/
/// feature flags. Any denial short-circuits the remaining checks.
pub struct PolicyEngine {
    pub membership: MembershipStore,
    pub grants: GrantStore,
    pub rate_limiter: RateLimiter,
}

impl PolicyEngine {
    pub fn new(membership: MembershipStore, grants: GrantStore) -> Self {
        Self {
            membership,
            grants,
            rate_limiter: RateLimiter::new(),
        }
    }

    pub fn evaluate(&self, req: &PolicyRequest, now_secs: u64) -> Result<PolicyDecision> {
        if !self.rate_limiter.check_and_record(
            req.community_id,
            req.user_id,
            req.module,
            req.rate_limit,
            req.rate_window_secs,
            now_secs,
        ) {
            return Ok(self.deny(req, "rate limit exceeded"));
        }

        let role = self.membership.role_of(req.community_id, req.user_id)?;
        if !role.satisfies(req.required_role) {
            return Ok(self.deny(req, &format!("role {role} does not satisfy required {}", req.required_role)));
        }

        if let Some((resource, capability)) = req.required_capability {
            if !self
                .grants
                .has_capability(req.community_id, req.user_id, resource, capability)?
            {
                return Ok(self.deny(req, &format!("missing delegated capability {capability} on {resource}")));
            }
        }

        if !req.feature_flags_satisfied {
            return Ok(self.deny(req, "required feature flag is not enabled for this community"));
        }

        info!(
            community_id = req.community_id.0,
            user_id = req.user_id,
            module = req.module,
            "policy check passed"
        );
        Ok(PolicyDecision::Allowed)
    }

    fn deny(&self, req: &PolicyRequest, reason: &str) -> PolicyDecision {
        info!(
            community_id = req.community_id.0,
            user_id = req.user_id,
            module = req.module,
            reason,
            "policy check denied"
        );
        PolicyDecision::denied(reason)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rusqlite::Connection;

    fn engine() -> PolicyEngine {
        PolicyEngine::new(
            MembershipStore::new(Connection::open_in_memory().unwrap()).unwrap(),
            GrantStore::new(Connection::open_in_memory().unwrap()).unwrap(),
        )
    }

    fn base_req<'a>(community_id: CommunityId, user_id: &'a str) -> PolicyRequest<'a> {
        PolicyRequest {
            community_id,
            user_id,
            module: "help_mod",
            required_role: UserRole::Member,
            rate_limit: 10,
            rate_window_secs: 60,
            required_capability: None,
            feature_flags_satisfied: true,
        }
    }

    #[test]
    fn visitor_denied_member_required() {
        let e = engine();
        let req = base_req(CommunityId(1), "u1");
        let decision = e.evaluate(&req, 1000).unwrap();
        assert_eq!(decision, PolicyDecision::denied("role visitor does not satisfy required member"));
    }

    #[test]
    fn member_allowed_when_all_checks_pass() {
        let e = engine();
        e.membership.set_role(CommunityId(1), "u1", UserRole::Member).unwrap();
        let req = base_req(CommunityId(1), "u1");
        assert_eq!(e.evaluate(&req, 1000).unwrap(), PolicyDecision::Allowed);
    }

    #[test]
    fn rate_limit_short_circuits_before_role_check() {
        let e = engine();
        let mut req = base_req(CommunityId(1), "u1");
        req.rate_limit = 1;
        // First call consumes the only slot in this window; u1 is a
        // Visitor so it would also fail the role check, but the denial
        // reason below must still be "rate limit exceeded" to prove rate
        // limiting is evaluated first.
        let _ = e.evaluate(&req, 1000).unwrap();
        let decision = e.evaluate(&req, 1000).unwrap();
        assert_eq!(decision, PolicyDecision::denied("rate limit exceeded"));
    }

    #[test]
    fn missing_delegated_capability_denies() {
        let e = engine();
        e.membership.set_role(CommunityId(1), "u1", UserRole::Member).unwrap();
        let mut req = base_req(CommunityId(1), "u1");
        req.required_capability = Some(("event-1", "event_admin"));
        let decision = e.evaluate(&req, 1000).unwrap();
        assert_eq!(
            decision,
            PolicyDecision::denied("missing delegated capability event_admin on event-1")
        );
    }

    #[test]
    fn feature_flag_gate_denies_last() {
        let e = engine();
        e.membership.set_role(CommunityId(1), "u1", UserRole::Member).unwrap();
        let mut req = base_req(CommunityId(1), "u1");
        req.feature_flags_satisfied = false;
        let decision = e.evaluate(&req, 1000).unwrap();
        assert_eq!(
            decision,
            PolicyDecision::denied("required feature flag is not enabled for this community")
        );
    }
}
