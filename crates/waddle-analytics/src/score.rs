use chrono::Utc;
use waddle_core::types::CommunityId;

use crate::types::{BotScore, Grade, ScoreComponents, SizeCategory};

/// Weighted composite: `0.30*bad_actor + 0.25*reputation + 0.20*security +
/// 0.25*ai_behavioral`, clamped to `[0,100]` and rounded to the nearest
/// integer — `overall` is modeled as an integer 0-100 (spec §3) and graded
/// on that rounded value (spec §8), not the raw weighted float.
pub fn composite_score(components: &ScoreComponents) -> f64 {
    let raw = 0.30 * components.bad_actor + 0.25 * components.reputation + 0.20 * components.security
        + 0.25 * components.ai_behavioral;
    raw.clamp(0.0, 100.0).round()
}

/// Builds a fresh `BotScore`, stamping `next_recalculation` 24h out so a
/// later read can detect staleness without a background scheduler.
pub fn compute(
    community_id: CommunityId,
    user_id: &str,
    components: ScoreComponents,
    active_users: u64,
    now: chrono::DateTime<Utc>,
) -> BotScore {
    let composite = composite_score(&components);
    BotScore {
        community_id,
        user_id: user_id.to_string(),
        components,
        composite,
        grade: Grade::from_score(composite),
        size_category: SizeCategory::from_active_users(active_users),
        computed_at: now.to_rfc3339(),
        next_recalculation: (now + chrono::Duration::hours(24)).to_rfc3339(),
    }
}

pub fn is_stale(score: &BotScore, now: chrono::DateTime<Utc>) -> bool {
    match chrono::DateTime::parse_from_rfc3339(&score.next_recalculation) {
        Ok(next) => now >= next,
        Err(_) => true,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn composite_is_clamped_and_weighted() {
        let components = ScoreComponents {
            bad_actor: 100.0,
            reputation: 100.0,
            security: 100.0,
            ai_behavioral: 100.0,
        };
        assert_eq!(composite_score(&components), 100.0);

        let components = ScoreComponents {
            bad_actor: 0.0,
            reputation: 0.0,
            security: 0.0,
            ai_behavioral: 0.0,
        };
        assert_eq!(composite_score(&components), 0.0);
    }

    #[test]
    fn composite_is_rounded_to_nearest_integer() {
        let components = ScoreComponents {
            bad_actor: 33.3,
            reputation: 0.0,
            security: 0.0,
            ai_behavioral: 0.0,
        };
        // raw = 0.30 * 33.3 = 9.99, rounds to 10.
        assert_eq!(composite_score(&components), 10.0);
    }

    #[test]
    fn grading_uses_the_rounded_composite_not_the_raw_float() {
        // raw = 0.30*90 + 0.25*89 + 0.20*90 + 0.25*89 = 89.5, which rounds
        // to 90 and must grade as A, not B.
        let components = ScoreComponents {
            bad_actor: 90.0,
            reputation: 89.0,
            security: 90.0,
            ai_behavioral: 89.0,
        };
        let composite = composite_score(&components);
        assert_eq!(composite, 90.0);
        assert_eq!(Grade::from_score(composite), Grade::A);
    }

    #[test]
    fn grade_thresholds_are_inclusive_at_boundary() {
        assert_eq!(Grade::from_score(90.0), Grade::A);
        assert_eq!(Grade::from_score(89.9), Grade::B);
        assert_eq!(Grade::from_score(60.0), Grade::D);
        assert_eq!(Grade::from_score(59.9), Grade::F);
    }

    #[test]
    fn size_category_boundaries() {
        assert_eq!(SizeCategory::from_active_users(49), SizeCategory::Small);
        assert_eq!(SizeCategory::from_active_users(50), SizeCategory::Medium);
        assert_eq!(SizeCategory::from_active_users(499), SizeCategory::Medium);
        assert_eq!(SizeCategory::from_active_users(500), SizeCategory::Large);
    }

    #[test]
    fn staleness_trips_after_24h() {
        let now = Utc::now();
        let score = compute(CommunityId(1), "u1", ScoreComponents::default(), 10, now);
        assert!(!is_stale(&score, now));
        assert!(is_stale(&score, now + chrono::Duration::hours(25)));
    }
}
