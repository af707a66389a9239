use serde::{Deserialize, Serialize};
use waddle_core::types::CommunityId;

/// Distinct active users over the scoring window determine the size
/// category.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SizeCategory {
    Small,
    Medium,
    Large,
}

impl SizeCategory {
    pub fn from_active_users(count: u64) -> Self {
        if count < 50 {
            SizeCategory::Small
        } else if count < 500 {
            SizeCategory::Medium
        } else {
            SizeCategory::Large
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Grade {
    A,
    B,
    C,
    D,
    F,
}

impl Grade {
    pub fn from_score(score: f64) -> Self {
        if score >= 90.0 {
            Grade::A
        } else if score >= 80.0 {
            Grade::B
        } else if score >= 70.0 {
            Grade::C
        } else if score >= 60.0 {
            Grade::D
        } else {
            Grade::F
        }
    }
}

/// The four weighted inputs to the composite score, each computed over a
/// 30-day activity window.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize)]
pub struct ScoreComponents {
    /// Percentage of a user's activity flagged as bad-actor behavior.
    pub bad_actor: f64,
    /// Blended reputation signal from community standing.
    pub reputation: f64,
    /// Security-violation rate (bans, mutes, moderation actions).
    pub security: f64,
    /// AI-behavioral-anomaly rate from the classification pipeline.
    pub ai_behavioral: f64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BotScore {
    pub community_id: CommunityId,
    pub user_id: String,
    pub components: ScoreComponents,
    pub composite: f64,
    pub grade: Grade,
    pub size_category: SizeCategory,
    pub computed_at: String,
    pub next_recalculation: String,
}
