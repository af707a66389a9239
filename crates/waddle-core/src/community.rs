//! The tenant boundary: a community owns entities, and all caches,
//! permissions, configuration, and scoring are scoped to it.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};

use crate::types::CommunityId;

/// `never | uncertain | always` — how aggressively the translation
/// preprocessor sends ambiguous tokens to an AI classifier.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AiDecisionMode {
    Never,
    Uncertain,
    Always,
}

impl Default for AiDecisionMode {
    fn default() -> Self {
        AiDecisionMode::Uncertain
    }
}

impl std::str::FromStr for AiDecisionMode {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "never" => Ok(AiDecisionMode::Never),
            "uncertain" => Ok(AiDecisionMode::Uncertain),
            "always" => Ok(AiDecisionMode::Always),
            other => Err(format!("unknown ai_decision_mode: {other}")),
        }
    }
}

/// A per-`(module)` rate limit rule: at most `limit` invocations per
/// `window_secs`, enforced as a fixed-window counter.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct RateLimitRule {
    pub limit: u32,
    pub window_secs: u64,
}

impl Default for RateLimitRule {
    fn default() -> Self {
        Self {
            limit: 20,
            window_secs: 60,
        }
    }
}

/// The community-scoped configuration map: translation settings,
/// AI-decision mode, question triggers, and per-module rate limits.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct CommunityConfig {
    pub translation_enabled: bool,
    #[serde(default = "default_target_lang")]
    pub translation_target_lang: String,
    #[serde(default)]
    pub ai_decision_mode: AiDecisionMode,
    /// Phrases that, when the message text contains one, match the
    /// "community-configured question triggers" alias-resolution step.
    #[serde(default)]
    pub question_triggers: Vec<String>,
    /// Per-module rate limit overrides; modules without an entry use the
    /// policy engine's default rule.
    #[serde(default)]
    pub rate_limits: HashMap<String, RateLimitRule>,
}

fn default_target_lang() -> String {
    "en".to_string()
}

/// The tenant boundary itself.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Community {
    pub id: CommunityId,
    pub owner_user_id: String,
    pub config: CommunityConfig,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ai_decision_mode_parses_all_variants() {
        assert_eq!("never".parse::<AiDecisionMode>().unwrap(), AiDecisionMode::Never);
        assert_eq!(
            "uncertain".parse::<AiDecisionMode>().unwrap(),
            AiDecisionMode::Uncertain
        );
        assert_eq!("always".parse::<AiDecisionMode>().unwrap(), AiDecisionMode::Always);
        assert!("bogus".parse::<AiDecisionMode>().is_err());
    }
}
