use serde::{Deserialize, Serialize};

/// Why a span was pulled out of the translatable text.
/// Classification order is earlier-wins: URL, email, mention, command,
/// emote, then an optional AI-uncertain check.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TokenKind {
    Url,
    Email,
    Mention,
    Command,
    Emote,
    AiUncertain,
}

/// One preserved span: `original` is restored into the translated output at
/// `placeholder`'s position, in ordinal order.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Token {
    pub ordinal: usize,
    pub placeholder: String,
    pub original: String,
    pub kind: TokenKind,
}

#[derive(Debug, Clone)]
pub struct PreprocessResult {
    pub processed_text: String,
    pub tokens: Vec<Token>,
}

/// Which spans the preprocessor masks, and how aggressively it defers
/// ambiguous tokens to an AI classifier. Mirrors
/// `waddle_core::config::TranslationConfig` but scoped to one call.
#[derive(Debug, Clone)]
pub struct PreprocessConfig {
    pub enabled: bool,
    pub preserve_mentions: bool,
    pub preserve_commands: bool,
    pub preserve_emails: bool,
    pub preserve_urls: bool,
    pub preserve_emotes: bool,
    pub ai_decision_mode: waddle_core::AiDecisionMode,
}

impl Default for PreprocessConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            preserve_mentions: true,
            preserve_commands: true,
            preserve_emails: true,
            preserve_urls: true,
            preserve_emotes: true,
            ai_decision_mode: waddle_core::AiDecisionMode::Uncertain,
        }
    }
}

/// `commercial | lightweight | ai_backed` — the fixed fallback order,
/// named as tagged variants rather than a string-keyed provider map.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ProviderKind {
    Commercial,
    Lightweight,
    AiBacked,
}

impl std::fmt::Display for ProviderKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ProviderKind::Commercial => write!(f, "commercial"),
            ProviderKind::Lightweight => write!(f, "lightweight"),
            ProviderKind::AiBacked => write!(f, "ai_backed"),
        }
    }
}

pub const FALLBACK_ORDER: [ProviderKind; 3] =
    [ProviderKind::Commercial, ProviderKind::Lightweight, ProviderKind::AiBacked];

/// Result of one provider's `translate` call.
#[derive(Debug, Clone)]
pub struct ProviderTranslation {
    pub translated_text: String,
    pub detected_lang: String,
    pub target_lang: String,
    pub confidence: f64,
    pub provider: ProviderKind,
}

/// A detected language and the detector's confidence in it.
#[derive(Debug, Clone, Copy)]
pub struct DetectedLanguage {
    pub lang: String,
    pub confidence: f64,
}

impl DetectedLanguage {
    pub fn new(lang: impl Into<String>, confidence: f64) -> Self {
        Self {
            lang: lang.into(),
            confidence,
        }
    }
}

/// Final response shape from the full translate call path.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TranslationOutcome {
    pub translated_text: String,
    pub detected_lang: String,
    pub target_lang: String,
    pub confidence: f64,
    pub provider: String,
    pub cached: bool,
    pub tokens_preserved: usize,
    pub original_text: String,
}

/// Read-only cache visibility into the durable cache tier.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct TranslationCacheStats {
    pub l1_hits: u64,
    pub l2_hits: u64,
    pub l3_hits: u64,
    pub misses: u64,
    pub l3_entries: u64,
}

impl From<waddle_cache::CacheStats> for TranslationCacheStats {
    fn from(s: waddle_cache::CacheStats) -> Self {
        Self {
            l1_hits: s.l1_hits,
            l2_hits: s.l2_hits,
            l3_hits: s.l3_hits,
            misses: s.misses,
            l3_entries: s.l3_entries,
        }
    }
}
