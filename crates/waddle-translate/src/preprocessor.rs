use std::sync::OnceLock;

use regex::Regex;

use crate::types::{PreprocessConfig, PreprocessResult, Token, TokenKind};

fn url_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"https?://[^\s]+").unwrap())
}

fn email_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"[A-Za-z0-9._%+-]+@[A-Za-z0-9.-]+\.[A-Za-z]{2,}").unwrap())
}

fn mention_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"@[A-Za-z0-9_]+").unwrap())
}

fn command_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"![A-Za-z][A-Za-z0-9_]*").unwrap())
}

/// Lexer for "looks like an identifier but didn't match any pattern" tokens
/// — candidates for AI-uncertain classification in `uncertain` mode.
fn identifier_like_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"\b[A-Za-z][A-Za-z0-9]{2,}[0-9]+[A-Za-z0-9]*\b").unwrap())
}

/// Turns a raw message into `(processed_text, ordered_tokens)`: a
/// translator-safe string with `TOK{n}`-style placeholders standing in for
/// every non-translatable span, plus the original spans to restore them
/// Classification order is earlier-wins: URL, email, mention, command,
/// platform emote, then (when enabled) an AI-uncertain pattern check.
pub struct TranslationPreprocessor<'a> {
    emote_lookup: Option<&'a dyn Fn(&str, Option<&str>) -> Vec<String>>,
}

impl<'a> TranslationPreprocessor<'a> {
    pub fn new() -> Self {
        Self { emote_lookup: None }
    }

    /// Attach a per-platform/channel emote-name resolver. Returns the set of
    /// literal emote names recognised for that platform/channel.
    pub fn with_emote_lookup(mut self, lookup: &'a dyn Fn(&str, Option<&str>) -> Vec<String>) -> Self {
        self.emote_lookup = Some(lookup);
        self
    }

    pub fn preprocess(&self, text: &str, platform: &str, channel_id: Option<&str>, config: &PreprocessConfig) -> PreprocessResult {
        if !config.enabled {
            return PreprocessResult {
                processed_text: text.to_string(),
                tokens: Vec::new(),
            };
        }

        let mut spans: Vec<(usize, usize, TokenKind)> = Vec::new();

        if config.preserve_urls {
            for m in url_re().find_iter(text) {
                spans.push((m.start(), m.end(), TokenKind::Url));
            }
        }
        if config.preserve_emails {
            for m in email_re().find_iter(text) {
                if !spans.iter().any(|(s, e, _)| overlaps(*s, *e, m.start(), m.end())) {
                    spans.push((m.start(), m.end(), TokenKind::Email));
                }
            }
        }
        if config.preserve_mentions {
            for m in mention_re().find_iter(text) {
                if !spans.iter().any(|(s, e, _)| overlaps(*s, *e, m.start(), m.end())) {
                    spans.push((m.start(), m.end(), TokenKind::Mention));
                }
            }
        }
        if config.preserve_commands {
            for m in command_re().find_iter(text) {
                if !spans.iter().any(|(s, e, _)| overlaps(*s, *e, m.start(), m.end())) {
                    spans.push((m.start(), m.end(), TokenKind::Command));
                }
            }
        }
        if config.preserve_emotes {
            if let Some(lookup) = self.emote_lookup {
                let emotes = lookup(platform, channel_id);
                for emote in &emotes {
                    let mut start = 0;
                    while let Some(pos) = text[start..].find(emote.as_str()) {
                        let s = start + pos;
                        let e = s + emote.len();
                        if !spans.iter().any(|(os, oe, _)| overlaps(*os, *oe, s, e)) {
                            spans.push((s, e, TokenKind::Emote));
                        }
                        start = e;
                        if start >= text.len() {
                            break;
                        }
                    }
                }
            }
        }

        if config.ai_decision_mode != waddle_core::AiDecisionMode::Never {
            for m in identifier_like_re().find_iter(text) {
                if !spans.iter().any(|(s, e, _)| overlaps(*s, *e, m.start(), m.end())) {
                    spans.push((m.start(), m.end(), TokenKind::AiUncertain));
                }
            }
        }

        spans.sort_by_key(|(s, _, _)| *s);

        let mut processed = String::with_capacity(text.len());
        let mut tokens = Vec::with_capacity(spans.len());
        let mut cursor = 0usize;
        let mut ordinal = 0usize;

        for (start, end, kind) in spans {
            if start < cursor {
                continue; // overlapping span from a lower-priority pass
            }
            processed.push_str(&text[cursor..start]);
            let placeholder = format!(" TOK{ordinal} ");
            processed.push_str(&placeholder);
            tokens.push(Token {
                ordinal,
                placeholder,
                original: text[start..end].to_string(),
                kind,
            });
            ordinal += 1;
            cursor = end;
        }
        processed.push_str(&text[cursor..]);

        PreprocessResult {
            processed_text: processed,
            tokens,
        }
    }

    /// Restore preserved tokens into translated output, in ordinal order.
    pub fn postprocess(&self, translated_text: &str, tokens: &[Token]) -> String {
        let mut out = translated_text.to_string();
        for token in tokens {
            out = out.replacen(token.placeholder.trim(), &token.original, 1);
            if out.contains(&token.placeholder) {
                out = out.replacen(&token.placeholder, &token.original, 1);
            }
        }
        out
    }
}

impl<'a> Default for TranslationPreprocessor<'a> {
    fn default() -> Self {
        Self::new()
    }
}

fn overlaps(a_start: usize, a_end: usize, b_start: usize, b_end: usize) -> bool {
    a_start < b_end && b_start < a_end
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn masks_mentions_commands_urls_and_emails_in_priority_order() {
        let pre = TranslationPreprocessor::new();
        let cfg = PreprocessConfig::default();
        let text = "@user hola mundo !help visit https://example.com or mail me@example.com";
        let result = pre.preprocess(text, "twitch", None, &cfg);
        assert_eq!(result.tokens.len(), 4);
        assert!(!result.processed_text.contains('@'));
        assert!(!result.processed_text.contains("https://"));
    }

    #[test]
    fn round_trips_through_postprocess() {
        let pre = TranslationPreprocessor::new();
        let cfg = PreprocessConfig::default();
        let text = "@user hola !help";
        let result = pre.preprocess(text, "twitch", None, &cfg);
        // Simulate a provider translating the placeholders verbatim.
        let restored = pre.postprocess(&result.processed_text, &result.tokens);
        assert!(restored.contains("@user"));
        assert!(restored.contains("!help"));
    }

    #[test]
    fn disabled_preprocessing_is_a_no_op() {
        let pre = TranslationPreprocessor::new();
        let mut cfg = PreprocessConfig::default();
        cfg.enabled = false;
        let text = "@user hola mundo";
        let result = pre.preprocess(text, "twitch", None, &cfg);
        assert_eq!(result.processed_text, text);
        assert!(result.tokens.is_empty());
    }

    #[test]
    fn emote_lookup_masks_platform_emotes() {
        let lookup = |_platform: &str, _channel: Option<&str>| vec!["PogChamp".to_string()];
        let pre = TranslationPreprocessor::new().with_emote_lookup(&lookup);
        let cfg = PreprocessConfig::default();
        let result = pre.preprocess("nice play PogChamp indeed", "twitch", None, &cfg);
        assert_eq!(result.tokens.len(), 1);
        assert_eq!(result.tokens[0].kind, TokenKind::Emote);
    }

    #[test]
    fn ai_uncertain_candidates_detected_when_not_never() {
        let pre = TranslationPreprocessor::new();
        let cfg = PreprocessConfig::default();
        let result = pre.preprocess("check build42abc now", "twitch", None, &cfg);
        assert!(result.tokens.iter().any(|t| t.kind == TokenKind::AiUncertain));
    }
}
