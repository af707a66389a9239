use std::collections::HashMap;

use crate::types::DetectedLanguage;

/// Combines at least three independent signals into one `(lang, confidence)`
/// verdict: a statistical trigram model (`whatlang`, the
/// same crate family this workspace reaches for wherever a lightweight
/// language id is needed — no fastText/Lingua binding exists in the
/// reference corpus), a small stopword dictionary per language, and a
/// Unicode-script heuristic that resolves non-Latin scripts outright.
pub struct EnsembleLanguageDetector {
    stopwords: HashMap<&'static str, &'static [&'static str]>,
}

impl EnsembleLanguageDetector {
    pub fn new() -> Self {
        let mut stopwords = HashMap::new();
        stopwords.insert("en", &["the", "and", "is", "you", "of", "to", "a"][..]);
        stopwords.insert("es", &["el", "la", "de", "que", "y", "en", "los"][..]);
        stopwords.insert("fr", &["le", "la", "de", "et", "les", "des", "un"][..]);
        stopwords.insert("de", &["der", "die", "und", "das", "ist", "den", "ein"][..]);
        stopwords.insert("pt", &["o", "a", "de", "que", "e", "do", "da"][..]);
        Self { stopwords }
    }

    /// Ensemble detection: combine the three signals and resolve their
    /// agreement into a tiered confidence. `None` means no signal produced
    /// a usable answer (empty or all-symbol text).
    pub fn detect_language(&self, text: &str) -> Option<DetectedLanguage> {
        if text.trim().is_empty() {
            return None;
        }

        if let Some(script_lang) = script_heuristic(text) {
            return Some(DetectedLanguage::new(script_lang, 0.97));
        }

        let statistical = whatlang::detect(text).map(|info| {
            (whatlang_to_iso(info.lang()), info.confidence())
        });

        let dictionary = self.dictionary_vote(text);

        match (statistical, dictionary) {
            (Some((s_lang, s_conf)), Some((d_lang, d_score))) if s_lang == d_lang => {
                // Agreement between two independent signals: boost confidence.
                let combined = (s_conf + d_score) / 2.0 + 0.1;
                Some(DetectedLanguage::new(s_lang, combined.min(0.99)))
            }
            (Some((s_lang, s_conf)), Some((_, d_score))) => {
                // Disagreement — trust whichever signal is stronger, but cap
                // confidence since the signals diverged.
                if s_conf >= d_score {
                    Some(DetectedLanguage::new(s_lang, (s_conf * 0.85).min(0.89)))
                } else {
                    let (d_lang, _) = self.dictionary_vote(text).unwrap();
                    Some(DetectedLanguage::new(d_lang, (d_score * 0.85).min(0.89)))
                }
            }
            (Some((s_lang, s_conf)), None) => Some(DetectedLanguage::new(s_lang, s_conf)),
            (None, Some((d_lang, d_score))) => Some(DetectedLanguage::new(d_lang, d_score)),
            (None, None) => None,
        }
    }

    fn dictionary_vote(&self, text: &str) -> Option<(String, f64)> {
        let words: Vec<String> = text
            .to_lowercase()
            .split_whitespace()
            .map(|w| w.trim_matches(|c: char| !c.is_alphanumeric()).to_string())
            .filter(|w| !w.is_empty())
            .collect();
        if words.is_empty() {
            return None;
        }

        let mut best: Option<(&str, usize)> = None;
        for (lang, list) in &self.stopwords {
            let hits = words.iter().filter(|w| list.contains(&w.as_str())).count();
            if hits > 0 && best.map(|(_, b)| hits > b).unwrap_or(true) {
                best = Some((lang, hits));
            }
        }

        best.map(|(lang, hits)| {
            let score = (hits as f64 / words.len() as f64).min(1.0).max(0.35);
            (lang.to_string(), score)
        })
    }
}

impl Default for EnsembleLanguageDetector {
    fn default() -> Self {
        Self::new()
    }
}

/// Non-Latin scripts are unambiguous enough to resolve without statistics.
fn script_heuristic(text: &str) -> Option<&'static str> {
    let mut cyrillic = 0;
    let mut cjk = 0;
    let mut hangul = 0;
    let mut arabic = 0;
    let mut total_alpha = 0;

    for c in text.chars() {
        if !c.is_alphabetic() {
            continue;
        }
        total_alpha += 1;
        match c as u32 {
            0x0400..=0x04FF => cyrillic += 1,
            0x4E00..=0x9FFF | 0x3040..=0x30FF => cjk += 1,
            0xAC00..=0xD7A3 => hangul += 1,
            0x0600..=0x06FF => arabic += 1,
            _ => {}
        }
    }

    if total_alpha == 0 {
        return None;
    }
    let dominant = |count: usize| count * 2 > total_alpha;

    if dominant(cyrillic) {
        Some("ru")
    } else if dominant(hangul) {
        Some("ko")
    } else if dominant(cjk) {
        Some("ja")
    } else if dominant(arabic) {
        Some("ar")
    } else {
        None
    }
}

/// whatlang reports ISO 639-3 codes; normalise the handful our stopword
/// dictionary knows about down to ISO 639-1 so the two signals can agree.
fn whatlang_to_iso(lang: whatlang::Lang) -> String {
    match lang {
        whatlang::Lang::Eng => "en",
        whatlang::Lang::Spa => "es",
        whatlang::Lang::Fra => "fr",
        whatlang::Lang::Deu => "de",
        whatlang::Lang::Por => "pt",
        whatlang::Lang::Rus => "ru",
        whatlang::Lang::Jpn => "ja",
        whatlang::Lang::Kor => "ko",
        whatlang::Lang::Ara => "ar",
        other => return other.code().to_string(),
    }
    .to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn detects_cyrillic_via_script_heuristic() {
        let det = EnsembleLanguageDetector::new();
        let result = det.detect_language("Привет, как дела сегодня").unwrap();
        assert_eq!(result.lang, "ru");
        assert!(result.confidence >= 0.9);
    }

    #[test]
    fn detects_english_with_high_confidence() {
        let det = EnsembleLanguageDetector::new();
        let result = det
            .detect_language("The quick brown fox jumps over the lazy dog and runs away")
            .unwrap();
        assert_eq!(result.lang, "en");
    }

    #[test]
    fn empty_text_yields_no_detection() {
        let det = EnsembleLanguageDetector::new();
        assert!(det.detect_language("   ").is_none());
    }
}
