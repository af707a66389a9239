//! Full call path: skip checks → preprocess → detect →
//! cache lookup → on miss, translate through the provider fallback chain →
//! postprocess → write-through every cache tier → return.

use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tracing::{debug, instrument, warn};

use waddle_cache::{hash_key, TriTierCache};

use crate::detector::EnsembleLanguageDetector;
use crate::error::Result;
use crate::preprocessor::TranslationPreprocessor;
use crate::provider::TranslationProvider;
use crate::types::{PreprocessConfig, ProviderKind, TranslationCacheStats, TranslationOutcome, FALLBACK_ORDER};

/// Tunables that are not community-scoped — the process-wide skip/threshold
/// knobs (`TRANSLATION_MIN_WORDS`, `TRANSLATION_CONFIDENCE_THRESHOLD`).
#[derive(Debug, Clone)]
pub struct TranslationCoreConfig {
    pub min_words: usize,
    pub confidence_threshold: f64,
}

impl Default for TranslationCoreConfig {
    fn default() -> Self {
        Self {
            min_words: 5,
            confidence_threshold: 0.70,
        }
    }
}

/// The row persisted in the durable cache tier, mirroring the Translation
/// Cache Entry shape (minus the `access_count`/`last_accessed` bookkeeping,
/// which `TriTierCache` already owns per-key).
#[derive(Debug, Clone, Serialize, Deserialize)]
struct CachedTranslation {
    translated_text: String,
    source_lang: String,
    target_lang: String,
    provider: String,
    confidence: f64,
}

/// Orchestrates detection, the provider fallback chain, and the three cache
/// tiers behind one `translate` call. Community-scoped skip conditions
/// (`translation_enabled`, `target_lang`) are passed in per call rather than
/// held here, since they vary per community and this struct is shared.
pub struct TranslationCore {
    cache: Arc<TriTierCache>,
    detector: EnsembleLanguageDetector,
    preprocessor: TranslationPreprocessor<'static>,
    providers: Vec<Arc<dyn TranslationProvider>>,
    config: TranslationCoreConfig,
}

impl TranslationCore {
    pub fn new(
        cache: Arc<TriTierCache>,
        providers: Vec<Arc<dyn TranslationProvider>>,
        config: TranslationCoreConfig,
    ) -> Self {
        Self {
            cache,
            detector: EnsembleLanguageDetector::new(),
            preprocessor: TranslationPreprocessor::new(),
            providers,
            config,
        }
    }

    fn provider_for(&self, kind: ProviderKind) -> Option<&Arc<dyn TranslationProvider>> {
        self.providers.iter().find(|p| p.kind() == kind)
    }

    /// `translate(text)` is a no-op (`Ok(None)`) when disabled or
    /// `word_count(text) < min_words`.
    #[instrument(skip(self, text), fields(target_lang))]
    pub async fn translate(
        &self,
        text: &str,
        target_lang: &str,
        translation_enabled: bool,
        platform: &str,
        channel_id: Option<&str>,
    ) -> Result<Option<TranslationOutcome>> {
        if !translation_enabled || text.trim().is_empty() {
            return Ok(None);
        }
        let word_count = text.split_whitespace().count();
        if word_count < self.config.min_words {
            debug!(word_count, min_words = self.config.min_words, "translation skipped: below min_words");
            return Ok(None);
        }

        let preprocess_cfg = PreprocessConfig::default();
        let pre = self
            .preprocessor
            .preprocess(text, platform, channel_id, &preprocess_cfg);

        let Some(detected) = self.detect_with_tiers(&pre.processed_text).await else {
            return Ok(None);
        };

        if detected.confidence < self.config.confidence_threshold {
            debug!(confidence = detected.confidence, "translation skipped: below confidence_threshold");
            return Ok(None);
        }

        if detected.lang == target_lang {
            debug!(lang = %detected.lang, "translation skipped: already in target language");
            return Ok(None);
        }

        let cache_key = hash_key(&[&detected.lang, target_lang, text]);

        if let Some(cached) = self.cache.get::<CachedTranslation>(&cache_key)? {
            let translated_text = self.preprocessor.postprocess(&cached.translated_text, &pre.tokens);
            return Ok(Some(TranslationOutcome {
                translated_text,
                detected_lang: cached.source_lang,
                target_lang: cached.target_lang,
                confidence: cached.confidence,
                provider: cached.provider,
                cached: true,
                tokens_preserved: pre.tokens.len(),
                original_text: text.to_string(),
            }));
        }

        let Some(translation) = self
            .translate_via_fallback_chain(&pre.processed_text, &detected.lang, target_lang)
            .await
        else {
            warn!("all providers in the fallback chain failed; passing original text through");
            return Ok(None);
        };

        let translated_text = self.preprocessor.postprocess(&translation.translated_text, &pre.tokens);

        self.cache.put(
            &cache_key,
            &CachedTranslation {
                translated_text: translation.translated_text.clone(),
                source_lang: translation.detected_lang.clone(),
                target_lang: translation.target_lang.clone(),
                provider: translation.provider.to_string(),
                confidence: translation.confidence,
            },
        )?;

        Ok(Some(TranslationOutcome {
            translated_text,
            detected_lang: translation.detected_lang,
            target_lang: translation.target_lang,
            confidence: translation.confidence,
            provider: translation.provider.to_string(),
            cached: false,
            tokens_preserved: pre.tokens.len(),
            original_text: text.to_string(),
        }))
    }

    /// Ensemble detection with tiered-confidence AI verification:
    /// `>=0.90` accepted outright; `0.70-0.90` gets a second opinion from an
    /// AI-backed provider; `<0.70` is returned unmodified for the caller's
    /// threshold check to reject. Falls back to asking the
    /// providers directly when the ensemble produces nothing.
    async fn detect_with_tiers(&self, text: &str) -> Option<crate::types::DetectedLanguage> {
        let Some(ensemble) = self.detector.detect_language(text) else {
            for provider in &self.providers {
                if !provider.health_check().await {
                    continue;
                }
                if let Ok((lang, confidence)) = provider.detect_language(text).await {
                    return Some(crate::types::DetectedLanguage::new(lang, confidence));
                }
            }
            return None;
        };

        if ensemble.confidence >= 0.90 {
            return Some(ensemble);
        }

        if ensemble.confidence >= 0.70 {
            if let Some(ai) = self.provider_for(ProviderKind::AiBacked) {
                if ai.health_check().await {
                    if let Ok((ai_lang, ai_confidence)) = ai.detect_language(text).await {
                        if ai_lang == ensemble.lang {
                            return Some(crate::types::DetectedLanguage::new(ensemble.lang, 0.95));
                        }
                        if ai_confidence > ensemble.confidence {
                            return Some(crate::types::DetectedLanguage::new(ai_lang, ai_confidence));
                        }
                        return Some(crate::types::DetectedLanguage::new(
                            ensemble.lang,
                            ensemble.confidence * 0.9,
                        ));
                    }
                }
            }
            return Some(ensemble);
        }

        Some(ensemble)
    }

    /// Try each provider in `FALLBACK_ORDER`, health-checking before use;
    /// the first provider that both passes its health check and returns a
    /// successful translation wins.
    async fn translate_via_fallback_chain(
        &self,
        text: &str,
        source_lang: &str,
        target_lang: &str,
    ) -> Option<crate::types::ProviderTranslation> {
        for kind in FALLBACK_ORDER {
            let Some(provider) = self.provider_for(kind) else {
                continue;
            };
            if !provider.health_check().await {
                debug!(provider = %kind, "provider failed health check, skipping");
                continue;
            }
            match provider.translate(text, source_lang, target_lang).await {
                Ok(result) => return Some(result),
                Err(e) => {
                    warn!(provider = %kind, error = %e, "provider translate failed, trying next");
                    continue;
                }
            }
        }
        None
    }

    /// Read-only cache visibility, a supplemental operation alongside the
    /// main translate path.
    pub fn cache_stats(&self) -> Result<TranslationCacheStats> {
        Ok(self.cache.stats()?.into())
    }

    /// GC pass: entries with `access_count < min_access_count` whose
    /// `last_accessed` is older than `older_than_days` are removed
    /// (the default threshold is `access_count<5` / `30d`).
    pub fn gc_cache(&self, min_access_count: u64, older_than_days: i64) -> Result<usize> {
        Ok(self.cache.gc(min_access_count, older_than_days)?)
    }
}
