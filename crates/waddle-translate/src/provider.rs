use async_trait::async_trait;
use serde::Deserialize;
use tracing::{debug, warn};

use crate::error::{Result, TranslationError};
use crate::types::{ProviderKind, ProviderTranslation};

/// One translation backend. Every variant in the fallback chain implements
/// the same four operations; `health_check` is cheap and
/// must be tried before `translate`/`detect_language`.
#[async_trait]
pub trait TranslationProvider: Send + Sync {
    fn kind(&self) -> ProviderKind;
    async fn health_check(&self) -> bool;
    async fn detect_language(&self, text: &str) -> Result<(String, f64)>;
    async fn translate(&self, text: &str, source_lang: &str, target_lang: &str) -> Result<ProviderTranslation>;
    async fn available_languages(&self) -> Result<Vec<String>>;
}

/// A commercial cloud translation API gated behind an API key — the first
/// link in the fallback chain. Only usable when configured; callers skip
/// it via `health_check` returning `false` when no key is set.
pub struct CommercialProvider {
    client: reqwest::Client,
    base_url: String,
    api_key: Option<String>,
}

impl CommercialProvider {
    pub fn new(base_url: impl Into<String>, api_key: Option<String>) -> Self {
        Self {
            client: reqwest::Client::new(),
            base_url: base_url.into(),
            api_key,
        }
    }
}

#[async_trait]
impl TranslationProvider for CommercialProvider {
    fn kind(&self) -> ProviderKind {
        ProviderKind::Commercial
    }

    async fn health_check(&self) -> bool {
        if self.api_key.is_none() {
            return false;
        }
        self.client
            .get(format!("{}/health", self.base_url))
            .send()
            .await
            .map(|r| r.status().is_success())
            .unwrap_or(false)
    }

    async fn detect_language(&self, text: &str) -> Result<(String, f64)> {
        let resp: DetectResponse = self
            .request(&format!("{}/v2/detect", self.base_url), &serde_json::json!({ "q": text }))
            .await?;
        Ok((resp.language, resp.confidence))
    }

    async fn translate(&self, text: &str, source_lang: &str, target_lang: &str) -> Result<ProviderTranslation> {
        let resp: TranslateResponse = self
            .request(
                &format!("{}/v2/translate", self.base_url),
                &serde_json::json!({ "q": text, "source": source_lang, "target": target_lang }),
            )
            .await?;
        Ok(ProviderTranslation {
            translated_text: resp.translated_text,
            detected_lang: source_lang.to_string(),
            target_lang: target_lang.to_string(),
            confidence: 0.99,
            provider: ProviderKind::Commercial,
        })
    }

    async fn available_languages(&self) -> Result<Vec<String>> {
        let resp: LanguagesResponse = self
            .request(&format!("{}/v2/languages", self.base_url), &serde_json::json!({}))
            .await?;
        Ok(resp.languages)
    }
}

impl CommercialProvider {
    async fn request<T: for<'de> Deserialize<'de>>(&self, url: &str, body: &serde_json::Value) -> Result<T> {
        let key = self.api_key.as_deref().ok_or_else(|| TranslationError::ProviderUnavailable {
            provider: "commercial".to_string(),
            reason: "no api key configured".to_string(),
        })?;

        let resp = self
            .client
            .post(url)
            .bearer_auth(key)
            .json(body)
            .send()
            .await
            .map_err(|e| TranslationError::ProviderRequest {
                provider: "commercial".to_string(),
                reason: e.to_string(),
            })?;

        if !resp.status().is_success() {
            let status = resp.status();
            let text = resp.text().await.unwrap_or_default();
            warn!(%status, body = %text, "commercial provider error");
            return Err(TranslationError::ProviderRequest {
                provider: "commercial".to_string(),
                reason: format!("status {status}"),
            });
        }

        resp.json().await.map_err(|e| TranslationError::ProviderRequest {
            provider: "commercial".to_string(),
            reason: e.to_string(),
        })
    }
}

#[derive(Deserialize)]
struct DetectResponse {
    language: String,
    confidence: f64,
}

#[derive(Deserialize)]
struct TranslateResponse {
    translated_text: String,
}

#[derive(Deserialize)]
struct LanguagesResponse {
    languages: Vec<String>,
}

/// Free, always-available translator. No API key, hits a public
/// translation endpoint.
pub struct LightweightProvider {
    client: reqwest::Client,
    base_url: String,
}

impl LightweightProvider {
    pub fn new(base_url: impl Into<String>) -> Self {
        Self {
            client: reqwest::Client::new(),
            base_url: base_url.into(),
        }
    }
}

#[async_trait]
impl TranslationProvider for LightweightProvider {
    fn kind(&self) -> ProviderKind {
        ProviderKind::Lightweight
    }

    async fn health_check(&self) -> bool {
        self.client
            .get(&self.base_url)
            .send()
            .await
            .map(|r| r.status().is_success())
            .unwrap_or(false)
    }

    async fn detect_language(&self, text: &str) -> Result<(String, f64)> {
        let resp: LightweightTranslateResponse = self.call(text, "auto", "en").await?;
        Ok((resp.detected_lang, 0.8))
    }

    async fn translate(&self, text: &str, source_lang: &str, target_lang: &str) -> Result<ProviderTranslation> {
        let resp: LightweightTranslateResponse = self.call(text, source_lang, target_lang).await?;
        Ok(ProviderTranslation {
            translated_text: resp.translated_text,
            detected_lang: resp.detected_lang,
            target_lang: target_lang.to_string(),
            confidence: 0.8,
            provider: ProviderKind::Lightweight,
        })
    }

    async fn available_languages(&self) -> Result<Vec<String>> {
        Ok(vec![
            "en", "es", "fr", "de", "pt", "ru", "ja", "ko", "ar", "zh",
        ]
        .into_iter()
        .map(str::to_string)
        .collect())
    }
}

impl LightweightProvider {
    async fn call(&self, text: &str, source_lang: &str, target_lang: &str) -> Result<LightweightTranslateResponse> {
        let resp = self
            .client
            .get(format!("{}/translate", self.base_url))
            .query(&[("q", text), ("sl", source_lang), ("tl", target_lang)])
            .send()
            .await
            .map_err(|e| TranslationError::ProviderRequest {
                provider: "lightweight".to_string(),
                reason: e.to_string(),
            })?;

        if !resp.status().is_success() {
            return Err(TranslationError::ProviderRequest {
                provider: "lightweight".to_string(),
                reason: format!("status {}", resp.status()),
            });
        }

        resp.json().await.map_err(|e| TranslationError::ProviderRequest {
            provider: "lightweight".to_string(),
            reason: e.to_string(),
        })
    }
}

#[derive(Deserialize)]
struct LightweightTranslateResponse {
    translated_text: String,
    detected_lang: String,
}

/// AI-backed fallback — last resort when both the commercial and
/// lightweight providers fail or are unavailable. Modeled after a typical
/// Ollama-style chat-completion client.
pub struct AiBackedProvider {
    client: reqwest::Client,
    base_url: String,
    model: String,
}

impl AiBackedProvider {
    pub fn new(base_url: impl Into<String>, model: impl Into<String>) -> Self {
        Self {
            client: reqwest::Client::new(),
            base_url: base_url.into(),
            model: model.into(),
        }
    }
}

#[async_trait]
impl TranslationProvider for AiBackedProvider {
    fn kind(&self) -> ProviderKind {
        ProviderKind::AiBacked
    }

    async fn health_check(&self) -> bool {
        self.client
            .get(format!("{}/health", self.base_url))
            .send()
            .await
            .map(|r| r.status().is_success())
            .unwrap_or(false)
    }

    async fn detect_language(&self, text: &str) -> Result<(String, f64)> {
        let prompt = format!("Identify the ISO 639-1 language code of this text, reply with only the code: {text}");
        let resp = self.complete(&prompt).await?;
        let lang = resp.trim().to_lowercase();
        debug!(lang, "ai-backed language detection");
        Ok((lang, 0.75))
    }

    async fn translate(&self, text: &str, source_lang: &str, target_lang: &str) -> Result<ProviderTranslation> {
        let prompt = format!("Translate the following {source_lang} text to {target_lang}. Reply with only the translation: {text}");
        let translated_text = self.complete(&prompt).await?;
        Ok(ProviderTranslation {
            translated_text,
            detected_lang: source_lang.to_string(),
            target_lang: target_lang.to_string(),
            confidence: 0.75,
            provider: ProviderKind::AiBacked,
        })
    }

    async fn available_languages(&self) -> Result<Vec<String>> {
        Err(TranslationError::ProviderUnavailable {
            provider: "ai_backed".to_string(),
            reason: "language list not enumerable for a generative backend".to_string(),
        })
    }
}

impl AiBackedProvider {
    async fn complete(&self, prompt: &str) -> Result<String> {
        let body = serde_json::json!({
            "model": self.model,
            "messages": [{ "role": "user", "content": prompt }],
            "stream": false,
        });

        let resp = self
            .client
            .post(format!("{}/api/chat", self.base_url))
            .json(&body)
            .send()
            .await
            .map_err(|e| TranslationError::ProviderRequest {
                provider: "ai_backed".to_string(),
                reason: e.to_string(),
            })?;

        if !resp.status().is_success() {
            return Err(TranslationError::ProviderRequest {
                provider: "ai_backed".to_string(),
                reason: format!("status {}", resp.status()),
            });
        }

        let parsed: AiChatResponse = resp.json().await.map_err(|e| TranslationError::ProviderRequest {
            provider: "ai_backed".to_string(),
            reason: e.to_string(),
        })?;
        Ok(parsed.message.content)
    }
}

#[derive(Deserialize)]
struct AiChatResponse {
    message: AiChatMessage,
}

#[derive(Deserialize)]
struct AiChatMessage {
    content: String,
}

#[cfg(test)]
mod tests {
    use super::*;
    use wiremock::matchers::{method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    #[tokio::test]
    async fn commercial_provider_without_api_key_fails_health_check() {
        let provider = CommercialProvider::new("http://localhost:1", None);
        assert!(!provider.health_check().await);
    }

    #[tokio::test]
    async fn lightweight_provider_translates_via_mock_server() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/translate"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "translated_text": "hello world",
                "detected_lang": "es"
            })))
            .mount(&server)
            .await;

        let provider = LightweightProvider::new(server.uri());
        let result = provider.translate("hola mundo", "es", "en").await.unwrap();
        assert_eq!(result.translated_text, "hello world");
        assert_eq!(result.provider, ProviderKind::Lightweight);
    }

    #[tokio::test]
    async fn lightweight_provider_surfaces_non_success_status_as_request_error() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/translate"))
            .respond_with(ResponseTemplate::new(500))
            .mount(&server)
            .await;

        let provider = LightweightProvider::new(server.uri());
        let result = provider.translate("hola", "es", "en").await;
        assert!(result.is_err());
    }

    #[tokio::test]
    async fn ai_backed_provider_completes_chat_style_request() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/api/chat"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "message": { "content": "es" }
            })))
            .mount(&server)
            .await;

        let provider = AiBackedProvider::new(server.uri(), "tinyllama");
        let (lang, _) = provider.detect_language("hola mundo").await.unwrap();
        assert_eq!(lang, "es");
    }
}
