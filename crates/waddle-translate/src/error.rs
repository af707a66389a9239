use thiserror::Error;

#[derive(Debug, Error)]
pub enum TranslationError {
    #[error("cache error: {0}")]
    Cache(#[from] waddle_cache::CacheError),

    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("provider '{provider}' unavailable: {reason}")]
    ProviderUnavailable { provider: String, reason: String },

    #[error("provider '{provider}' request failed: {reason}")]
    ProviderRequest { provider: String, reason: String },

    #[error("all providers in the fallback chain failed")]
    AllProvidersFailed,
}

pub type Result<T> = std::result::Result<T, TranslationError>;
