use thiserror::Error;

#[derive(Debug, Error)]
pub enum AnalyticsError {
    #[error("database error: {0}")]
    Database(#[from] rusqlite::Error),

    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("no score recorded for user '{0}' in community {1}")]
    NotFound(String, i64),
}

pub type Result<T> = std::result::Result<T, AnalyticsError>;
