use thiserror::Error;

#[derive(Debug, Error)]
pub enum StreamError {
    #[error("database error: {0}")]
    Database(#[from] rusqlite::Error),

    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("stream pipeline is disabled")]
    Disabled,

    #[error("stream '{0}' not found")]
    NotFound(String),
}

impl StreamError {
    pub fn code(&self) -> &'static str {
        match self {
            StreamError::Database(_) => "database_error",
            StreamError::Serialization(_) => "serialization_error",
            StreamError::Disabled => "dependency_unavailable",
            StreamError::NotFound(_) => "not_found",
        }
    }
}

pub type Result<T> = std::result::Result<T, StreamError>;
