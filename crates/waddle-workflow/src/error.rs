use thiserror::Error;

#[derive(Debug, Error)]
pub enum WorkflowError {
    #[error("template error: {0}")]
    Template(String),

    #[error("transport error calling '{url}': {reason}")]
    Transport { url: String, reason: String },

    #[error("request to '{url}' timed out after {attempts} attempt(s)")]
    Timeout { url: String, attempts: u32 },

    #[error("non-retryable http status {status} from '{url}'")]
    NonRetryableHttp { url: String, status: u16 },

    #[error("retries exhausted for '{url}' after {attempts} attempt(s), last status {status}")]
    RetryableHttpExhausted { url: String, attempts: u32, status: u16 },

    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("invalid cron expression: {0}")]
    Cron(String),

    #[error("database error: {0}")]
    Database(#[from] rusqlite::Error),
}

pub type Result<T> = std::result::Result<T, WorkflowError>;
