use thiserror::Error;

/// Errors surfaced at the router's HTTP boundary. Every variant maps to one
/// of the conventional status codes via
/// [`RouterError::status_code`]/[`RouterError::code`].
#[derive(Debug, Error)]
pub enum RouterError {
    #[error("validation error: {0}")]
    Validation(String),

    #[error("authentication required: {0}")]
    Unauthenticated(String),

    #[error("policy denied: {0}")]
    PolicyDenied(String),

    #[error("unknown entity for this (platform, server, channel)")]
    UnknownEntity,

    #[error("session not found: {0}")]
    SessionNotFound(String),

    #[error("conflict: {0}")]
    Conflict(String),

    #[error("database error: {0}")]
    Database(#[from] rusqlite::Error),

    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("internal error: {0}")]
    Internal(String),
}

impl RouterError {
    pub fn code(&self) -> &'static str {
        match self {
            RouterError::Validation(_) => "validation_error",
            RouterError::Unauthenticated(_) => "unauthenticated",
            RouterError::PolicyDenied(_) => "policy_denied",
            RouterError::UnknownEntity => "not_found",
            RouterError::SessionNotFound(_) => "not_found",
            RouterError::Conflict(_) => "conflict",
            RouterError::Database(_) => "database_error",
            RouterError::Serialization(_) => "serialization_error",
            RouterError::Internal(_) => "internal",
        }
    }

    pub fn status_code(&self) -> u16 {
        match self {
            RouterError::Validation(_) => 400,
            RouterError::Unauthenticated(_) => 401,
            RouterError::PolicyDenied(_) => 403,
            RouterError::UnknownEntity => 404,
            RouterError::SessionNotFound(_) => 404,
            RouterError::Conflict(_) => 409,
            RouterError::Database(_) => 500,
            RouterError::Serialization(_) => 500,
            RouterError::Internal(_) => 500,
        }
    }
}

impl From<waddle_sessions::SessionError> for RouterError {
    fn from(e: waddle_sessions::SessionError) -> Self {
        RouterError::Internal(e.to_string())
    }
}

impl From<waddle_users::PolicyError> for RouterError {
    fn from(e: waddle_users::PolicyError) -> Self {
        RouterError::Internal(e.to_string())
    }
}

impl From<waddle_stream::StreamError> for RouterError {
    fn from(e: waddle_stream::StreamError) -> Self {
        RouterError::Internal(e.to_string())
    }
}

impl From<waddle_workflow::WorkflowError> for RouterError {
    fn from(e: waddle_workflow::WorkflowError) -> Self {
        RouterError::Internal(e.to_string())
    }
}

pub type Result<T> = std::result::Result<T, RouterError>;
