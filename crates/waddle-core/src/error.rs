use thiserror::Error;

/// Shared error-kind vocabulary. Component crates define their own
/// `thiserror` enums for finer-grained variants but expose a `.code()` that
/// maps onto one of these short codes at the HTTP boundary.
#[derive(Debug, Error)]
pub enum WaddleError {
    #[error("configuration error: {0}")]
    Config(String),

    #[error("validation error: {0}")]
    Validation(String),

    #[error("policy denied: {0}")]
    PolicyDenied(String),

    #[error("operation timed out after {ms}ms")]
    Timeout { ms: u64 },

    #[error("retryable transport error: {0}")]
    RetryableTransport(String),

    #[error("non-retryable transport error: {0}")]
    NonRetryableTransport(String),

    #[error("dependency unavailable: {0}")]
    DependencyUnavailable(String),

    #[error("conflict: {0}")]
    Conflict(String),

    #[error("database error: {0}")]
    Database(String),

    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("internal error: {0}")]
    Internal(String),
}

impl WaddleError {
    /// Short error code, matched to an HTTP status code at the boundary:
    /// `validation`→400, `policy_denied`→403, `conflict`→409, `internal`→500,
    /// `dependency_unavailable`→503, etc.
    pub fn code(&self) -> &'static str {
        match self {
            WaddleError::Config(_) => "config_error",
            WaddleError::Validation(_) => "validation_error",
            WaddleError::PolicyDenied(_) => "policy_denied",
            WaddleError::Timeout { .. } => "timeout",
            WaddleError::RetryableTransport(_) => "retryable_transport",
            WaddleError::NonRetryableTransport(_) => "non_retryable_transport",
            WaddleError::DependencyUnavailable(_) => "dependency_unavailable",
            WaddleError::Conflict(_) => "conflict",
            WaddleError::Database(_) => "database_error",
            WaddleError::Serialization(_) => "serialization_error",
            WaddleError::Internal(_) => "internal",
        }
    }

    /// Conventional HTTP status code for this error kind.
    pub fn status_code(&self) -> u16 {
        match self {
            WaddleError::Config(_) => 500,
            WaddleError::Validation(_) => 400,
            WaddleError::PolicyDenied(_) => 403,
            WaddleError::Timeout { .. } => 504,
            WaddleError::RetryableTransport(_) => 503,
            WaddleError::NonRetryableTransport(_) => 502,
            WaddleError::DependencyUnavailable(_) => 503,
            WaddleError::Conflict(_) => 409,
            WaddleError::Database(_) => 500,
            WaddleError::Serialization(_) => 500,
            WaddleError::Internal(_) => 500,
        }
    }
}

pub type Result<T> = std::result::Result<T, WaddleError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn status_codes_match_spec() {
        assert_eq!(WaddleError::Validation("x".into()).status_code(), 400);
        assert_eq!(WaddleError::PolicyDenied("x".into()).status_code(), 403);
        assert_eq!(WaddleError::Conflict("x".into()).status_code(), 409);
        assert_eq!(
            WaddleError::DependencyUnavailable("x".into()).status_code(),
            503
        );
    }
}
