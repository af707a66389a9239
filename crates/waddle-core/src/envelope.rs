//! The HTTP boundary's error envelope: `{success:false, error:{message, code, details?, timestamp}}`.

use serde::Serialize;

use crate::error::WaddleError;

#[derive(Debug, Serialize)]
pub struct ErrorEnvelope {
    pub success: bool,
    pub error: ErrorBody,
}

#[derive(Debug, Serialize)]
pub struct ErrorBody {
    pub message: String,
    pub code: &'static str,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub details: Option<serde_json::Value>,
    pub timestamp: String,
}

impl ErrorEnvelope {
    pub fn from_error(err: &WaddleError) -> Self {
        Self {
            success: false,
            error: ErrorBody {
                message: err.to_string(),
                code: err.code(),
                details: None,
                timestamp: chrono::Utc::now().to_rfc3339(),
            },
        }
    }

    pub fn with_details(mut self, details: serde_json::Value) -> Self {
        self.error.details = Some(details);
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn envelope_carries_code_and_message() {
        let err = WaddleError::Conflict("alias already exists".into());
        let env = ErrorEnvelope::from_error(&err);
        assert!(!env.success);
        assert_eq!(env.error.code, "conflict");
        assert_eq!(env.error.message, "conflict: alias already exists");
    }
}
