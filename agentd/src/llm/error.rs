//! LLM provider error taxonomy

use std::time::Duration;
use thiserror::Error;

/// Errors that can occur while talking to an LLM provider.
#[derive(Debug, Error)]
pub enum LlmError {
    #[error("rate limited, retry after {retry_after:?}")]
    RateLimited { retry_after: Duration },

    #[error("API error (status {status}): {message}")]
    ApiError { status: u16, message: String },

    #[error("network error: {0}")]
    Network(#[from] reqwest::Error),

    #[error("invalid response: {0}")]
    InvalidResponse(String),

    #[error("request timed out")]
    Timeout,

    #[error("json error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("request cancelled")]
    Cancelled,
}

impl LlmError {
    pub fn is_rate_limit(&self) -> bool {
        matches!(self, LlmError::RateLimited { .. })
    }

    /// Whether a retry is likely to help (transient network/server errors).
    pub fn is_retryable(&self) -> bool {
        match self {
            LlmError::RateLimited { .. } | LlmError::Network(_) | LlmError::Timeout => true,
            LlmError::ApiError { status, .. } => matches!(status, 408 | 429 | 500 | 502 | 503 | 504),
            LlmError::InvalidResponse(_) | LlmError::Json(_) | LlmError::Cancelled => false,
        }
    }

    pub fn retry_after(&self) -> Option<Duration> {
        match self {
            LlmError::RateLimited { retry_after } => Some(*retry_after),
            _ => None,
        }
    }
}
