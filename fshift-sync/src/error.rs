//! Errors surfaced by the request optimization layer.

use thiserror::Error;

/// Error from an entity API call.
///
/// `Clone` so that every caller sharing a deduplicated or batched request
/// observes the same outcome.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ApiError {
    /// Non-success HTTP-like status from the backend
    #[error("request failed with status {status}: {message}")]
    Http { status: u16, message: String },

    #[error("transport error: {0}")]
    Transport(String),

    #[error("could not decode response: {0}")]
    Decode(String),

    #[error("batch processor returned {got} results for {expected} items")]
    BatchMismatch { expected: usize, got: usize },

    /// The shared task running the request went away
    #[error("request aborted: {0}")]
    Aborted(String),

    #[error("invalid configuration: {0}")]
    InvalidConfig(String),
}

/// Retry classification of an error
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorClass {
    Retryable,
    Terminal,
}

impl ApiError {
    pub fn http(status: u16, message: impl Into<String>) -> Self {
        ApiError::Http {
            status,
            message: message.into(),
        }
    }

    pub fn status(&self) -> Option<u16> {
        match self {
            ApiError::Http { status, .. } => Some(*status),
            _ => None,
        }
    }

    /// 429 and 5xx are transient; everything else is terminal.
    pub fn class(&self) -> ErrorClass {
        match self.status() {
            Some(429) | Some(500..=599) => ErrorClass::Retryable,
            _ => ErrorClass::Terminal,
        }
    }

    pub fn is_retryable(&self) -> bool {
        self.class() == ErrorClass::Retryable
    }

    pub fn is_rate_limited(&self) -> bool {
        self.status() == Some(429)
    }
}

impl From<serde_json::Error> for ApiError {
    fn from(e: serde_json::Error) -> Self {
        ApiError::Decode(e.to_string())
    }
}

pub type Result<T> = std::result::Result<T, ApiError>;
