//! Error types shared across the workspace
//!
//! Crate-local error enums (ingest, llm, extraction, ...) convert into this
//! taxonomy at the seams. Policy lives with the error kind:
//! - validation / not-found / limit errors surface to the caller, never retried
//! - rate limits are recovered locally by the provider queue
//! - llm errors retry on 5xx up to the configured budget
//! - cancellation propagates untouched

use thiserror::Error;

/// Result alias used across the workspace
pub type Result<T> = std::result::Result<T, Error>;

#[derive(Error, Debug, Clone)]
pub enum Error {
    #[error("validation error: {0}")]
    Validation(String),

    #[error("provider not found: {0}")]
    ProviderNotFound(String),

    #[error("no registered parser recognizes the input payload")]
    DetectionFailed,

    #[error("file too large: {size} bytes (limit {limit})")]
    FileTooLarge { size: usize, limit: usize },

    #[error("too many conversations: {count} (limit {limit})")]
    TooManyConversations { count: usize, limit: usize },

    #[error("parse error: {message}")]
    Parse {
        message: String,
        /// Preview of the offending payload, for debugging
        raw_response: Option<String>,
    },

    #[error("rate limited, retry after {retry_after_ms} ms")]
    RateLimit { retry_after_ms: u64 },

    #[error("llm error from {provider}: {message}")]
    Llm { provider: String, message: String },

    #[error("storage error: {0}")]
    Storage(String),

    #[error("operation cancelled")]
    Cancelled,

    #[error("configuration error: {0}")]
    Config(String),
}

impl Error {
    pub fn parse(message: impl Into<String>) -> Self {
        Error::Parse {
            message: message.into(),
            raw_response: None,
        }
    }

    pub fn parse_with_raw(message: impl Into<String>, raw: impl Into<String>) -> Self {
        Error::Parse {
            message: message.into(),
            raw_response: Some(raw.into()),
        }
    }

    /// True for errors the provider layer may retry (transient 5xx-class)
    pub fn is_retryable(&self) -> bool {
        matches!(self, Error::Llm { .. } | Error::RateLimit { .. })
    }
}
