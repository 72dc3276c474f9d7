//! Completion provider with retry and rate-limit discipline
//!
//! Wraps a pluggable LLM backend with:
//! - Exponential-backoff retry for transient (5xx / network) failures
//! - A process-wide FIFO rate-limit queue: a 429 parks every caller until
//!   the provider's reset time, then the backlog drains serially
//! - Caller-supplied deadlines that abort in-flight requests
//! - Structured output: JSON cleanup, schema validation, deserialization
//! - Function calling with tool-call extraction

pub mod backend;
pub mod clean;
pub mod http;
pub mod provider;
pub mod queue;

pub use backend::{
    BackendRequest, CompletionBackend, CompletionParams, FunctionSpec, RawCompletion, ToolCall,
};
pub use clean::clean_structured_response;
pub use http::{HttpBackend, HttpBackendConfig};
pub use provider::{CompletionProvider, FunctionCallResult, RetryConfig};
pub use queue::RateLimitGate;

use std::time::Duration;
use thiserror::Error;

/// LLM errors
#[derive(Error, Debug, Clone)]
pub enum LlmError {
    #[error("rate limited, retry after {retry_after:?}")]
    RateLimited { retry_after: Duration },

    /// 5xx-class failure; retryable
    #[error("server error from {provider}: {message}")]
    Server { provider: String, message: String },

    /// 4xx-class failure; not retryable
    #[error("api error from {provider}: {message}")]
    Api { provider: String, message: String },

    #[error("network error: {0}")]
    Network(String),

    #[error("invalid response: {message}")]
    InvalidResponse {
        message: String,
        raw_response: Option<String>,
    },

    #[error("configuration error: {0}")]
    Configuration(String),

    #[error("cancelled")]
    Cancelled,
}

impl LlmError {
    pub fn is_retryable(&self) -> bool {
        matches!(self, LlmError::Server { .. } | LlmError::Network(_))
    }

    pub fn invalid_response(message: impl Into<String>, raw: impl Into<String>) -> Self {
        LlmError::InvalidResponse {
            message: message.into(),
            raw_response: Some(raw.into()),
        }
    }
}

impl From<reqwest::Error> for LlmError {
    fn from(err: reqwest::Error) -> Self {
        LlmError::Network(err.to_string())
    }
}

impl From<LlmError> for mnemon_core::Error {
    fn from(err: LlmError) -> Self {
        match err {
            LlmError::RateLimited { retry_after } => mnemon_core::Error::RateLimit {
                retry_after_ms: retry_after.as_millis() as u64,
            },
            LlmError::Server { provider, message } | LlmError::Api { provider, message } => {
                mnemon_core::Error::Llm { provider, message }
            }
            LlmError::Network(message) => mnemon_core::Error::Llm {
                provider: "http".to_string(),
                message,
            },
            LlmError::InvalidResponse {
                message,
                raw_response,
            } => mnemon_core::Error::Parse {
                message,
                raw_response,
            },
            LlmError::Configuration(message) => mnemon_core::Error::Config(message),
            LlmError::Cancelled => mnemon_core::Error::Cancelled,
        }
    }
}
