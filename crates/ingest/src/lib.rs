//! Chat-capture ingestion
//!
//! Normalizes provider-specific chat exports into the canonical conversation
//! schema:
//! - Parser registry with auto-detection over registered providers
//! - Built-in OpenAI (message tree) and Anthropic (flat) export parsers
//! - Structural validation with full error collection
//! - Incremental conversation assembly for streaming capture
//! - Payload entry point enforcing size/count limits with strict and
//!   skip-invalid modes

pub mod anthropic;
pub mod import;
pub mod openai;
pub mod parser;
pub mod streaming;
pub mod validator;

pub use anthropic::AnthropicParser;
pub use import::{import_json, ImportLimits, ImportOptions, ImportReport, InvalidConversation};
pub use openai::OpenAiParser;
pub use parser::{ChatParser, ParserRegistry};
pub use streaming::{BuilderState, StreamingBuilder};
pub use validator::{BatchValidation, ConversationValidator, ValidationError, ValidationReport};

use thiserror::Error;

/// Ingest errors
#[derive(Error, Debug, Clone)]
pub enum IngestError {
    #[error("provider not found: {0}")]
    ProviderNotFound(String),

    #[error("no registered parser recognizes the input payload")]
    DetectionFailed,

    #[error("parse error ({provider}): {message}")]
    Parse { provider: String, message: String },

    #[error("file too large: {size} bytes (limit {limit})")]
    FileTooLarge { size: usize, limit: usize },

    #[error("too many conversations: {count} (limit {limit})")]
    TooManyConversations { count: usize, limit: usize },

    #[error("validation failed: {0}")]
    Validation(String),

    #[error("builder is finalized; no further mutation is allowed")]
    BuilderFinalized,
}

impl From<IngestError> for mnemon_core::Error {
    fn from(err: IngestError) -> Self {
        match err {
            IngestError::ProviderNotFound(p) => mnemon_core::Error::ProviderNotFound(p),
            IngestError::DetectionFailed => mnemon_core::Error::DetectionFailed,
            IngestError::Parse { provider, message } => mnemon_core::Error::Parse {
                message: format!("{provider}: {message}"),
                raw_response: None,
            },
            IngestError::FileTooLarge { size, limit } => {
                mnemon_core::Error::FileTooLarge { size, limit }
            }
            IngestError::TooManyConversations { count, limit } => {
                mnemon_core::Error::TooManyConversations { count, limit }
            }
            IngestError::Validation(msg) => mnemon_core::Error::Validation(msg),
            IngestError::BuilderFinalized => {
                mnemon_core::Error::Validation("builder is finalized".to_string())
            }
        }
    }
}
