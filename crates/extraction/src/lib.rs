//! Chunked memory extraction
//!
//! Turns conversation chunks into typed memories and relationships via
//! structured LLM output, then collapses near-duplicates across chunks:
//! - Prompt and JSON-schema construction per configured memory type
//! - Custom memory-type registration with validation
//! - Per-chunk extraction with previous-chunk context threading
//! - Cross-chunk deduplication and relationship endpoint rewriting
//!
//! A failed chunk never fails the conversation; its status is recorded and
//! deduplication consumes only successful chunks.

pub mod dedup;
pub mod prompt;
pub mod registry;
pub mod schema;
pub mod strategy;
pub mod types;

pub use dedup::{ChunkDeduplicator, DeduplicationResult, DeduplicatorConfig, MergeRecord};
pub use prompt::build_extraction_prompt;
pub use registry::{CustomMemoryType, MemoryTypeRegistry};
pub use schema::build_output_schema;
pub use strategy::ExtractionStrategy;
pub use types::{ChunkExtractionResult, ChunkStatus, ExtractionConfig, PreviousChunkContext};

use thiserror::Error;

#[derive(Error, Debug)]
pub enum ExtractionError {
    #[error(transparent)]
    Llm(#[from] mnemon_llm::LlmError),

    #[error("invalid memory type registration: {0}")]
    InvalidTypeRegistration(String),
}

impl From<ExtractionError> for mnemon_core::Error {
    fn from(err: ExtractionError) -> Self {
        match err {
            ExtractionError::Llm(e) => e.into(),
            ExtractionError::InvalidTypeRegistration(msg) => mnemon_core::Error::Validation(msg),
        }
    }
}
