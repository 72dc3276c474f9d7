//! Core types and traits for the memory layer
//!
//! This crate provides foundational types used across all other crates:
//! - Canonical conversation and message types
//! - Conversation chunk types
//! - Extracted memory and relationship types
//! - Command request/response types
//! - Error types
//! - Traits for pluggable collaborators (storage, embeddings)

pub mod chunk;
pub mod command;
pub mod conversation;
pub mod error;
pub mod memory;
pub mod traits;

pub use chunk::{ChunkMetadata, ChunkOverlap, ConversationChunk};
pub use command::{Action, CommandRequest, CommandResponse, MemoryReference};
pub use conversation::{MessageRole, NormalizedConversation, NormalizedMessage};
pub use error::{Error, Result};
pub use memory::{
    ExtractedMemory, ExtractedRelationship, MemoryType, RelationshipType, ScoredMemory,
};
pub use traits::{EmbeddingProvider, SearchQuery, StorageClient};
