//! Traits for pluggable collaborators
//!
//! The command processor, context builder, and extraction pipeline all take
//! these as constructor-supplied dependencies; a default assembly exists only
//! at the process boundary.

use async_trait::async_trait;

use crate::command::{CommandRequest, CommandResponse, MemoryReference};
use crate::error::Result;
use crate::memory::{ExtractedMemory, ExtractedRelationship, ScoredMemory};

/// Produces fixed-dimension embedding vectors
#[async_trait]
pub trait EmbeddingProvider: Send + Sync {
    async fn embed(&self, text: &str) -> Result<Vec<f32>>;

    /// Dimension of every vector this provider returns
    fn dimension(&self) -> usize;
}

/// A memory search request; vector and text modes may be combined
#[derive(Debug, Clone, Default)]
pub struct SearchQuery {
    pub vector: Option<Vec<f32>>,
    pub text: Option<String>,
    pub limit: usize,
}

impl SearchQuery {
    pub fn vector(vector: Vec<f32>, limit: usize) -> Self {
        Self {
            vector: Some(vector),
            text: None,
            limit,
        }
    }

    pub fn text(text: impl Into<String>, limit: usize) -> Self {
        Self {
            vector: None,
            text: Some(text.into()),
            limit,
        }
    }
}

/// Storage backend for memories, relationships, and command history
///
/// Implementations must be safe for concurrent readers; writers are assumed
/// single-writer-per-transaction. Only active memories are returned from
/// searches and convenience queries.
#[async_trait]
pub trait StorageClient: Send + Sync {
    async fn create_user(&self, name: &str) -> Result<String>;

    async fn create_workspace(&self, user_id: &str, name: &str) -> Result<String>;

    /// Persist a memory; fails with a validation error when the workspace
    /// does not exist or the embedding dimension is wrong
    async fn create_memory(&self, memory: ExtractedMemory) -> Result<ExtractedMemory>;

    async fn search_memories(
        &self,
        workspace_id: &str,
        query: SearchQuery,
    ) -> Result<Vec<ScoredMemory>>;

    async fn search_memories_text(
        &self,
        query: &str,
        workspace_id: &str,
        limit: usize,
    ) -> Result<Vec<ExtractedMemory>>;

    /// Persist a relationship. A missing endpoint is a warn-only failure:
    /// callers log it and continue the import.
    async fn create_relationship(
        &self,
        relationship: ExtractedRelationship,
    ) -> Result<ExtractedRelationship>;

    /// Mark memories inactive (used for ids absorbed by a merge); inactive
    /// memories keep their rows for audit but drop out of retrieval
    async fn deactivate_memories(&self, workspace_id: &str, ids: &[String]) -> Result<()>;

    /// Recent memories of type `entity.file`, newest first
    async fn get_recent_files(
        &self,
        workspace_id: &str,
        limit: usize,
    ) -> Result<Vec<ExtractedMemory>>;

    /// Recent memories excluding `context.screen`, newest first
    async fn get_recent_non_screen_memories(
        &self,
        workspace_id: &str,
        limit: usize,
    ) -> Result<Vec<ExtractedMemory>>;

    async fn save_command(
        &self,
        request: &CommandRequest,
        response: &CommandResponse,
        memories: &[MemoryReference],
    ) -> Result<()>;
}
