//! Extraction result and config types

use std::time::Duration;

use mnemon_core::{ExtractedMemory, ExtractedRelationship, MemoryType};

/// Extraction parameters for one conversation or chunk
#[derive(Debug, Clone)]
pub struct ExtractionConfig {
    /// Memory types the model is asked to extract
    pub memory_types: Vec<MemoryType>,
    pub include_relationships: bool,
    pub max_tokens: usize,
    pub temperature: f32,
    /// Deadline per LLM call
    pub timeout: Option<Duration>,
}

impl Default for ExtractionConfig {
    fn default() -> Self {
        Self {
            memory_types: vec![
                MemoryType::entity(),
                MemoryType::fact(),
                MemoryType::decision(),
            ],
            include_relationships: true,
            max_tokens: 2048,
            temperature: 0.1,
            timeout: None,
        }
    }
}

/// Per-chunk extraction outcome
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ChunkStatus {
    Success,
    Failed { error: String },
}

/// What one chunk produced
///
/// Relationship endpoints may still be `temp_{index}` references into this
/// chunk's `memories`; the deduplicator resolves them.
#[derive(Debug, Clone)]
pub struct ChunkExtractionResult {
    pub chunk_id: String,
    pub sequence: usize,
    pub status: ChunkStatus,
    pub memories: Vec<ExtractedMemory>,
    pub relationships: Vec<ExtractedRelationship>,
}

impl ChunkExtractionResult {
    pub fn is_success(&self) -> bool {
        self.status == ChunkStatus::Success
    }

    pub fn failed(chunk_id: impl Into<String>, sequence: usize, error: impl Into<String>) -> Self {
        Self {
            chunk_id: chunk_id.into(),
            sequence,
            status: ChunkStatus::Failed {
                error: error.into(),
            },
            memories: Vec::new(),
            relationships: Vec::new(),
        }
    }
}

/// Summary of memories extracted from earlier chunks, threaded into the
/// next chunk's prompt so the model avoids re-extracting them
#[derive(Debug, Clone, Default)]
pub struct PreviousChunkContext {
    /// (type, content) pairs in extraction order
    pub summaries: Vec<(MemoryType, String)>,
}

impl PreviousChunkContext {
    pub fn from_memories(memories: &[ExtractedMemory]) -> Self {
        Self {
            summaries: memories
                .iter()
                .map(|m| (m.memory_type.clone(), m.summary()))
                .collect(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.summaries.is_empty()
    }
}
