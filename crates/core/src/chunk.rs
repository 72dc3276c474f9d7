//! Conversation chunk types
//!
//! A chunk is a contiguous, token-bounded, possibly overlapping subsequence
//! of a conversation's messages. Chunks are produced by the chunking
//! strategies and consumed by per-chunk extraction.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::conversation::NormalizedMessage;

/// Overlap shared with an adjacent chunk
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChunkOverlap {
    /// Number of messages shared
    pub messages: usize,
    /// Token total of the shared messages
    pub tokens: usize,
}

/// Bookkeeping attached to every chunk
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChunkMetadata {
    /// Index of the chunk's first message within the parent conversation
    pub start_index: usize,
    /// Index of the chunk's last message within the parent conversation
    pub end_index: usize,
    /// Name of the strategy that produced this chunk (after any fallback)
    pub strategy: String,
    /// Set when a single message exceeded the token budget and was emitted
    /// alone; this is the only case a chunk may exceed the configured max
    #[serde(default)]
    pub oversize_message: bool,
    pub created_at: DateTime<Utc>,
}

/// A token-bounded slice of a conversation
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConversationChunk {
    pub id: String,
    pub conversation_id: String,
    /// 1-based position among this conversation's chunks
    pub sequence: usize,
    pub total_chunks: usize,
    pub messages: Vec<NormalizedMessage>,
    pub token_count: usize,
    pub overlap_with_previous: ChunkOverlap,
    pub overlap_with_next: ChunkOverlap,
    pub metadata: ChunkMetadata,
}

impl ConversationChunk {
    /// Ids of the chunk's messages, in order
    pub fn message_ids(&self) -> Vec<String> {
        self.messages.iter().map(|m| m.id.clone()).collect()
    }
}
