//! Conversation-boundary strategy

use std::sync::Arc;

use mnemon_core::{ConversationChunk, MessageRole, NormalizedConversation};
use mnemon_tokens::TokenCounter;

use crate::config::ChunkingConfig;
use crate::engine::{assemble_chunks, build_spans, prepare_messages, SplitPolicy};
use crate::{ChunkingError, ChunkingStrategy};

pub const NAME: &str = "conversation-boundary";

/// Prefers ending a chunk where the speaker changes; otherwise behaves like
/// the sliding window
pub struct ConversationBoundaryStrategy {
    counter: Arc<TokenCounter>,
}

impl ConversationBoundaryStrategy {
    pub fn new(counter: Arc<TokenCounter>) -> Self {
        Self { counter }
    }
}

impl ChunkingStrategy for ConversationBoundaryStrategy {
    fn name(&self) -> &'static str {
        NAME
    }

    fn can_handle(&self, conv: &NormalizedConversation, _config: &ChunkingConfig) -> bool {
        // Useful whenever there is at least one speaker change to cut at
        conv.messages.windows(2).any(|w| w[0].role != w[1].role)
    }

    fn chunk(
        &self,
        conv: &NormalizedConversation,
        config: &ChunkingConfig,
    ) -> Result<Vec<ConversationChunk>, ChunkingError> {
        if conv.messages.is_empty() {
            return Err(ChunkingError::EmptyConversation);
        }

        let (messages, counts) = prepare_messages(&conv.messages, config, &self.counter);
        let roles: Vec<MessageRole> = messages.iter().map(|m| m.role).collect();
        let spans = build_spans(&counts, config, &SplitPolicy::TurnChange { roles: &roles });
        Ok(assemble_chunks(conv, &messages, &counts, &spans, NAME, config))
    }
}
