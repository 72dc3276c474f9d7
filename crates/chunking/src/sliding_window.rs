//! Sliding-window strategy

use std::sync::Arc;

use mnemon_core::{ConversationChunk, NormalizedConversation};
use mnemon_tokens::TokenCounter;

use crate::config::ChunkingConfig;
use crate::engine::{assemble_chunks, build_spans, prepare_messages, SplitPolicy};
use crate::{ChunkingError, ChunkingStrategy};

pub const NAME: &str = "sliding-window";

/// Greedy accumulation under the token budget with tail-message overlap
pub struct SlidingWindowStrategy {
    counter: Arc<TokenCounter>,
}

impl SlidingWindowStrategy {
    pub fn new(counter: Arc<TokenCounter>) -> Self {
        Self { counter }
    }
}

impl ChunkingStrategy for SlidingWindowStrategy {
    fn name(&self) -> &'static str {
        NAME
    }

    fn can_handle(&self, _conv: &NormalizedConversation, _config: &ChunkingConfig) -> bool {
        true
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
        let spans = build_spans(&counts, config, &SplitPolicy::Greedy);
        Ok(assemble_chunks(conv, &messages, &counts, &spans, NAME, config))
    }
}
