//! Token-aware conversation chunking
//!
//! Splits long conversations into overlapping, token-bounded chunks for
//! per-chunk extraction. Three strategies share one span engine:
//!
//! 1. **Sliding-window**: greedy accumulation under the token budget
//! 2. **Conversation-boundary**: prefers to cut where the speaker changes
//! 3. **Semantic**: cuts at topic shifts detected via keyword overlap,
//!    falling back to sliding-window when no boundary is found
//!
//! Guarantees: chunks cover every message in order with strictly increasing
//! sequence numbers, adjacent chunks agree on their shared overlap, and no
//! chunk exceeds the budget except a flagged single oversize message.

pub mod boundary;
pub mod config;
pub mod engine;
pub mod semantic;
pub mod sliding_window;

pub use boundary::ConversationBoundaryStrategy;
pub use config::{ChunkingConfig, StrategyKind};
pub use semantic::SemanticStrategy;
pub use sliding_window::SlidingWindowStrategy;

use std::sync::Arc;

use mnemon_core::{ConversationChunk, NormalizedConversation};
use mnemon_tokens::TokenCounter;
use thiserror::Error;

#[derive(Error, Debug, Clone)]
pub enum ChunkingError {
    #[error("cannot chunk an empty conversation")]
    EmptyConversation,

    #[error("invalid chunking config: {0}")]
    InvalidConfig(String),
}

impl From<ChunkingError> for mnemon_core::Error {
    fn from(err: ChunkingError) -> Self {
        mnemon_core::Error::Validation(err.to_string())
    }
}

/// Chunking strategy contract
pub trait ChunkingStrategy: Send + Sync {
    fn name(&self) -> &'static str;

    /// Whether this strategy's analysis applies to the conversation; a
    /// strategy may still be invoked when this is false and will defer to
    /// its fallback
    fn can_handle(&self, conv: &NormalizedConversation, config: &ChunkingConfig) -> bool;

    fn chunk(
        &self,
        conv: &NormalizedConversation,
        config: &ChunkingConfig,
    ) -> Result<Vec<ConversationChunk>, ChunkingError>;
}

/// Facade that dispatches to the configured strategy
pub struct Chunker {
    sliding: SlidingWindowStrategy,
    boundary: ConversationBoundaryStrategy,
    semantic: SemanticStrategy,
}

impl Chunker {
    pub fn new(counter: Arc<TokenCounter>) -> Self {
        Self {
            sliding: SlidingWindowStrategy::new(counter.clone()),
            boundary: ConversationBoundaryStrategy::new(counter.clone()),
            semantic: SemanticStrategy::new(counter),
        }
    }

    pub fn chunk(
        &self,
        conv: &NormalizedConversation,
        config: &ChunkingConfig,
    ) -> Result<Vec<ConversationChunk>, ChunkingError> {
        config.validate()?;
        let strategy: &dyn ChunkingStrategy = match config.strategy {
            StrategyKind::SlidingWindow => &self.sliding,
            StrategyKind::ConversationBoundary => &self.boundary,
            StrategyKind::Semantic => &self.semantic,
        };
        strategy.chunk(conv, config)
    }
}
