//! Chunking configuration

use mnemon_config::constants::chunking as chunk_constants;
use mnemon_config::ChunkingSettings;
use mnemon_tokens::CountMethod;

use crate::ChunkingError;

/// Which strategy drives the split
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum StrategyKind {
    #[default]
    SlidingWindow,
    ConversationBoundary,
    Semantic,
}

impl StrategyKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            StrategyKind::SlidingWindow => "sliding-window",
            StrategyKind::ConversationBoundary => "conversation-boundary",
            StrategyKind::Semantic => "semantic",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "sliding-window" => Some(StrategyKind::SlidingWindow),
            "conversation-boundary" => Some(StrategyKind::ConversationBoundary),
            "semantic" => Some(StrategyKind::Semantic),
            _ => None,
        }
    }
}

/// Chunking parameters
#[derive(Debug, Clone)]
pub struct ChunkingConfig {
    /// Token budget per chunk
    pub max_tokens_per_chunk: usize,
    /// Overlap size in tokens; wins over `overlap_percentage` when both set
    pub overlap_tokens: Option<usize>,
    /// Overlap as a fraction of the budget
    pub overlap_percentage: Option<f64>,
    /// Minimum chunk size in tokens; defaults to 20% of the budget
    pub min_chunk_size: Option<usize>,
    pub strategy: StrategyKind,
    /// When true a message is never split mid-content; a single over-budget
    /// message becomes its own flagged chunk
    pub preserve_message_boundaries: bool,
    pub token_count_method: CountMethod,
    /// Overrides the strategy name recorded in chunk metadata
    pub custom_strategy_name: Option<String>,
}

impl Default for ChunkingConfig {
    fn default() -> Self {
        Self {
            max_tokens_per_chunk: chunk_constants::MAX_TOKENS_PER_CHUNK,
            overlap_tokens: None,
            overlap_percentage: None,
            min_chunk_size: None,
            strategy: StrategyKind::SlidingWindow,
            preserve_message_boundaries: true,
            token_count_method: CountMethod::Approximate,
            custom_strategy_name: None,
        }
    }
}

impl ChunkingConfig {
    /// Build from settings plus the token method in effect
    pub fn from_settings(settings: &ChunkingSettings, method: CountMethod) -> Self {
        Self {
            max_tokens_per_chunk: settings.max_tokens_per_chunk,
            overlap_tokens: settings.overlap_tokens,
            overlap_percentage: settings.overlap_percentage,
            min_chunk_size: settings.min_chunk_size,
            strategy: StrategyKind::parse(&settings.strategy).unwrap_or_default(),
            preserve_message_boundaries: settings.preserve_message_boundaries,
            token_count_method: method,
            custom_strategy_name: None,
        }
    }

    /// Effective overlap target in tokens
    pub fn resolved_overlap_tokens(&self) -> usize {
        if let Some(tokens) = self.overlap_tokens {
            return tokens;
        }
        if let Some(pct) = self.overlap_percentage {
            return (pct * self.max_tokens_per_chunk as f64).ceil() as usize;
        }
        0
    }

    /// Effective minimum chunk size in tokens
    pub fn resolved_min_chunk_size(&self) -> usize {
        self.min_chunk_size.unwrap_or_else(|| {
            (self.max_tokens_per_chunk as f64 * chunk_constants::MIN_CHUNK_FRACTION) as usize
        })
    }

    pub fn validate(&self) -> Result<(), ChunkingError> {
        if self.max_tokens_per_chunk == 0 {
            return Err(ChunkingError::InvalidConfig(
                "max_tokens_per_chunk must be positive".to_string(),
            ));
        }
        if let Some(pct) = self.overlap_percentage {
            if !(0.0..1.0).contains(&pct) {
                return Err(ChunkingError::InvalidConfig(
                    "overlap_percentage must be in [0, 1)".to_string(),
                ));
            }
        }
        if self.resolved_overlap_tokens() >= self.max_tokens_per_chunk {
            return Err(ChunkingError::InvalidConfig(
                "overlap must be smaller than max_tokens_per_chunk".to_string(),
            ));
        }
        Ok(())
    }

    /// Name recorded in chunk metadata for a strategy actually used
    pub fn recorded_name(&self, actual: &str) -> String {
        self.custom_strategy_name
            .clone()
            .unwrap_or_else(|| actual.to_string())
    }
}
