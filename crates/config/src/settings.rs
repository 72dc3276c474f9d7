//! Main settings module

use config::{Config, Environment, File};
use serde::{Deserialize, Serialize};
use std::path::Path;

use crate::constants::{chunking, embedding, ingest, retrieval, retry, tokens};
use crate::ConfigError;

/// Top-level application settings
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct Settings {
    #[serde(default)]
    pub ingest: IngestSettings,

    #[serde(default)]
    pub tokens: TokenSettings,

    #[serde(default)]
    pub chunking: ChunkingSettings,

    #[serde(default)]
    pub retry: RetrySettings,

    #[serde(default)]
    pub retrieval: RetrievalSettings,

    #[serde(default)]
    pub embedding: EmbeddingSettings,

    #[serde(default)]
    pub llm: LlmSettings,
}

/// Ingest limits and parser behavior
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IngestSettings {
    #[serde(default = "default_max_file_size")]
    pub max_file_size: usize,

    #[serde(default = "default_max_conversations")]
    pub max_conversations_per_file: usize,

    /// When true, `detect()` picks the parser; when false the caller must
    /// name a provider explicitly
    #[serde(default = "default_true")]
    pub enable_auto_detection: bool,
}

impl Default for IngestSettings {
    fn default() -> Self {
        Self {
            max_file_size: ingest::MAX_FILE_SIZE,
            max_conversations_per_file: ingest::MAX_CONVERSATIONS_PER_FILE,
            enable_auto_detection: true,
        }
    }
}

/// Token counter configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TokenSettings {
    /// Default count method: "exact", "estimated", or "approximate"
    #[serde(default = "default_token_method")]
    pub method: String,

    #[serde(default = "default_cache_capacity")]
    pub cache_capacity: usize,

    #[serde(default = "default_cache_ttl")]
    pub cache_ttl_secs: u64,

    /// Path to a tokenizer.json for the exact method; without one the
    /// counter falls back to approximate counting
    #[serde(default)]
    pub tokenizer_path: Option<String>,
}

impl Default for TokenSettings {
    fn default() -> Self {
        Self {
            method: "approximate".to_string(),
            cache_capacity: tokens::CACHE_CAPACITY,
            cache_ttl_secs: tokens::CACHE_TTL_SECS,
            tokenizer_path: None,
        }
    }
}

/// Chunking configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChunkingSettings {
    #[serde(default = "default_max_tokens_per_chunk")]
    pub max_tokens_per_chunk: usize,

    /// Overlap size in tokens; wins over `overlap_percentage` when both set
    #[serde(default)]
    pub overlap_tokens: Option<usize>,

    /// Overlap as a fraction of `max_tokens_per_chunk`
    #[serde(default)]
    pub overlap_percentage: Option<f64>,

    /// Minimum chunk size in tokens; defaults to 20% of the max
    #[serde(default)]
    pub min_chunk_size: Option<usize>,

    /// "sliding-window", "conversation-boundary", or "semantic"
    #[serde(default = "default_chunk_strategy")]
    pub strategy: String,

    #[serde(default = "default_true")]
    pub preserve_message_boundaries: bool,
}

impl Default for ChunkingSettings {
    fn default() -> Self {
        Self {
            max_tokens_per_chunk: chunking::MAX_TOKENS_PER_CHUNK,
            overlap_tokens: None,
            overlap_percentage: None,
            min_chunk_size: None,
            strategy: "sliding-window".to_string(),
            preserve_message_boundaries: true,
        }
    }
}

/// Retry and backoff configuration for the completion provider
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RetrySettings {
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,

    #[serde(default = "default_initial_delay_ms")]
    pub initial_delay_ms: u64,

    #[serde(default = "default_max_delay_ms")]
    pub max_delay_ms: u64,

    #[serde(default = "default_backoff_multiplier")]
    pub backoff_multiplier: f64,
}

impl Default for RetrySettings {
    fn default() -> Self {
        Self {
            max_retries: retry::MAX_RETRIES,
            initial_delay_ms: retry::INITIAL_DELAY_MS,
            max_delay_ms: retry::MAX_DELAY_MS,
            backoff_multiplier: retry::BACKOFF_MULTIPLIER,
        }
    }
}

/// Retrieval and deduplication configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RetrievalSettings {
    /// Candidates fetched from vector search
    #[serde(default = "default_top_k")]
    pub k: usize,

    #[serde(default = "default_token_budget")]
    pub token_budget: usize,

    #[serde(default = "default_fact_boost")]
    pub fact_boost_factor: f32,

    #[serde(default = "default_similarity_threshold")]
    pub similarity_threshold: f64,
}

impl Default for RetrievalSettings {
    fn default() -> Self {
        Self {
            k: retrieval::DEFAULT_TOP_K,
            token_budget: retrieval::CONTEXT_TOKEN_BUDGET,
            fact_boost_factor: retrieval::FACT_BOOST_FACTOR,
            similarity_threshold: retrieval::SIMILARITY_THRESHOLD,
        }
    }
}

/// Embedding configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EmbeddingSettings {
    #[serde(default = "default_embedding_dimension")]
    pub dimension: usize,
}

impl Default for EmbeddingSettings {
    fn default() -> Self {
        Self {
            dimension: embedding::DIMENSION,
        }
    }
}

/// LLM backend configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LlmSettings {
    #[serde(default = "default_llm_endpoint")]
    pub endpoint: String,

    #[serde(default = "default_llm_model")]
    pub model: String,

    /// API key; usually supplied via `MNEMON_LLM__API_KEY`
    #[serde(default)]
    pub api_key: Option<String>,

    #[serde(default = "default_llm_timeout_secs")]
    pub timeout_secs: u64,
}

impl Default for LlmSettings {
    fn default() -> Self {
        Self {
            endpoint: "https://api.openai.com/v1".to_string(),
            model: "gpt-4o-mini".to_string(),
            api_key: None,
            timeout_secs: 60,
        }
    }
}

impl Settings {
    /// Load settings from an optional TOML file layered with environment
    /// variables (`MNEMON_RETRIEVAL__K=5` style)
    pub fn load(config_path: Option<&Path>) -> Result<Self, ConfigError> {
        let mut builder = Config::builder();

        if let Some(path) = config_path {
            builder = builder.add_source(File::from(path).required(true));
        }

        let config = builder
            .add_source(Environment::with_prefix("MNEMON").separator("__"))
            .build()
            .map_err(|e| ConfigError::Load(e.to_string()))?;

        let settings: Settings = config
            .try_deserialize()
            .map_err(|e| ConfigError::Load(e.to_string()))?;

        settings.validate()?;
        Ok(settings)
    }

    /// Validate cross-field invariants
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.chunking.max_tokens_per_chunk == 0 {
            return Err(ConfigError::Invalid(
                "chunking.max_tokens_per_chunk must be positive".to_string(),
            ));
        }
        if let Some(pct) = self.chunking.overlap_percentage {
            if !(0.0..1.0).contains(&pct) {
                return Err(ConfigError::Invalid(
                    "chunking.overlap_percentage must be in [0, 1)".to_string(),
                ));
            }
        }
        if let Some(overlap) = self.chunking.overlap_tokens {
            if overlap >= self.chunking.max_tokens_per_chunk {
                return Err(ConfigError::Invalid(
                    "chunking.overlap_tokens must be below max_tokens_per_chunk".to_string(),
                ));
            }
        }
        if !matches!(
            self.chunking.strategy.as_str(),
            "sliding-window" | "conversation-boundary" | "semantic"
        ) {
            return Err(ConfigError::Invalid(format!(
                "unknown chunking.strategy '{}'",
                self.chunking.strategy
            )));
        }
        if !(0.0..=1.0).contains(&self.retrieval.similarity_threshold) {
            return Err(ConfigError::Invalid(
                "retrieval.similarity_threshold must be in [0, 1]".to_string(),
            ));
        }
        if self.retrieval.fact_boost_factor <= 0.0 {
            return Err(ConfigError::Invalid(
                "retrieval.fact_boost_factor must be positive".to_string(),
            ));
        }
        if self.embedding.dimension == 0 {
            return Err(ConfigError::Invalid(
                "embedding.dimension must be positive".to_string(),
            ));
        }
        if self.retry.backoff_multiplier < 1.0 {
            return Err(ConfigError::Invalid(
                "retry.backoff_multiplier must be >= 1".to_string(),
            ));
        }
        Ok(())
    }
}

fn default_true() -> bool {
    true
}

fn default_max_file_size() -> usize {
    ingest::MAX_FILE_SIZE
}

fn default_max_conversations() -> usize {
    ingest::MAX_CONVERSATIONS_PER_FILE
}

fn default_token_method() -> String {
    "approximate".to_string()
}

fn default_cache_capacity() -> usize {
    tokens::CACHE_CAPACITY
}

fn default_cache_ttl() -> u64 {
    tokens::CACHE_TTL_SECS
}

fn default_max_tokens_per_chunk() -> usize {
    chunking::MAX_TOKENS_PER_CHUNK
}

fn default_chunk_strategy() -> String {
    "sliding-window".to_string()
}

fn default_max_retries() -> u32 {
    retry::MAX_RETRIES
}

fn default_initial_delay_ms() -> u64 {
    retry::INITIAL_DELAY_MS
}

fn default_max_delay_ms() -> u64 {
    retry::MAX_DELAY_MS
}

fn default_backoff_multiplier() -> f64 {
    retry::BACKOFF_MULTIPLIER
}

fn default_top_k() -> usize {
    retrieval::DEFAULT_TOP_K
}

fn default_token_budget() -> usize {
    retrieval::CONTEXT_TOKEN_BUDGET
}

fn default_fact_boost() -> f32 {
    retrieval::FACT_BOOST_FACTOR
}

fn default_similarity_threshold() -> f64 {
    retrieval::SIMILARITY_THRESHOLD
}

fn default_embedding_dimension() -> usize {
    embedding::DIMENSION
}

fn default_llm_endpoint() -> String {
    "https://api.openai.com/v1".to_string()
}

fn default_llm_model() -> String {
    "gpt-4o-mini".to_string()
}

fn default_llm_timeout_secs() -> u64 {
    60
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_defaults() {
        let settings = Settings::default();
        assert_eq!(settings.ingest.max_file_size, 50 * 1024 * 1024);
        assert_eq!(settings.ingest.max_conversations_per_file, 1000);
        assert_eq!(settings.retrieval.fact_boost_factor, 1.5);
        assert_eq!(settings.retrieval.similarity_threshold, 0.85);
        assert_eq!(settings.retrieval.token_budget, 1000);
        assert_eq!(settings.embedding.dimension, 384);
        assert!(settings.chunking.preserve_message_boundaries);
        assert!(settings.validate().is_ok());
    }

    #[test]
    fn test_load_from_file() {
        let mut file = tempfile::NamedTempFile::with_suffix(".toml").unwrap();
        writeln!(
            file,
            r#"
[retrieval]
k = 5
token_budget = 500

[chunking]
max_tokens_per_chunk = 200
strategy = "semantic"
"#
        )
        .unwrap();

        let settings = Settings::load(Some(file.path())).unwrap();
        assert_eq!(settings.retrieval.k, 5);
        assert_eq!(settings.retrieval.token_budget, 500);
        assert_eq!(settings.chunking.max_tokens_per_chunk, 200);
        assert_eq!(settings.chunking.strategy, "semantic");
        // Untouched sections keep their defaults
        assert_eq!(settings.embedding.dimension, 384);
    }

    #[test]
    fn test_validate_rejects_bad_overlap() {
        let mut settings = Settings::default();
        settings.chunking.overlap_tokens = Some(settings.chunking.max_tokens_per_chunk);
        assert!(settings.validate().is_err());

        let mut settings = Settings::default();
        settings.chunking.overlap_percentage = Some(1.5);
        assert!(settings.validate().is_err());
    }

    #[test]
    fn test_validate_rejects_unknown_strategy() {
        let mut settings = Settings::default();
        settings.chunking.strategy = "recursive".to_string();
        assert!(settings.validate().is_err());
    }
}
