//! Centralized constants
//!
//! Single source of truth for defaults that more than one crate relies on.

/// Ingest limits
pub mod ingest {
    /// Maximum accepted payload size in bytes (50 MiB)
    pub const MAX_FILE_SIZE: usize = 50 * 1024 * 1024;
    /// Maximum conversations accepted from a single payload
    pub const MAX_CONVERSATIONS_PER_FILE: usize = 1000;
}

/// Token counting
pub mod tokens {
    /// Characters per token for the approximate method
    pub const APPROX_CHARS_PER_TOKEN: f64 = 4.0;
    /// Characters per token estimated for Anthropic models
    pub const ANTHROPIC_CHARS_PER_TOKEN: f64 = 3.5;
    /// Characters per token estimated for Gemini models
    pub const GEMINI_CHARS_PER_TOKEN: f64 = 3.8;
    /// Counter cache capacity (entries)
    pub const CACHE_CAPACITY: usize = 2048;
    /// Counter cache entry TTL in seconds (1 h)
    pub const CACHE_TTL_SECS: u64 = 3600;
}

/// Chunking
pub mod chunking {
    /// Default token budget per chunk
    pub const MAX_TOKENS_PER_CHUNK: usize = 1000;
    /// Default min chunk size as a fraction of the max
    pub const MIN_CHUNK_FRACTION: f64 = 0.2;
    /// Keyword-overlap threshold below which the semantic strategy splits
    pub const TOPIC_SHIFT_THRESHOLD: f64 = 0.3;
    /// Message window compared on each side of a candidate boundary
    pub const SEMANTIC_WINDOW: usize = 3;
    /// Top keywords kept per window
    pub const SEMANTIC_TOP_KEYWORDS: usize = 10;
}

/// Provider retry discipline
pub mod retry {
    pub const MAX_RETRIES: u32 = 3;
    pub const INITIAL_DELAY_MS: u64 = 500;
    pub const MAX_DELAY_MS: u64 = 30_000;
    pub const BACKOFF_MULTIPLIER: f64 = 2.0;
    /// Fallback rate-limit window when the provider gives no hint
    pub const DEFAULT_RETRY_AFTER_MS: u64 = 60_000;
    /// Pause between queued requests while draining after a rate limit
    pub const DRAIN_PAUSE_MS: u64 = 100;
}

/// Retrieval
pub mod retrieval {
    /// Candidates fetched from vector search
    pub const DEFAULT_TOP_K: usize = 10;
    /// Token budget for the composed context
    pub const CONTEXT_TOKEN_BUDGET: usize = 1000;
    /// Multiplicative score boost for `fact` memories
    pub const FACT_BOOST_FACTOR: f32 = 1.5;
    /// Content similarity at or above which two memories are duplicates
    pub const SIMILARITY_THRESHOLD: f64 = 0.85;
    /// Similarity assigned to same-content entities whose identity differs
    pub const ENTITY_IDENTITY_MISMATCH_SCORE: f64 = 0.7;
}

/// Embeddings
pub mod embedding {
    /// Default embedding dimension
    pub const DIMENSION: usize = 384;
}
