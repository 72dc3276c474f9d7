//! Token counting with cached results
//!
//! Three accuracy tiers:
//! - **exact**: BPE encoding via the `tokenizers` crate (OpenAI-family
//!   models); any encoder failure falls back to approximate counting and the
//!   result says so
//! - **estimated**: character-ratio heuristics tuned per provider family
//! - **approximate**: grapheme count / 4
//!
//! Counts are memoized in a bounded LRU cache with TTL; hit/miss/eviction
//! counters are exposed for observability.

pub mod cache;
pub mod counter;

pub use cache::{CacheStats, TokenCache};
pub use counter::{Accuracy, CountMethod, TokenCount, TokenCounter, TokenCounterConfig};
