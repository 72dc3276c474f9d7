//! Semantic (topic-shift) strategy
//!
//! Compares the top keywords of adjacent message windows; a cosine overlap
//! below the threshold marks a topic shift and the chunker prefers to split
//! there. When the conversation is too short for windowing or no shift is
//! found, the sliding window takes over and the chunk metadata records that.

use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use once_cell::sync::Lazy;
use regex::Regex;

use mnemon_config::constants::chunking as chunk_constants;
use mnemon_core::{ConversationChunk, NormalizedConversation, NormalizedMessage};
use mnemon_tokens::TokenCounter;

use crate::config::ChunkingConfig;
use crate::engine::{assemble_chunks, build_spans, prepare_messages, SplitPolicy};
use crate::{sliding_window, ChunkingError, ChunkingStrategy};

pub const NAME: &str = "semantic";

static WORD: Lazy<Regex> = Lazy::new(|| Regex::new(r"[a-z0-9]{3,}").expect("static regex"));

static STOPWORDS: Lazy<HashSet<&'static str>> = Lazy::new(|| {
    [
        "the", "and", "for", "are", "was", "were", "been", "being", "have", "has", "had",
        "this", "that", "these", "those", "with", "from", "into", "about", "your", "you",
        "they", "them", "their", "what", "which", "who", "whom", "when", "where", "how",
        "why", "can", "could", "would", "should", "will", "just", "not", "but", "all",
        "any", "its", "our", "out", "get", "got", "than", "then", "there", "here",
    ]
    .into_iter()
    .collect()
});

/// Splits at detected topic shifts, subject to the token budget
pub struct SemanticStrategy {
    counter: Arc<TokenCounter>,
    window: usize,
    top_keywords: usize,
    threshold: f64,
}

impl SemanticStrategy {
    pub fn new(counter: Arc<TokenCounter>) -> Self {
        Self {
            counter,
            window: chunk_constants::SEMANTIC_WINDOW,
            top_keywords: chunk_constants::SEMANTIC_TOP_KEYWORDS,
            threshold: chunk_constants::TOPIC_SHIFT_THRESHOLD,
        }
    }

    /// Indices where the keyword overlap between adjacent windows drops
    /// below the threshold
    fn topic_boundaries(&self, messages: &[NormalizedMessage]) -> HashSet<usize> {
        let n = messages.len();
        let mut boundaries = HashSet::new();
        if n < self.window * 2 {
            return boundaries;
        }

        for boundary in self.window..=(n - self.window) {
            let left = self.window_keywords(&messages[boundary - self.window..boundary]);
            let right = self.window_keywords(&messages[boundary..boundary + self.window]);
            if keyword_overlap(&left, &right) < self.threshold {
                boundaries.insert(boundary);
            }
        }
        boundaries
    }

    /// Top keywords of a message window by frequency
    fn window_keywords(&self, messages: &[NormalizedMessage]) -> HashSet<String> {
        let mut frequency: HashMap<String, usize> = HashMap::new();
        for message in messages {
            for word in WORD.find_iter(&message.content.to_lowercase()) {
                let word = word.as_str();
                if !STOPWORDS.contains(word) {
                    *frequency.entry(word.to_string()).or_default() += 1;
                }
            }
        }

        let mut ranked: Vec<(String, usize)> = frequency.into_iter().collect();
        // Frequency first, then alphabetical for determinism
        ranked.sort_by(|a, b| b.1.cmp(&a.1).then_with(|| a.0.cmp(&b.0)));
        ranked
            .into_iter()
            .take(self.top_keywords)
            .map(|(word, _)| word)
            .collect()
    }
}

/// Cosine overlap between two keyword sets
fn keyword_overlap(a: &HashSet<String>, b: &HashSet<String>) -> f64 {
    if a.is_empty() || b.is_empty() {
        return 0.0;
    }
    let intersection = a.intersection(b).count() as f64;
    intersection / ((a.len() as f64).sqrt() * (b.len() as f64).sqrt())
}

impl ChunkingStrategy for SemanticStrategy {
    fn name(&self) -> &'static str {
        NAME
    }

    fn can_handle(&self, conv: &NormalizedConversation, _config: &ChunkingConfig) -> bool {
        conv.messages.len() >= self.window * 2
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
        let boundaries = self.topic_boundaries(&messages);

        let (policy, recorded) = if boundaries.is_empty() {
            tracing::debug!(
                conversation_id = %conv.id,
                "no topic shift found, falling back to sliding window"
            );
            (SplitPolicy::Greedy, sliding_window::NAME)
        } else {
            (SplitPolicy::Boundaries { set: &boundaries }, NAME)
        };

        let spans = build_spans(&counts, config, &policy);
        Ok(assemble_chunks(conv, &messages, &counts, &spans, recorded, config))
    }
}
