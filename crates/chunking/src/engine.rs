//! Shared span engine
//!
//! All strategies reduce to choosing split points over a message sequence;
//! this module owns the greedy accumulation loop, overlap seeding, oversize
//! handling, and chunk assembly so every strategy upholds the same
//! invariants.

use std::collections::HashSet;

use chrono::Utc;

use mnemon_core::{
    ChunkMetadata, ChunkOverlap, ConversationChunk, MessageRole, NormalizedConversation,
    NormalizedMessage,
};
use mnemon_tokens::TokenCounter;

use crate::config::ChunkingConfig;

/// A half-open message index range with its token total
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) struct Span {
    pub start: usize,
    pub end: usize,
    pub tokens: usize,
    pub oversize: bool,
}

/// Strategy-specific split preferences consulted by the engine
pub(crate) enum SplitPolicy<'a> {
    /// Pure budget-driven splits
    Greedy,
    /// On a forced budget split, rewind to the latest speaker change
    TurnChange { roles: &'a [MessageRole] },
    /// Split eagerly before any of these indices (topic shifts)
    Boundaries { set: &'a HashSet<usize> },
}

impl SplitPolicy<'_> {
    fn split_before(&self, index: usize) -> bool {
        match self {
            SplitPolicy::Boundaries { set } => set.contains(&index),
            _ => false,
        }
    }

    /// When the budget forces a split at `end`, optionally back off to a
    /// preferred earlier cut in `(start, end)`
    fn budget_rewind(
        &self,
        start: usize,
        end: usize,
        tok: impl Fn(usize, usize) -> usize,
        min: usize,
    ) -> Option<usize> {
        match self {
            SplitPolicy::TurnChange { roles } => (start + 1..end)
                .rev()
                .find(|&b| roles[b - 1] != roles[b] && tok(start, b) >= min),
            _ => None,
        }
    }
}

/// Split messages into spans under the config's budget
///
/// `counts[i]` is the token count of `messages[i]`. Messages over the budget
/// are emitted as single flagged spans; callers that allow mid-message
/// splits pre-split such messages before reaching the engine.
pub(crate) fn build_spans(counts: &[usize], config: &ChunkingConfig, policy: &SplitPolicy) -> Vec<Span> {
    let n = counts.len();
    let max = config.max_tokens_per_chunk;
    let min = config.resolved_min_chunk_size();
    let overlap_target = config.resolved_overlap_tokens();

    let mut prefix = Vec::with_capacity(n + 1);
    prefix.push(0usize);
    for &count in counts {
        prefix.push(prefix.last().unwrap() + count);
    }
    let tok = |a: usize, b: usize| prefix[b] - prefix[a];

    let mut spans: Vec<Span> = Vec::new();
    let mut start = 0;
    // A chunk never ends at or before the previous chunk's end, so overlap
    // messages land in exactly two adjacent chunks
    let mut prev_end = 0;

    while start < n {
        if counts[start] > max {
            spans.push(Span {
                start,
                end: start + 1,
                tokens: counts[start],
                oversize: true,
            });
            prev_end = start + 1;
            start += 1;
            continue;
        }

        let mut end = start + 1;
        let mut budget_stop = false;
        while end < n {
            if counts[end] > max {
                break; // next message gets its own oversize span
            }
            if end > prev_end && policy.split_before(end) && tok(start, end) >= min {
                break;
            }
            if tok(start, end + 1) > max {
                budget_stop = true;
                break;
            }
            end += 1;
        }

        if budget_stop {
            if let Some(b) = policy.budget_rewind(start, end, tok, min) {
                if b > prev_end {
                    end = b;
                }
            }
        }

        spans.push(Span {
            start,
            end,
            tokens: tok(start, end),
            oversize: false,
        });
        prev_end = end;

        if end >= n {
            break;
        }

        // Seed the next chunk with tail messages totalling at most the
        // overlap target; always make progress past the previous start
        let mut next_start = end;
        while next_start > start + 1 && tok(next_start - 1, end) <= overlap_target {
            next_start -= 1;
        }
        start = next_start;
    }

    spans
}

/// Compute per-message counts, splitting over-budget messages into parts
/// (sharing the original id) when mid-message splits are allowed
pub(crate) fn prepare_messages(
    messages: &[NormalizedMessage],
    config: &ChunkingConfig,
    counter: &TokenCounter,
) -> (Vec<NormalizedMessage>, Vec<usize>) {
    let count = |m: &NormalizedMessage| {
        counter
            .count_message(m, config.token_count_method)
            .tokens
    };

    if config.preserve_message_boundaries {
        let counts = messages.iter().map(count).collect();
        return (messages.to_vec(), counts);
    }

    let max = config.max_tokens_per_chunk;
    let mut out = Vec::with_capacity(messages.len());
    let mut counts = Vec::with_capacity(messages.len());

    for message in messages {
        let tokens = count(message);
        if tokens <= max {
            out.push(message.clone());
            counts.push(tokens);
            continue;
        }

        for (part_index, part) in split_content(&message.content, max, config, counter)
            .into_iter()
            .enumerate()
        {
            let mut part_message = message.clone();
            part_message.content = part;
            part_message
                .raw_metadata
                .insert("part".to_string(), serde_json::Value::from(part_index));
            let part_tokens = count(&part_message);
            out.push(part_message);
            counts.push(part_tokens);
        }
    }

    (out, counts)
}

/// Split content into word-boundary pieces each under the token budget
fn split_content(
    content: &str,
    max: usize,
    config: &ChunkingConfig,
    counter: &TokenCounter,
) -> Vec<String> {
    let mut pieces = Vec::new();
    let mut current = String::new();
    let mut current_tokens = 0usize;

    for word in content.split_whitespace() {
        let word_tokens = counter.count(word, config.token_count_method).tokens + 1;
        if current_tokens + word_tokens > max && !current.is_empty() {
            pieces.push(std::mem::take(&mut current));
            current_tokens = 0;
        }
        if !current.is_empty() {
            current.push(' ');
        }
        current.push_str(word);
        current_tokens += word_tokens;
    }
    if !current.is_empty() {
        pieces.push(current);
    }
    if pieces.is_empty() {
        pieces.push(String::new());
    }
    pieces
}

/// Materialize spans into chunks with overlap bookkeeping
pub(crate) fn assemble_chunks(
    conv: &NormalizedConversation,
    messages: &[NormalizedMessage],
    counts: &[usize],
    spans: &[Span],
    strategy_name: &str,
    config: &ChunkingConfig,
) -> Vec<ConversationChunk> {
    let total = spans.len();
    let recorded = config.recorded_name(strategy_name);
    let now = Utc::now();

    let shared = |a: &Span, b: &Span| -> ChunkOverlap {
        if b.start < a.end {
            ChunkOverlap {
                messages: a.end - b.start,
                tokens: counts[b.start..a.end].iter().sum(),
            }
        } else {
            ChunkOverlap::default()
        }
    };

    spans
        .iter()
        .enumerate()
        .map(|(index, span)| {
            let overlap_with_previous = if index > 0 {
                shared(&spans[index - 1], span)
            } else {
                ChunkOverlap::default()
            };
            let overlap_with_next = if index + 1 < total {
                shared(span, &spans[index + 1])
            } else {
                ChunkOverlap::default()
            };

            ConversationChunk {
                id: format!("{}-chunk-{}", conv.id, index + 1),
                conversation_id: conv.id.clone(),
                sequence: index + 1,
                total_chunks: total,
                messages: messages[span.start..span.end].to_vec(),
                token_count: span.tokens,
                overlap_with_previous,
                overlap_with_next,
                metadata: ChunkMetadata {
                    start_index: span.start,
                    end_index: span.end.saturating_sub(1),
                    strategy: recorded.clone(),
                    oversize_message: span.oversize,
                    created_at: now,
                },
            }
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn config(max: usize, overlap: usize) -> ChunkingConfig {
        ChunkingConfig {
            max_tokens_per_chunk: max,
            overlap_tokens: Some(overlap),
            min_chunk_size: Some(1),
            ..Default::default()
        }
    }

    #[test]
    fn test_spans_cover_all_messages() {
        let counts = vec![30; 20];
        let spans = build_spans(&counts, &config(100, 0), &SplitPolicy::Greedy);

        assert_eq!(spans.first().unwrap().start, 0);
        assert_eq!(spans.last().unwrap().end, 20);
        for window in spans.windows(2) {
            // No gaps
            assert!(window[1].start <= window[0].end);
        }
        for span in &spans {
            assert!(span.tokens <= 100);
        }
        // 3 messages of 30 tokens fit per chunk
        assert!(spans.len() >= 7);
    }

    #[test]
    fn test_overlap_seeds_next_span() {
        let counts = vec![30; 6];
        let spans = build_spans(&counts, &config(100, 30), &SplitPolicy::Greedy);

        for window in spans.windows(2) {
            let shared = window[0].end - window[1].start;
            assert_eq!(shared, 1, "one 30-token message fits the overlap target");
        }
    }

    #[test]
    fn test_oversize_message_isolated_and_flagged() {
        let counts = vec![10, 250, 10];
        let spans = build_spans(&counts, &config(100, 0), &SplitPolicy::Greedy);

        assert_eq!(spans.len(), 3);
        assert!(!spans[0].oversize);
        assert!(spans[1].oversize);
        assert_eq!(spans[1].tokens, 250);
        assert_eq!((spans[1].start, spans[1].end), (1, 2));
    }

    #[test]
    fn test_turn_change_rewind() {
        use MessageRole::{Assistant, User};
        let roles = vec![User, Assistant, User, User, User];
        let counts = vec![30, 30, 30, 30, 30];
        // Budget forces a stop at index 3; the latest turn change is index 2
        let spans = build_spans(
            &counts,
            &config(100, 0),
            &SplitPolicy::TurnChange { roles: &roles },
        );
        assert_eq!(spans[0].end, 2);
    }

    #[test]
    fn test_boundary_policy_splits_early() {
        let mut set = HashSet::new();
        set.insert(2);
        let counts = vec![30, 30, 30, 30];
        let spans = build_spans(&counts, &config(200, 0), &SplitPolicy::Boundaries { set: &set });

        assert_eq!(spans[0].end, 2);
        assert_eq!(spans[1].start, 2);
    }

    #[test]
    fn test_single_message() {
        let counts = vec![42];
        let spans = build_spans(&counts, &config(100, 10), &SplitPolicy::Greedy);
        assert_eq!(spans.len(), 1);
        assert_eq!(spans[0], Span { start: 0, end: 1, tokens: 42, oversize: false });
    }

    #[test]
    fn test_split_content_stays_under_budget() {
        let counter = TokenCounter::default();
        let config = ChunkingConfig {
            max_tokens_per_chunk: 20,
            preserve_message_boundaries: false,
            ..Default::default()
        };
        let content = "alpha beta gamma delta ".repeat(30);
        let pieces = split_content(&content, 20, &config, &counter);

        assert!(pieces.len() > 1);
        for piece in &pieces {
            let tokens = counter.count(piece, config.token_count_method).tokens;
            assert!(tokens <= 20, "piece of {tokens} tokens exceeds budget");
        }
        // No content lost
        let rejoined: Vec<&str> = pieces.iter().flat_map(|p| p.split_whitespace()).collect();
        let original: Vec<&str> = content.split_whitespace().collect();
        assert_eq!(rejoined, original);
    }
}
