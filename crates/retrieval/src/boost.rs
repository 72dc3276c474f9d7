//! Retrieval-time filtering and score boosting

use mnemon_core::ScoredMemory;

/// Drop request/response echoes (`fact.command`, `fact.response`) from a
/// candidate set; they restate the conversation rather than inform it
pub fn filter_conversational(memories: Vec<ScoredMemory>) -> Vec<ScoredMemory> {
    memories
        .into_iter()
        .filter(|m| {
            let t = &m.memory.memory_type;
            !t.starts_with("fact.command") && !t.starts_with("fact.response")
        })
        .collect()
}

/// Multiply `fact` scores by the boost factor and re-sort descending.
///
/// Explicit statements beat file-metadata hits at equal raw score; the sort
/// is stable so equal boosted scores keep their retrieval order.
pub fn boost_scores(mut memories: Vec<ScoredMemory>, fact_boost: f32) -> Vec<ScoredMemory> {
    for scored in &mut memories {
        if scored.memory.memory_type.root() == "fact" {
            scored.score *= fact_boost;
        }
    }
    memories.sort_by(|a, b| {
        b.score
            .partial_cmp(&a.score)
            .unwrap_or(std::cmp::Ordering::Equal)
    });
    memories
}
