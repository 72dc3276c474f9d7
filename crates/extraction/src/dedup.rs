//! Cross-chunk deduplication and relationship merging
//!
//! Near-duplicate memories from overlapping chunks collapse into one
//! canonical memory; relationships are rewritten onto surviving ids and
//! deduplicated per `(from, to, type)` edge. Deduplication is deterministic
//! given input order, and similarity ties break toward the earlier-scanned
//! member.

use std::collections::{BTreeSet, HashMap};

use uuid::Uuid;

use mnemon_config::constants::retrieval as retrieval_constants;
use mnemon_core::{ExtractedMemory, ExtractedRelationship};

use crate::types::ChunkExtractionResult;

/// Similarity assigned to entities whose normalized names and types match
/// but whose content is phrased differently; identity dominates phrasing
const ENTITY_IDENTITY_MATCH_SCORE: f64 = 0.9;

#[derive(Debug, Clone)]
pub struct DeduplicatorConfig {
    /// Similarity at or above which two memories are duplicates
    pub similarity_threshold: f64,
    /// Permit `(a, a)` relationship edges
    pub allow_self_loops: bool,
}

impl Default for DeduplicatorConfig {
    fn default() -> Self {
        Self {
            similarity_threshold: retrieval_constants::SIMILARITY_THRESHOLD,
            allow_self_loops: false,
        }
    }
}

/// One merge performed during deduplication
#[derive(Debug, Clone)]
pub struct MergeRecord {
    pub canonical_id: String,
    /// Ids of every member absorbed into the canonical memory
    pub merged_ids: Vec<String>,
}

#[derive(Debug, Clone)]
pub struct DeduplicationResult {
    pub unique_memories: Vec<ExtractedMemory>,
    pub duplicates_found: usize,
    pub merged_memories: Vec<MergeRecord>,
}

/// Collapses near-duplicate memories across chunk results
#[derive(Debug, Clone, Default)]
pub struct ChunkDeduplicator {
    config: DeduplicatorConfig,
}

impl ChunkDeduplicator {
    pub fn new(config: DeduplicatorConfig) -> Self {
        Self { config }
    }

    /// Deduplicate memories from successful chunks and merge their
    /// relationships onto surviving ids
    pub fn deduplicate_chunks(
        &self,
        chunk_results: &[ChunkExtractionResult],
    ) -> (DeduplicationResult, Vec<ExtractedRelationship>) {
        let successful: Vec<&ChunkExtractionResult> = chunk_results
            .iter()
            .filter(|c| c.is_success())
            .collect();

        let memories: Vec<ExtractedMemory> = successful
            .iter()
            .flat_map(|c| c.memories.iter().cloned())
            .collect();
        let result = self.deduplicate(memories);

        let resolved: Vec<ExtractedRelationship> = successful
            .iter()
            .flat_map(|c| resolve_temp_endpoints(&c.memories, c.relationships.clone()))
            .collect();
        let relationships = self.merge_relationships(&result.unique_memories, resolved);

        (result, relationships)
    }

    /// Deduplicate a flat memory list (already gathered and ordered)
    pub fn deduplicate(&self, memories: Vec<ExtractedMemory>) -> DeduplicationResult {
        // Greedy clustering in scan order; similarity is zero across types
        // and workspaces, so one pass handles the implicit grouping
        let mut clusters: Vec<Vec<ExtractedMemory>> = Vec::new();
        for memory in memories {
            let position = clusters.iter().position(|cluster| {
                cluster
                    .iter()
                    .any(|member| self.similarity(member, &memory) >= self.config.similarity_threshold)
            });
            match position {
                Some(index) => clusters[index].push(memory),
                None => clusters.push(vec![memory]),
            }
        }

        let mut unique_memories = Vec::with_capacity(clusters.len());
        let mut merged_memories = Vec::new();
        let mut duplicates_found = 0;

        for cluster in clusters {
            if cluster.len() == 1 {
                unique_memories.push(cluster.into_iter().next().expect("non-empty cluster"));
                continue;
            }

            duplicates_found += cluster.len() - 1;
            let merged = merge_cluster(&cluster);
            tracing::debug!(
                canonical = %merged.id,
                absorbed = cluster.len(),
                memory_type = %merged.memory_type,
                "merged duplicate memories"
            );
            merged_memories.push(MergeRecord {
                canonical_id: merged.id.clone(),
                merged_ids: merged.merged_from.clone(),
            });
            unique_memories.push(merged);
        }

        DeduplicationResult {
            unique_memories,
            duplicates_found,
            merged_memories,
        }
    }

    /// Content similarity in [0, 1]
    ///
    /// Zero across types or workspaces. Exact normalized content matches are
    /// 1.0, except entities whose identity (`metadata.entity_type` +
    /// normalized `metadata.name`) differs, which score 0.7. Entities whose
    /// identity matches score at least 0.9 even when phrased differently.
    /// Everything else falls back to a Levenshtein ratio.
    pub fn similarity(&self, a: &ExtractedMemory, b: &ExtractedMemory) -> f64 {
        if a.memory_type != b.memory_type || a.workspace_id != b.workspace_id {
            return 0.0;
        }

        let content_a = normalize(&a.content);
        let content_b = normalize(&b.content);
        let is_entity = a.memory_type.root() == "entity";

        if content_a == content_b {
            if is_entity && !entity_identity_matches(a, b) {
                return retrieval_constants::ENTITY_IDENTITY_MISMATCH_SCORE;
            }
            return 1.0;
        }

        let ratio = levenshtein_ratio(&content_a, &content_b);
        if is_entity && entity_identity_matches(a, b) {
            return ratio.max(ENTITY_IDENTITY_MATCH_SCORE);
        }
        ratio
    }

    /// Rewrite relationship endpoints onto surviving memory ids, drop edges
    /// with dead endpoints, and keep the highest confidence per
    /// `(from, to, type)`
    pub fn merge_relationships(
        &self,
        unique_memories: &[ExtractedMemory],
        relationships: Vec<ExtractedRelationship>,
    ) -> Vec<ExtractedRelationship> {
        let mut survivor: HashMap<&str, &str> = HashMap::new();
        for memory in unique_memories {
            survivor.insert(&memory.id, &memory.id);
            for absorbed in &memory.merged_from {
                survivor.insert(absorbed, &memory.id);
            }
        }

        let mut order: Vec<(String, String, String)> = Vec::new();
        let mut best: HashMap<(String, String, String), ExtractedRelationship> = HashMap::new();

        for mut rel in relationships {
            let Some(&from) = survivor.get(rel.from_memory_id.as_str()) else {
                continue;
            };
            let Some(&to) = survivor.get(rel.to_memory_id.as_str()) else {
                continue;
            };
            if from == to && !self.config.allow_self_loops {
                continue;
            }

            rel.from_memory_id = from.to_string();
            rel.to_memory_id = to.to_string();
            let key = rel.key();

            match best.get_mut(&key) {
                Some(existing) => {
                    if rel.confidence > existing.confidence {
                        *existing = rel;
                    }
                }
                None => {
                    order.push(key.clone());
                    best.insert(key, rel);
                }
            }
        }

        order
            .into_iter()
            .map(|key| best.remove(&key).expect("tracked key"))
            .collect()
    }
}

/// Resolve `temp_{index}` endpoints against a chunk's own memory list;
/// unresolvable references drop the relationship
pub fn resolve_temp_endpoints(
    memories: &[ExtractedMemory],
    relationships: Vec<ExtractedRelationship>,
) -> Vec<ExtractedRelationship> {
    relationships
        .into_iter()
        .filter_map(|mut rel| {
            rel.from_memory_id = resolve_endpoint(&rel.from_memory_id, memories)?;
            rel.to_memory_id = resolve_endpoint(&rel.to_memory_id, memories)?;
            Some(rel)
        })
        .collect()
}

fn resolve_endpoint(id: &str, memories: &[ExtractedMemory]) -> Option<String> {
    match id.strip_prefix("temp_") {
        Some(index) => {
            let index: usize = index.parse().ok()?;
            memories.get(index).map(|m| m.id.clone())
        }
        None => Some(id.to_string()),
    }
}

/// Merge a duplicate cluster into one canonical memory
fn merge_cluster(members: &[ExtractedMemory]) -> ExtractedMemory {
    // Highest confidence wins the base; ties keep the earlier-scanned member
    let base = members
        .iter()
        .reduce(|best, candidate| {
            if candidate.confidence > best.confidence {
                candidate
            } else {
                best
            }
        })
        .expect("non-empty cluster");

    let mut merged = base.clone();
    merged.id = Uuid::new_v4().to_string();
    merged.merged_from = members.iter().map(|m| m.id.clone()).collect();

    let message_ids: BTreeSet<String> = members
        .iter()
        .flat_map(|m| m.source_message_ids.iter().cloned())
        .collect();
    merged.source_message_ids = message_ids.into_iter().collect();

    let chunks: BTreeSet<String> = members
        .iter()
        .flat_map(|m| m.source_chunks.iter().cloned())
        .collect();
    merged.source_chunks = chunks.into_iter().collect();

    merged.chunk_confidence = members
        .iter()
        .flat_map(|m| m.chunk_confidence.iter().copied())
        .collect();

    // Fill metadata holes from the other members, in scan order
    for member in members {
        for (key, value) in &member.metadata {
            let missing = merged
                .metadata
                .get(key)
                .map_or(true, |existing| existing.is_null());
            if missing && !value.is_null() {
                merged.metadata.insert(key.clone(), value.clone());
            }
        }
    }

    merged.created_at = members
        .iter()
        .map(|m| m.created_at)
        .min()
        .expect("non-empty cluster");

    merged
}

/// lowercase -> trim -> collapse whitespace
fn normalize(content: &str) -> String {
    content
        .to_lowercase()
        .split_whitespace()
        .collect::<Vec<_>>()
        .join(" ")
}

fn entity_identity_matches(a: &ExtractedMemory, b: &ExtractedMemory) -> bool {
    let field = |m: &ExtractedMemory, key: &str| -> Option<String> {
        m.metadata
            .get(key)
            .and_then(|v| v.as_str())
            .map(normalize)
    };
    match (
        field(a, "entity_type"),
        field(b, "entity_type"),
        field(a, "name"),
        field(b, "name"),
    ) {
        (Some(type_a), Some(type_b), Some(name_a), Some(name_b)) => {
            type_a == type_b && name_a == name_b
        }
        _ => false,
    }
}

fn levenshtein_ratio(a: &str, b: &str) -> f64 {
    let len_a = a.chars().count();
    let len_b = b.chars().count();
    let max_len = len_a.max(len_b);
    if max_len == 0 {
        return 1.0;
    }
    1.0 - levenshtein(a, b) as f64 / max_len as f64
}

/// Classic two-row Levenshtein over chars
fn levenshtein(a: &str, b: &str) -> usize {
    let a: Vec<char> = a.chars().collect();
    let b: Vec<char> = b.chars().collect();
    if a.is_empty() {
        return b.len();
    }
    if b.is_empty() {
        return a.len();
    }

    let mut previous: Vec<usize> = (0..=b.len()).collect();
    let mut current = vec![0usize; b.len() + 1];

    for (i, &char_a) in a.iter().enumerate() {
        current[0] = i + 1;
        for (j, &char_b) in b.iter().enumerate() {
            let substitution = previous[j] + usize::from(char_a != char_b);
            current[j + 1] = substitution
                .min(previous[j + 1] + 1)
                .min(current[j] + 1);
        }
        std::mem::swap(&mut previous, &mut current);
    }
    previous[b.len()]
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::ChunkStatus;
    use mnemon_core::{MemoryType, RelationshipType};
    use serde_json::json;

    fn memory(
        memory_type: &str,
        content: &str,
        confidence: f32,
        chunk: &str,
    ) -> ExtractedMemory {
        let mut m = ExtractedMemory::new("ws-1", "conv-1", MemoryType::new(memory_type), content, confidence);
        m.source_chunks = vec![chunk.to_string()];
        m.chunk_confidence = vec![confidence];
        m
    }

    fn chunk_result(
        chunk_id: &str,
        sequence: usize,
        memories: Vec<ExtractedMemory>,
        relationships: Vec<ExtractedRelationship>,
    ) -> ChunkExtractionResult {
        ChunkExtractionResult {
            chunk_id: chunk_id.to_string(),
            sequence,
            status: ChunkStatus::Success,
            memories,
            relationships,
        }
    }

    #[test]
    fn test_levenshtein_basics() {
        assert_eq!(levenshtein("kitten", "sitting"), 3);
        assert_eq!(levenshtein("", "abc"), 3);
        assert_eq!(levenshtein("same", "same"), 0);
    }

    #[test]
    fn test_similarity_across_types_is_zero() {
        let dedup = ChunkDeduplicator::default();
        let a = memory("fact", "same content", 0.9, "c1");
        let b = memory("decision", "same content", 0.9, "c1");
        assert_eq!(dedup.similarity(&a, &b), 0.0);
    }

    #[test]
    fn test_similarity_across_workspaces_is_zero() {
        let dedup = ChunkDeduplicator::default();
        let a = memory("fact", "same content", 0.9, "c1");
        let mut b = memory("fact", "same content", 0.9, "c1");
        b.workspace_id = "ws-2".to_string();
        assert_eq!(dedup.similarity(&a, &b), 0.0);
    }

    #[test]
    fn test_exact_match_after_normalization() {
        let dedup = ChunkDeduplicator::default();
        let a = memory("fact", "The  Deploy   happens on Fridays ", 0.9, "c1");
        let b = memory("fact", "the deploy happens on fridays", 0.8, "c2");
        assert_eq!(dedup.similarity(&a, &b), 1.0);
    }

    #[test]
    fn test_entity_identity_mismatch_scores_point_seven() {
        let dedup = ChunkDeduplicator::default();
        let mut a = memory("entity", "Mercury", 0.9, "c1");
        a.metadata.insert("entity_type".to_string(), json!("planet"));
        a.metadata.insert("name".to_string(), json!("Mercury"));
        let mut b = memory("entity", "Mercury", 0.9, "c2");
        b.metadata.insert("entity_type".to_string(), json!("element"));
        b.metadata.insert("name".to_string(), json!("Mercury"));

        assert_eq!(dedup.similarity(&a, &b), 0.7);
    }

    #[test]
    fn test_near_duplicate_contents_cluster() {
        let dedup = ChunkDeduplicator::default();
        let a = memory("fact", "the deploy happens on fridays", 0.9, "c1");
        let b = memory("fact", "the deploy happens on friday", 0.8, "c2");
        assert!(dedup.similarity(&a, &b) >= 0.85);
    }

    #[test]
    fn test_readme_entities_merge() {
        // Same file entity, differently phrased content
        let mut a = memory(
            "entity.file",
            "README.md contains project setup instructions",
            0.9,
            "c1",
        );
        a.metadata.insert("entity_type".to_string(), json!("file"));
        a.metadata.insert("name".to_string(), json!("README.md"));
        let mut b = memory(
            "entity.file",
            "README.md has setup instructions for the project",
            0.8,
            "c2",
        );
        b.metadata.insert("entity_type".to_string(), json!("file"));
        b.metadata.insert("name".to_string(), json!("README.md"));

        let dedup = ChunkDeduplicator::default();
        assert!(dedup.similarity(&a, &b) >= 0.85);

        let result = dedup.deduplicate(vec![a, b]);
        assert_eq!(result.unique_memories.len(), 1);
        assert_eq!(result.duplicates_found, 1);
        assert_eq!(result.unique_memories[0].merged_from.len(), 2);
    }

    #[test]
    fn test_merge_takes_highest_confidence_base() {
        let dedup = ChunkDeduplicator::default();
        let mut low = memory("fact", "user prefers dark mode", 0.6, "c1");
        low.metadata.insert("category".to_string(), json!("ui"));
        low.created_at = low.created_at - chrono::Duration::hours(1);
        let early_created = low.created_at;
        let high = memory("fact", "user prefers dark mode", 0.95, "c2");

        let result = dedup.deduplicate(vec![low.clone(), high.clone()]);
        assert_eq!(result.unique_memories.len(), 1);

        let merged = &result.unique_memories[0];
        assert_eq!(merged.confidence, 0.95);
        // Metadata holes on the base are filled from other members
        assert_eq!(merged.metadata["category"], json!("ui"));
        // created_at is the earliest across members
        assert_eq!(merged.created_at, early_created);
        assert_eq!(merged.source_chunks, vec!["c1", "c2"]);
        assert_eq!(merged.chunk_confidence.len(), 2);
        assert!(merged.merged_from.contains(&low.id));
        assert!(merged.merged_from.contains(&high.id));
    }

    #[test]
    fn test_dedup_idempotence() {
        let dedup = ChunkDeduplicator::default();
        let memories = vec![
            memory("fact", "user prefers dark mode", 0.9, "c1"),
            memory("fact", "user prefers dark mode", 0.8, "c2"),
            memory("fact", "the standup is at ten", 0.7, "c2"),
        ];

        let first = dedup.deduplicate(memories);
        let second = dedup.deduplicate(first.unique_memories.clone());

        assert_eq!(second.duplicates_found, 0);
        let contents = |memories: &[ExtractedMemory]| {
            let mut c: Vec<String> = memories.iter().map(|m| m.content.clone()).collect();
            c.sort();
            c
        };
        assert_eq!(contents(&first.unique_memories), contents(&second.unique_memories));
    }

    #[test]
    fn test_chunk_pipeline_rewrites_relationships() {
        let dedup = ChunkDeduplicator::default();

        let a1 = memory("fact", "dana owns the billing service", 0.9, "c1");
        let e1 = memory("entity", "Dana", 0.8, "c1");
        let rel1 = ExtractedRelationship::new(
            "temp_0",
            "temp_1",
            RelationshipType::new("mentions"),
            0.7,
        );

        // Second chunk re-extracts the same fact plus the relationship
        let a2 = memory("fact", "dana owns the billing service", 0.85, "c2");
        let e2 = memory("entity", "Dana", 0.75, "c2");
        let rel2 = ExtractedRelationship::new(
            "temp_0",
            "temp_1",
            RelationshipType::new("mentions"),
            0.9,
        );

        let chunks = vec![
            chunk_result("c1", 1, vec![a1, e1], vec![rel1]),
            chunk_result("c2", 2, vec![a2, e2], vec![rel2]),
        ];

        let (result, relationships) = dedup.deduplicate_chunks(&chunks);
        assert_eq!(result.unique_memories.len(), 2);
        assert_eq!(result.duplicates_found, 2);

        // Both chunk edges collapse onto the canonical pair, keeping the
        // higher confidence
        assert_eq!(relationships.len(), 1);
        assert_eq!(relationships[0].confidence, 0.9);

        // Relationship closure: endpoints resolve to live output ids
        let live: Vec<&str> = result.unique_memories.iter().map(|m| m.id.as_str()).collect();
        assert!(live.contains(&relationships[0].from_memory_id.as_str()));
        assert!(live.contains(&relationships[0].to_memory_id.as_str()));
    }

    #[test]
    fn test_failed_chunks_excluded() {
        let dedup = ChunkDeduplicator::default();
        let good = chunk_result(
            "c1",
            1,
            vec![memory("fact", "kept", 0.9, "c1")],
            Vec::new(),
        );
        let bad = ChunkExtractionResult::failed("c2", 2, "llm exploded");

        let (result, _) = dedup.deduplicate_chunks(&[good, bad]);
        assert_eq!(result.unique_memories.len(), 1);
        assert_eq!(result.unique_memories[0].content, "kept");
    }

    #[test]
    fn test_self_loops_dropped_by_default() {
        let dedup = ChunkDeduplicator::default();
        let m = memory("fact", "solo", 0.9, "c1");
        let rel =
            ExtractedRelationship::new(m.id.clone(), m.id.clone(), RelationshipType::related_to(), 0.5);

        let merged = dedup.merge_relationships(&[m], vec![rel]);
        assert!(merged.is_empty());
    }

    #[test]
    fn test_dead_endpoints_dropped() {
        let dedup = ChunkDeduplicator::default();
        let m = memory("fact", "alive", 0.9, "c1");
        let rel = ExtractedRelationship::new(
            m.id.clone(),
            "no-such-memory",
            RelationshipType::related_to(),
            0.5,
        );

        let merged = dedup.merge_relationships(&[m], vec![rel]);
        assert!(merged.is_empty());
    }
}
