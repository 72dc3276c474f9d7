//! Extracted memory and relationship types
//!
//! Memories are durable facts, entities, or decisions distilled from a
//! conversation. Relationships are typed directed edges between memories,
//! stored as `(from, to, type)` rows and resolved at query time; memory
//! objects never hold pointers to each other.

use std::collections::HashMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Dot-namespaced memory type, e.g. `fact`, `entity.file`, `fact.command`.
///
/// The set is open: built-in roots are `entity`, `fact`, and `decision`, and
/// custom types can be registered at runtime, so this is a newtype over a
/// lowercase string rather than a closed enum.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct MemoryType(String);

impl MemoryType {
    pub const BUILTIN_ROOTS: [&'static str; 3] = ["entity", "fact", "decision"];

    pub fn new(name: impl Into<String>) -> Self {
        Self(name.into().to_lowercase())
    }

    pub fn entity() -> Self {
        Self("entity".to_string())
    }

    pub fn fact() -> Self {
        Self("fact".to_string())
    }

    pub fn decision() -> Self {
        Self("decision".to_string())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// The namespace root, i.e. everything before the first `.`
    pub fn root(&self) -> &str {
        self.0.split('.').next().unwrap_or(&self.0)
    }

    pub fn starts_with(&self, prefix: &str) -> bool {
        self.0.starts_with(prefix)
    }

    pub fn is_builtin_root(&self) -> bool {
        Self::BUILTIN_ROOTS.contains(&self.0.as_str())
    }
}

impl std::fmt::Display for MemoryType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for MemoryType {
    fn from(s: &str) -> Self {
        Self::new(s)
    }
}

/// Typed directed edge label between memories; open set with known built-ins
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RelationshipType(String);

impl RelationshipType {
    pub const KNOWN: [&'static str; 8] = [
        "works_at",
        "related_to",
        "depends_on",
        "mentions",
        "part_of",
        "created_by",
        "contains",
        "has_email",
    ];

    pub fn new(name: impl Into<String>) -> Self {
        Self(name.into().to_lowercase())
    }

    pub fn related_to() -> Self {
        Self("related_to".to_string())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for RelationshipType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for RelationshipType {
    fn from(s: &str) -> Self {
        Self::new(s)
    }
}

/// A durable memory extracted from a conversation
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExtractedMemory {
    pub id: String,
    /// Owning workspace; all retrieval is workspace-scoped
    pub workspace_id: String,
    pub conversation_id: String,
    #[serde(rename = "type")]
    pub memory_type: MemoryType,
    pub content: String,
    /// Extraction confidence in [0, 1]
    pub confidence: f32,
    #[serde(default)]
    pub metadata: HashMap<String, serde_json::Value>,
    /// Fixed-dimension embedding vector, when computed
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub embedding: Option<Vec<f32>>,
    /// Sorted, deduplicated ids of the messages this memory was drawn from
    #[serde(default)]
    pub source_message_ids: Vec<String>,
    /// Sorted ids of the chunks this memory was drawn from
    #[serde(default)]
    pub source_chunks: Vec<String>,
    /// Per-source-chunk confidence history, in merge order
    #[serde(default)]
    pub chunk_confidence: Vec<f32>,
    /// Ids absorbed into this memory by deduplication; immutable once set
    #[serde(default)]
    pub merged_from: Vec<String>,
    pub created_at: DateTime<Utc>,
}

impl ExtractedMemory {
    pub fn new(
        workspace_id: impl Into<String>,
        conversation_id: impl Into<String>,
        memory_type: MemoryType,
        content: impl Into<String>,
        confidence: f32,
    ) -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            workspace_id: workspace_id.into(),
            conversation_id: conversation_id.into(),
            memory_type,
            content: content.into(),
            confidence: confidence.clamp(0.0, 1.0),
            metadata: HashMap::new(),
            embedding: None,
            source_message_ids: Vec::new(),
            source_chunks: Vec::new(),
            chunk_confidence: Vec::new(),
            merged_from: Vec::new(),
            created_at: Utc::now(),
        }
    }

    /// Short single-line summary for context composition
    pub fn summary(&self) -> String {
        const MAX_SUMMARY_CHARS: usize = 200;
        let flat = self.content.split_whitespace().collect::<Vec<_>>().join(" ");
        if flat.chars().count() <= MAX_SUMMARY_CHARS {
            flat
        } else {
            let truncated: String = flat.chars().take(MAX_SUMMARY_CHARS).collect();
            format!("{}...", truncated.trim_end())
        }
    }
}

/// A typed directed edge between two memories
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExtractedRelationship {
    pub from_memory_id: String,
    pub to_memory_id: String,
    pub relationship_type: RelationshipType,
    pub confidence: f32,
    pub created_at: DateTime<Utc>,
}

impl ExtractedRelationship {
    pub fn new(
        from: impl Into<String>,
        to: impl Into<String>,
        relationship_type: RelationshipType,
        confidence: f32,
    ) -> Self {
        Self {
            from_memory_id: from.into(),
            to_memory_id: to.into(),
            relationship_type,
            confidence: confidence.clamp(0.0, 1.0),
            created_at: Utc::now(),
        }
    }

    /// Dedup key: at most one edge may exist per `(from, to, type)`
    pub fn key(&self) -> (String, String, String) {
        (
            self.from_memory_id.clone(),
            self.to_memory_id.clone(),
            self.relationship_type.as_str().to_string(),
        )
    }
}

/// A memory paired with a retrieval score
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScoredMemory {
    pub memory: ExtractedMemory,
    pub score: f32,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_memory_type_root() {
        assert_eq!(MemoryType::new("entity.file").root(), "entity");
        assert_eq!(MemoryType::new("fact").root(), "fact");
        assert!(MemoryType::new("fact.command").starts_with("fact.command"));
    }

    #[test]
    fn test_memory_type_normalizes_case() {
        assert_eq!(MemoryType::new("Entity.File").as_str(), "entity.file");
    }

    #[test]
    fn test_confidence_clamped() {
        let mem = ExtractedMemory::new("ws", "conv", MemoryType::fact(), "x", 1.7);
        assert_eq!(mem.confidence, 1.0);
        let rel = ExtractedRelationship::new("a", "b", RelationshipType::related_to(), -0.2);
        assert_eq!(rel.confidence, 0.0);
    }

    #[test]
    fn test_summary_truncates_at_char_boundary() {
        let long = "word ".repeat(100);
        let mem = ExtractedMemory::new("ws", "conv", MemoryType::fact(), long, 0.9);
        let summary = mem.summary();
        assert!(summary.ends_with("..."));
        assert!(summary.chars().count() <= 203);
    }

    #[test]
    fn test_memory_type_serde_transparent() {
        let t = MemoryType::new("entity.file");
        assert_eq!(serde_json::to_string(&t).unwrap(), "\"entity.file\"");
    }
}
