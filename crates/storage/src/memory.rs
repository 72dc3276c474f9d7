//! In-memory store

use std::collections::HashMap;

use async_trait::async_trait;
use parking_lot::RwLock;
use uuid::Uuid;

use mnemon_core::{
    CommandRequest, CommandResponse, Error, ExtractedMemory, ExtractedRelationship,
    MemoryReference, Result, ScoredMemory, SearchQuery, StorageClient,
};

#[derive(Debug, Clone)]
struct WorkspaceRow {
    #[allow(dead_code)]
    user_id: String,
    #[allow(dead_code)]
    name: String,
}

#[derive(Debug, Clone)]
struct MemoryRow {
    memory: ExtractedMemory,
    is_active: bool,
}

#[derive(Debug, Clone)]
struct CommandRow {
    request: CommandRequest,
    response: CommandResponse,
    memories: Vec<MemoryReference>,
}

#[derive(Default)]
struct Inner {
    users: HashMap<String, String>,
    workspaces: HashMap<String, WorkspaceRow>,
    memories: HashMap<String, MemoryRow>,
    /// Insertion order, newest last; recency queries walk it backwards
    memory_order: Vec<String>,
    relationships: HashMap<(String, String, String), ExtractedRelationship>,
    commands: Vec<CommandRow>,
}

/// Thread-safe in-memory storage
pub struct InMemoryStorage {
    inner: RwLock<Inner>,
    embedding_dimension: usize,
}

impl InMemoryStorage {
    pub fn new(embedding_dimension: usize) -> Self {
        Self {
            inner: RwLock::new(Inner::default()),
            embedding_dimension,
        }
    }

    pub fn memory_count(&self) -> usize {
        self.inner.read().memories.len()
    }

    pub fn relationship_count(&self) -> usize {
        self.inner.read().relationships.len()
    }

    pub fn command_count(&self) -> usize {
        self.inner.read().commands.len()
    }

    pub fn get_memory(&self, id: &str) -> Option<ExtractedMemory> {
        self.inner.read().memories.get(id).map(|r| r.memory.clone())
    }

    pub fn is_active(&self, id: &str) -> Option<bool> {
        self.inner.read().memories.get(id).map(|r| r.is_active)
    }

    pub fn relationships(&self) -> Vec<ExtractedRelationship> {
        self.inner.read().relationships.values().cloned().collect()
    }

    fn active_in_workspace<'a>(
        inner: &'a Inner,
        workspace_id: &str,
    ) -> impl Iterator<Item = &'a MemoryRow> + 'a {
        let workspace_id = workspace_id.to_string();
        inner
            .memory_order
            .iter()
            .filter_map(move |id| inner.memories.get(id))
            .filter(move |row| row.is_active && row.memory.workspace_id == workspace_id)
    }
}

#[async_trait]
impl StorageClient for InMemoryStorage {
    async fn create_user(&self, name: &str) -> Result<String> {
        let id = Uuid::new_v4().to_string();
        self.inner.write().users.insert(id.clone(), name.to_string());
        Ok(id)
    }

    async fn create_workspace(&self, user_id: &str, name: &str) -> Result<String> {
        let mut inner = self.inner.write();
        if !inner.users.contains_key(user_id) {
            return Err(Error::Validation(format!("unknown user '{user_id}'")));
        }
        let id = Uuid::new_v4().to_string();
        inner.workspaces.insert(
            id.clone(),
            WorkspaceRow {
                user_id: user_id.to_string(),
                name: name.to_string(),
            },
        );
        Ok(id)
    }

    async fn create_memory(&self, memory: ExtractedMemory) -> Result<ExtractedMemory> {
        if memory.content.trim().is_empty() {
            return Err(Error::Validation("memory content must be non-empty".to_string()));
        }
        if let Some(embedding) = &memory.embedding {
            if embedding.len() != self.embedding_dimension {
                return Err(Error::Validation(format!(
                    "embedding dimension {} does not match configured {}",
                    embedding.len(),
                    self.embedding_dimension
                )));
            }
        }

        let mut inner = self.inner.write();
        if !inner.workspaces.contains_key(&memory.workspace_id) {
            return Err(Error::Validation(format!(
                "unknown workspace '{}'",
                memory.workspace_id
            )));
        }

        inner.memory_order.push(memory.id.clone());
        inner.memories.insert(
            memory.id.clone(),
            MemoryRow {
                memory: memory.clone(),
                is_active: true,
            },
        );
        Ok(memory)
    }

    async fn search_memories(
        &self,
        workspace_id: &str,
        query: SearchQuery,
    ) -> Result<Vec<ScoredMemory>> {
        let inner = self.inner.read();

        let mut scored: Vec<ScoredMemory> = if let Some(vector) = &query.vector {
            Self::active_in_workspace(&inner, workspace_id)
                .filter_map(|row| {
                    let embedding = row.memory.embedding.as_ref()?;
                    let score = cosine(vector, embedding);
                    (score > 0.0).then(|| ScoredMemory {
                        memory: row.memory.clone(),
                        score,
                    })
                })
                .collect()
        } else if let Some(text) = &query.text {
            Self::active_in_workspace(&inner, workspace_id)
                .filter_map(|row| {
                    let score = keyword_score(text, &row.memory.content);
                    (score > 0.0).then(|| ScoredMemory {
                        memory: row.memory.clone(),
                        score,
                    })
                })
                .collect()
        } else {
            Vec::new()
        };

        scored.sort_by(|a, b| {
            b.score
                .partial_cmp(&a.score)
                .unwrap_or(std::cmp::Ordering::Equal)
        });
        scored.truncate(query.limit);
        Ok(scored)
    }

    async fn search_memories_text(
        &self,
        query: &str,
        workspace_id: &str,
        limit: usize,
    ) -> Result<Vec<ExtractedMemory>> {
        let results = self
            .search_memories(workspace_id, SearchQuery::text(query, limit))
            .await?;
        Ok(results.into_iter().map(|s| s.memory).collect())
    }

    async fn create_relationship(
        &self,
        relationship: ExtractedRelationship,
    ) -> Result<ExtractedRelationship> {
        let mut inner = self.inner.write();

        let endpoint_workspace = |id: &str| -> Option<String> {
            inner
                .memories
                .get(id)
                .filter(|row| row.is_active)
                .map(|row| row.memory.workspace_id.clone())
        };

        let from_ws = endpoint_workspace(&relationship.from_memory_id);
        let to_ws = endpoint_workspace(&relationship.to_memory_id);
        match (from_ws, to_ws) {
            (Some(from_ws), Some(to_ws)) if from_ws == to_ws => {}
            (Some(_), Some(_)) => {
                return Err(Error::Storage(
                    "relationship endpoints belong to different workspaces".to_string(),
                ));
            }
            _ => {
                // Warn-only for the caller: imports proceed past this
                tracing::warn!(
                    from = %relationship.from_memory_id,
                    to = %relationship.to_memory_id,
                    "relationship endpoint missing, skipping edge"
                );
                return Err(Error::Storage("relationship endpoint missing".to_string()));
            }
        }

        // One edge per (from, to, type); higher confidence wins
        let key = relationship.key();
        let stored = match inner.relationships.get(&key) {
            Some(existing) if existing.confidence >= relationship.confidence => existing.clone(),
            _ => {
                inner.relationships.insert(key, relationship.clone());
                relationship
            }
        };
        Ok(stored)
    }

    async fn deactivate_memories(&self, workspace_id: &str, ids: &[String]) -> Result<()> {
        let mut inner = self.inner.write();
        for id in ids {
            if let Some(row) = inner.memories.get_mut(id) {
                if row.memory.workspace_id == workspace_id {
                    row.is_active = false;
                }
            }
        }
        // Orphan sweep: edges touching a deactivated memory go with it
        let Inner {
            memories,
            relationships,
            ..
        } = &mut *inner;
        relationships.retain(|_, rel| {
            let alive = |id: &str| memories.get(id).is_some_and(|row| row.is_active);
            alive(&rel.from_memory_id) && alive(&rel.to_memory_id)
        });
        Ok(())
    }

    async fn get_recent_files(
        &self,
        workspace_id: &str,
        limit: usize,
    ) -> Result<Vec<ExtractedMemory>> {
        let inner = self.inner.read();
        Ok(Self::active_in_workspace(&inner, workspace_id)
            .filter(|row| row.memory.memory_type.starts_with("entity.file"))
            .map(|row| row.memory.clone())
            .collect::<Vec<_>>()
            .into_iter()
            .rev()
            .take(limit)
            .collect())
    }

    async fn get_recent_non_screen_memories(
        &self,
        workspace_id: &str,
        limit: usize,
    ) -> Result<Vec<ExtractedMemory>> {
        let inner = self.inner.read();
        Ok(Self::active_in_workspace(&inner, workspace_id)
            .filter(|row| !row.memory.memory_type.starts_with("context.screen"))
            .map(|row| row.memory.clone())
            .collect::<Vec<_>>()
            .into_iter()
            .rev()
            .take(limit)
            .collect())
    }

    async fn save_command(
        &self,
        request: &CommandRequest,
        response: &CommandResponse,
        memories: &[MemoryReference],
    ) -> Result<()> {
        self.inner.write().commands.push(CommandRow {
            request: request.clone(),
            response: response.clone(),
            memories: memories.to_vec(),
        });
        Ok(())
    }
}

fn cosine(a: &[f32], b: &[f32]) -> f32 {
    if a.len() != b.len() {
        return 0.0;
    }
    let dot: f32 = a.iter().zip(b).map(|(x, y)| x * y).sum();
    let norm_a: f32 = a.iter().map(|v| v * v).sum::<f32>().sqrt();
    let norm_b: f32 = b.iter().map(|v| v * v).sum::<f32>().sqrt();
    if norm_a == 0.0 || norm_b == 0.0 {
        return 0.0;
    }
    dot / (norm_a * norm_b)
}

/// Fraction of query words found in the content
fn keyword_score(query: &str, content: &str) -> f32 {
    let content = content.to_lowercase();
    let words: Vec<&str> = query
        .split_whitespace()
        .filter(|w| w.len() > 2)
        .collect();
    if words.is_empty() {
        return 0.0;
    }
    let hits = words
        .iter()
        .filter(|w| content.contains(&w.to_lowercase()))
        .count();
    hits as f32 / words.len() as f32
}

#[cfg(test)]
mod tests {
    use super::*;
    use mnemon_core::{MemoryType, RelationshipType};

    async fn workspace(storage: &InMemoryStorage) -> String {
        let user = storage.create_user("tester").await.unwrap();
        storage.create_workspace(&user, "main").await.unwrap()
    }

    fn memory(workspace_id: &str, memory_type: &str, content: &str) -> ExtractedMemory {
        ExtractedMemory::new(workspace_id, "conv-1", MemoryType::new(memory_type), content, 0.9)
    }

    #[tokio::test]
    async fn test_create_memory_requires_workspace() {
        let storage = InMemoryStorage::new(4);
        let result = storage.create_memory(memory("nope", "fact", "x")).await;
        assert!(matches!(result, Err(Error::Validation(_))));
    }

    #[tokio::test]
    async fn test_embedding_dimension_enforced() {
        let storage = InMemoryStorage::new(4);
        let ws = workspace(&storage).await;
        let mut m = memory(&ws, "fact", "x");
        m.embedding = Some(vec![0.1; 3]);
        assert!(matches!(
            storage.create_memory(m).await,
            Err(Error::Validation(_))
        ));
    }

    #[tokio::test]
    async fn test_vector_search_ranks_by_cosine() {
        let storage = InMemoryStorage::new(4);
        let ws = workspace(&storage).await;

        let mut close = memory(&ws, "fact", "close");
        close.embedding = Some(vec![1.0, 0.0, 0.0, 0.0]);
        storage.create_memory(close).await.unwrap();

        let mut far = memory(&ws, "fact", "far");
        far.embedding = Some(vec![0.0, 1.0, 0.0, 0.0]);
        storage.create_memory(far).await.unwrap();

        let results = storage
            .search_memories(&ws, SearchQuery::vector(vec![0.9, 0.1, 0.0, 0.0], 10))
            .await
            .unwrap();
        assert_eq!(results[0].memory.content, "close");
    }

    #[tokio::test]
    async fn test_search_is_workspace_scoped() {
        let storage = InMemoryStorage::new(4);
        let ws_a = workspace(&storage).await;
        let ws_b = workspace(&storage).await;

        storage
            .create_memory(memory(&ws_a, "fact", "alpha secret"))
            .await
            .unwrap();

        let results = storage.search_memories_text("secret", &ws_b, 10).await.unwrap();
        assert!(results.is_empty());
    }

    #[tokio::test]
    async fn test_relationship_requires_live_endpoints() {
        let storage = InMemoryStorage::new(4);
        let ws = workspace(&storage).await;
        let a = storage.create_memory(memory(&ws, "fact", "a")).await.unwrap();

        let rel = ExtractedRelationship::new(
            a.id.clone(),
            "ghost",
            RelationshipType::related_to(),
            0.5,
        );
        assert!(storage.create_relationship(rel).await.is_err());
    }

    #[tokio::test]
    async fn test_relationship_upsert_keeps_max_confidence() {
        let storage = InMemoryStorage::new(4);
        let ws = workspace(&storage).await;
        let a = storage.create_memory(memory(&ws, "fact", "a")).await.unwrap();
        let b = storage.create_memory(memory(&ws, "entity", "b")).await.unwrap();

        let low = ExtractedRelationship::new(
            a.id.clone(),
            b.id.clone(),
            RelationshipType::new("mentions"),
            0.4,
        );
        let high = ExtractedRelationship::new(
            a.id.clone(),
            b.id.clone(),
            RelationshipType::new("mentions"),
            0.9,
        );

        storage.create_relationship(low).await.unwrap();
        storage.create_relationship(high).await.unwrap();

        assert_eq!(storage.relationship_count(), 1);
        assert_eq!(storage.relationships()[0].confidence, 0.9);
    }

    #[tokio::test]
    async fn test_deactivation_sweeps_orphan_edges() {
        let storage = InMemoryStorage::new(4);
        let ws = workspace(&storage).await;
        let a = storage.create_memory(memory(&ws, "fact", "a")).await.unwrap();
        let b = storage.create_memory(memory(&ws, "entity", "b")).await.unwrap();
        let rel = ExtractedRelationship::new(
            a.id.clone(),
            b.id.clone(),
            RelationshipType::new("mentions"),
            0.8,
        );
        storage.create_relationship(rel).await.unwrap();

        storage.deactivate_memories(&ws, &[a.id.clone()]).await.unwrap();

        assert_eq!(storage.is_active(&a.id), Some(false));
        assert_eq!(storage.relationship_count(), 0);
        // Inactive memories drop out of retrieval
        let results = storage.search_memories_text("a", &ws, 10).await.unwrap();
        assert!(results.is_empty());
    }

    #[tokio::test]
    async fn test_recent_queries_filter_types() {
        let storage = InMemoryStorage::new(4);
        let ws = workspace(&storage).await;
        storage
            .create_memory(memory(&ws, "entity.file", "notes.md"))
            .await
            .unwrap();
        storage
            .create_memory(memory(&ws, "context.screen", "screenshot of editor"))
            .await
            .unwrap();
        storage
            .create_memory(memory(&ws, "fact", "deploys happen on fridays"))
            .await
            .unwrap();

        let files = storage.get_recent_files(&ws, 10).await.unwrap();
        assert_eq!(files.len(), 1);
        assert_eq!(files[0].memory_type.as_str(), "entity.file");

        let non_screen = storage.get_recent_non_screen_memories(&ws, 10).await.unwrap();
        assert_eq!(non_screen.len(), 2);
        // Newest first
        assert_eq!(non_screen[0].content, "deploys happen on fridays");
    }

    #[tokio::test]
    async fn test_save_command() {
        let storage = InMemoryStorage::new(4);
        let request = CommandRequest::new("u1", "c1", "hello");
        let response = CommandResponse {
            command_id: "c1".to_string(),
            assistant_text: "hi".to_string(),
            actions: Vec::new(),
            memories_used: Vec::new(),
        };
        storage.save_command(&request, &response, &[]).await.unwrap();
        assert_eq!(storage.command_count(), 1);
    }
}
