//! Extraction strategy
//!
//! Drives structured LLM calls and turns their raw output into typed
//! memories and relationships. Relationship endpoints produced here are
//! `temp_{index}` references; `extract` resolves them immediately for the
//! single-call path, while chunked callers leave resolution to the
//! deduplicator.

use std::collections::HashMap;
use std::sync::Arc;

use chrono::Utc;
use serde::Deserialize;
use serde_json::Value;
use uuid::Uuid;

use mnemon_core::{
    ExtractedMemory, ExtractedRelationship, MemoryType, NormalizedConversation,
    NormalizedMessage, RelationshipType,
};
use mnemon_llm::{CompletionParams, CompletionProvider};

use crate::dedup::resolve_temp_endpoints;
use crate::prompt::build_extraction_prompt;
use crate::registry::MemoryTypeRegistry;
use crate::schema::build_output_schema;
use crate::types::{ChunkExtractionResult, ChunkStatus, ExtractionConfig, PreviousChunkContext};
use crate::ExtractionError;

/// Raw model output, as constrained by the schema
#[derive(Debug, Deserialize)]
pub(crate) struct RawExtraction {
    pub memories: Vec<RawMemory>,
    #[serde(default)]
    pub relationships: Vec<RawRelationship>,
}

#[derive(Debug, Deserialize)]
pub(crate) struct RawMemory {
    #[serde(rename = "type")]
    pub memory_type: String,
    pub content: String,
    pub confidence: f32,
    #[serde(default)]
    pub metadata: HashMap<String, Value>,
}

#[derive(Debug, Deserialize)]
pub(crate) struct RawRelationship {
    pub from_memory_index: i64,
    pub to_memory_index: i64,
    pub relationship_type: String,
    pub confidence: f32,
}

pub(crate) struct TransformContext {
    pub workspace_id: String,
    pub conversation_id: String,
    pub source_message_ids: Vec<String>,
    pub chunk_id: Option<String>,
}

/// Structured-output memory extraction
pub struct ExtractionStrategy {
    provider: Arc<CompletionProvider>,
    registry: Arc<MemoryTypeRegistry>,
}

impl ExtractionStrategy {
    pub fn new(provider: Arc<CompletionProvider>, registry: Arc<MemoryTypeRegistry>) -> Self {
        Self { provider, registry }
    }

    pub fn registry(&self) -> &MemoryTypeRegistry {
        &self.registry
    }

    /// Extract over a whole conversation in one call; relationship endpoints
    /// are resolved to real memory ids
    pub async fn extract(
        &self,
        conv: &NormalizedConversation,
        workspace_id: &str,
        config: &ExtractionConfig,
    ) -> Result<(Vec<ExtractedMemory>, Vec<ExtractedRelationship>), ExtractionError> {
        let (memories, relationships) = self
            .run(&conv.messages, &conv.id, workspace_id, None, config, None)
            .await?;
        let relationships = resolve_temp_endpoints(&memories, relationships);
        Ok((memories, relationships))
    }

    /// Extract one chunk; failures are captured in the result status so a
    /// bad chunk never sinks the conversation
    #[allow(clippy::too_many_arguments)]
    pub async fn extract_from_chunk(
        &self,
        messages: &[NormalizedMessage],
        conversation_id: &str,
        workspace_id: &str,
        chunk_id: &str,
        sequence: usize,
        config: &ExtractionConfig,
        previous: Option<&PreviousChunkContext>,
    ) -> ChunkExtractionResult {
        match self
            .run(
                messages,
                conversation_id,
                workspace_id,
                Some(chunk_id),
                config,
                previous,
            )
            .await
        {
            Ok((memories, relationships)) => ChunkExtractionResult {
                chunk_id: chunk_id.to_string(),
                sequence,
                status: ChunkStatus::Success,
                memories,
                relationships,
            },
            Err(e) => {
                tracing::warn!(chunk_id, error = %e, "chunk extraction failed");
                ChunkExtractionResult::failed(chunk_id, sequence, e.to_string())
            }
        }
    }

    /// Extract over newly arrived messages with prior context
    pub async fn extract_incremental(
        &self,
        new_messages: &[NormalizedMessage],
        conversation_id: &str,
        workspace_id: &str,
        config: &ExtractionConfig,
        context: &PreviousChunkContext,
    ) -> Result<(Vec<ExtractedMemory>, Vec<ExtractedRelationship>), ExtractionError> {
        let (memories, relationships) = self
            .run(
                new_messages,
                conversation_id,
                workspace_id,
                None,
                config,
                Some(context),
            )
            .await?;
        let relationships = resolve_temp_endpoints(&memories, relationships);
        Ok((memories, relationships))
    }

    async fn run(
        &self,
        messages: &[NormalizedMessage],
        conversation_id: &str,
        workspace_id: &str,
        chunk_id: Option<&str>,
        config: &ExtractionConfig,
        previous: Option<&PreviousChunkContext>,
    ) -> Result<(Vec<ExtractedMemory>, Vec<ExtractedRelationship>), ExtractionError> {
        let prompt =
            build_extraction_prompt(messages, &config.memory_types, &self.registry, previous);
        let schema = build_output_schema(&config.memory_types, &self.registry);
        let params = CompletionParams {
            max_tokens: config.max_tokens,
            temperature: config.temperature,
            timeout: config.timeout,
        };

        let raw: RawExtraction = self
            .provider
            .complete_structured(&prompt, &schema, params)
            .await?;

        let ctx = TransformContext {
            workspace_id: workspace_id.to_string(),
            conversation_id: conversation_id.to_string(),
            source_message_ids: messages.iter().map(|m| m.id.clone()).collect(),
            chunk_id: chunk_id.map(str::to_string),
        };
        Ok(transform_result(raw, &ctx, config))
    }
}

/// Turn raw model output into typed memories and temp-endpoint relationships
pub(crate) fn transform_result(
    raw: RawExtraction,
    ctx: &TransformContext,
    config: &ExtractionConfig,
) -> (Vec<ExtractedMemory>, Vec<ExtractedRelationship>) {
    let now = Utc::now();
    let mut source_message_ids = ctx.source_message_ids.clone();
    source_message_ids.sort();
    source_message_ids.dedup();

    // Raw index -> kept index; rows the model shouldn't have produced
    // (empty content) are skipped and their relationships dropped with them
    let mut kept_index: Vec<Option<usize>> = Vec::with_capacity(raw.memories.len());
    let mut memories = Vec::new();

    for raw_memory in raw.memories {
        if raw_memory.content.trim().is_empty() {
            tracing::debug!("dropping extracted memory with empty content");
            kept_index.push(None);
            continue;
        }

        let mut memory = ExtractedMemory {
            id: Uuid::new_v4().to_string(),
            workspace_id: ctx.workspace_id.clone(),
            conversation_id: ctx.conversation_id.clone(),
            memory_type: MemoryType::new(raw_memory.memory_type),
            content: raw_memory.content,
            confidence: raw_memory.confidence.clamp(0.0, 1.0),
            metadata: raw_memory.metadata,
            embedding: None,
            source_message_ids: source_message_ids.clone(),
            source_chunks: Vec::new(),
            chunk_confidence: Vec::new(),
            merged_from: Vec::new(),
            created_at: now,
        };
        if let Some(chunk_id) = &ctx.chunk_id {
            memory.source_chunks = vec![chunk_id.clone()];
            memory.chunk_confidence = vec![memory.confidence];
        }

        kept_index.push(Some(memories.len()));
        memories.push(memory);
    }

    let relationships = if config.include_relationships {
        raw.relationships
            .into_iter()
            .filter_map(|raw_rel| {
                let from = remap_index(raw_rel.from_memory_index, &kept_index)?;
                let to = remap_index(raw_rel.to_memory_index, &kept_index)?;
                Some(ExtractedRelationship {
                    from_memory_id: format!("temp_{from}"),
                    to_memory_id: format!("temp_{to}"),
                    relationship_type: RelationshipType::new(raw_rel.relationship_type),
                    confidence: raw_rel.confidence.clamp(0.0, 1.0),
                    created_at: now,
                })
            })
            .collect()
    } else {
        Vec::new()
    };

    (memories, relationships)
}

/// Map a raw relationship index to a kept-memory index; out-of-range and
/// skipped-row references drop the relationship
fn remap_index(raw: i64, kept_index: &[Option<usize>]) -> Option<usize> {
    if raw < 0 {
        return None;
    }
    kept_index.get(raw as usize).copied().flatten()
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use mnemon_core::MessageRole;
    use mnemon_llm::{BackendRequest, CompletionBackend, LlmError, RawCompletion, RetryConfig};
    use parking_lot::Mutex;
    use serde_json::json;
    use std::collections::VecDeque;

    struct ScriptedBackend {
        responses: Mutex<VecDeque<String>>,
        prompts: Mutex<Vec<String>>,
    }

    impl ScriptedBackend {
        fn new(responses: Vec<String>) -> Self {
            Self {
                responses: Mutex::new(responses.into()),
                prompts: Mutex::new(Vec::new()),
            }
        }
    }

    #[async_trait]
    impl CompletionBackend for ScriptedBackend {
        fn provider_name(&self) -> &str {
            "scripted"
        }

        async fn complete(&self, request: &BackendRequest) -> Result<RawCompletion, LlmError> {
            self.prompts.lock().push(request.prompt.clone());
            let text = self
                .responses
                .lock()
                .pop_front()
                .unwrap_or_else(|| "{\"memories\": [], \"relationships\": []}".to_string());
            Ok(RawCompletion {
                text,
                ..Default::default()
            })
        }
    }

    fn strategy(responses: Vec<String>) -> (ExtractionStrategy, Arc<ScriptedBackend>) {
        let backend = Arc::new(ScriptedBackend::new(responses));
        let provider = Arc::new(CompletionProvider::new(
            backend.clone(),
            RetryConfig::default(),
        ));
        (
            ExtractionStrategy::new(provider, Arc::new(MemoryTypeRegistry::new())),
            backend,
        )
    }

    fn conversation() -> NormalizedConversation {
        let now = Utc::now();
        NormalizedConversation {
            id: "conv-1".to_string(),
            provider: "test".to_string(),
            external_id: None,
            title: None,
            created_at: now,
            updated_at: now,
            messages: vec![
                NormalizedMessage::new("m1", MessageRole::User, "I work at Acme with Dana"),
                NormalizedMessage::new("m2", MessageRole::Assistant, "Got it."),
            ],
            raw_metadata: Default::default(),
        }
    }

    fn extraction_response() -> String {
        json!({
            "memories": [
                {"type": "entity", "content": "Acme", "confidence": 0.9,
                 "metadata": {"entity_type": "organization", "name": "Acme"}},
                {"type": "fact", "content": "User works at Acme", "confidence": 0.85, "metadata": {}}
            ],
            "relationships": [
                {"from_memory_index": 1, "to_memory_index": 0,
                 "relationship_type": "mentions", "confidence": 0.8}
            ]
        })
        .to_string()
    }

    #[tokio::test]
    async fn test_extract_resolves_endpoints() {
        let (strategy, _) = strategy(vec![extraction_response()]);
        let (memories, relationships) = strategy
            .extract(&conversation(), "ws-1", &ExtractionConfig::default())
            .await
            .unwrap();

        assert_eq!(memories.len(), 2);
        assert_eq!(memories[0].workspace_id, "ws-1");
        assert_eq!(memories[0].conversation_id, "conv-1");
        assert_eq!(memories[0].source_message_ids, vec!["m1", "m2"]);

        assert_eq!(relationships.len(), 1);
        assert_eq!(relationships[0].from_memory_id, memories[1].id);
        assert_eq!(relationships[0].to_memory_id, memories[0].id);
    }

    #[tokio::test]
    async fn test_extract_from_chunk_records_source_chunk() {
        let (strategy, _) = strategy(vec![extraction_response()]);
        let conv = conversation();
        let result = strategy
            .extract_from_chunk(
                &conv.messages,
                "conv-1",
                "ws-1",
                "conv-1-chunk-1",
                1,
                &ExtractionConfig::default(),
                None,
            )
            .await;

        assert!(result.is_success());
        assert_eq!(result.memories[0].source_chunks, vec!["conv-1-chunk-1"]);
        assert_eq!(result.memories[0].chunk_confidence, vec![0.9]);
        // Endpoints stay temporary for the deduplicator
        assert_eq!(result.relationships[0].from_memory_id, "temp_1");
    }

    #[tokio::test]
    async fn test_chunk_failure_is_contained() {
        // Unparseable response -> failed chunk, not an error
        let (strategy, _) = strategy(vec!["not json at all".to_string()]);
        let conv = conversation();
        let result = strategy
            .extract_from_chunk(
                &conv.messages,
                "conv-1",
                "ws-1",
                "conv-1-chunk-1",
                1,
                &ExtractionConfig::default(),
                None,
            )
            .await;

        assert!(!result.is_success());
        assert!(matches!(result.status, ChunkStatus::Failed { .. }));
        assert!(result.memories.is_empty());
    }

    #[tokio::test]
    async fn test_previous_context_threaded_into_prompt() {
        let (strategy, backend) = strategy(vec![extraction_response()]);
        let conv = conversation();
        let previous = PreviousChunkContext {
            summaries: vec![(MemoryType::fact(), "User works at Acme".to_string())],
        };
        let _ = strategy
            .extract_from_chunk(
                &conv.messages,
                "conv-1",
                "ws-1",
                "conv-1-chunk-2",
                2,
                &ExtractionConfig::default(),
                Some(&previous),
            )
            .await;

        let prompts = backend.prompts.lock();
        assert!(prompts[0].contains("already extracted"));
        assert!(prompts[0].contains("User works at Acme"));
    }

    #[test]
    fn test_transform_drops_out_of_range_relationships() {
        let raw = RawExtraction {
            memories: vec![RawMemory {
                memory_type: "fact".to_string(),
                content: "x".to_string(),
                confidence: 0.9,
                metadata: HashMap::new(),
            }],
            relationships: vec![
                RawRelationship {
                    from_memory_index: 0,
                    to_memory_index: 5,
                    relationship_type: "mentions".to_string(),
                    confidence: 0.8,
                },
                RawRelationship {
                    from_memory_index: -1,
                    to_memory_index: 0,
                    relationship_type: "mentions".to_string(),
                    confidence: 0.8,
                },
            ],
        };
        let ctx = TransformContext {
            workspace_id: "ws".to_string(),
            conversation_id: "conv".to_string(),
            source_message_ids: vec!["m1".to_string()],
            chunk_id: None,
        };

        let (memories, relationships) =
            transform_result(raw, &ctx, &ExtractionConfig::default());
        assert_eq!(memories.len(), 1);
        assert!(relationships.is_empty());
    }

    #[test]
    fn test_transform_skips_empty_content_and_remaps() {
        let raw = RawExtraction {
            memories: vec![
                RawMemory {
                    memory_type: "fact".to_string(),
                    content: "  ".to_string(),
                    confidence: 0.9,
                    metadata: HashMap::new(),
                },
                RawMemory {
                    memory_type: "fact".to_string(),
                    content: "kept".to_string(),
                    confidence: 1.7,
                    metadata: HashMap::new(),
                },
            ],
            relationships: vec![RawRelationship {
                from_memory_index: 1,
                to_memory_index: 1,
                relationship_type: "related_to".to_string(),
                confidence: 0.5,
            }],
        };
        let ctx = TransformContext {
            workspace_id: "ws".to_string(),
            conversation_id: "conv".to_string(),
            source_message_ids: vec!["m1".to_string()],
            chunk_id: None,
        };

        let (memories, relationships) =
            transform_result(raw, &ctx, &ExtractionConfig::default());
        assert_eq!(memories.len(), 1);
        assert_eq!(memories[0].content, "kept");
        assert_eq!(memories[0].confidence, 1.0);
        // The raw index 1 remaps to kept index 0
        assert_eq!(relationships[0].from_memory_id, "temp_0");
    }
}
