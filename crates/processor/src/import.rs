//! Import pipeline
//!
//! Payload -> parse -> validate -> chunk -> per-chunk extraction ->
//! deduplicate -> persist. Chunks extract sequentially with previous-chunk
//! context by default (better duplicate avoidance), or in parallel when the
//! context threading is disabled; deduplication consumes results only after
//! every chunk has settled either way.

use std::sync::Arc;

use futures::future::join_all;

use mnemon_chunking::{Chunker, ChunkingConfig};
use mnemon_core::{
    EmbeddingProvider, NormalizedConversation, Result, StorageClient,
};
use mnemon_extraction::{
    ChunkDeduplicator, ChunkExtractionResult, ChunkStatus, ExtractionConfig, ExtractionStrategy,
    PreviousChunkContext,
};
use mnemon_ingest::{import_json, ImportLimits, ImportOptions, ParserRegistry};

/// Import configuration
#[derive(Debug, Clone, Default)]
pub struct ImportConfig {
    pub chunking: ChunkingConfig,
    pub extraction: ExtractionConfig,
    pub options: ImportOptions,
    pub limits: ImportLimits,
    /// Thread previous-chunk context through extraction (sequential); when
    /// false, chunks extract in parallel
    pub sequential_context: bool,
}

impl ImportConfig {
    pub fn sequential() -> Self {
        Self {
            sequential_context: true,
            ..Default::default()
        }
    }
}

/// Per-chunk outcome in an import report
#[derive(Debug, Clone)]
pub struct ChunkReport {
    pub chunk_id: String,
    pub sequence: usize,
    pub success: bool,
    pub error: Option<String>,
}

/// Outcome of importing one conversation
#[derive(Debug, Clone)]
pub struct ConversationImport {
    pub conversation_id: String,
    pub memories_created: usize,
    pub relationships_created: usize,
    pub duplicates_found: usize,
    pub chunks: Vec<ChunkReport>,
}

/// Outcome of an import request
#[derive(Debug, Clone)]
pub struct ImportSummary {
    pub provider: String,
    pub conversations: Vec<ConversationImport>,
    /// Conversation ids skipped by validation in non-strict mode
    pub skipped: Vec<String>,
}

/// Drives the whole import flow
pub struct ImportPipeline {
    registry: Arc<ParserRegistry>,
    chunker: Arc<Chunker>,
    extraction: Arc<ExtractionStrategy>,
    deduplicator: ChunkDeduplicator,
    storage: Arc<dyn StorageClient>,
    embedder: Arc<dyn EmbeddingProvider>,
}

impl ImportPipeline {
    pub fn new(
        registry: Arc<ParserRegistry>,
        chunker: Arc<Chunker>,
        extraction: Arc<ExtractionStrategy>,
        deduplicator: ChunkDeduplicator,
        storage: Arc<dyn StorageClient>,
        embedder: Arc<dyn EmbeddingProvider>,
    ) -> Self {
        Self {
            registry,
            chunker,
            extraction,
            deduplicator,
            storage,
            embedder,
        }
    }

    /// Import a raw JSON payload into a workspace
    pub async fn import(
        &self,
        payload: &str,
        provider: Option<&str>,
        workspace_id: &str,
        config: &ImportConfig,
    ) -> Result<ImportSummary> {
        let report = import_json(
            payload,
            provider,
            &self.registry,
            config.options,
            config.limits,
        )?;

        let mut conversations = Vec::with_capacity(report.conversations.len());
        for conversation in &report.conversations {
            conversations.push(
                self.import_conversation(conversation, workspace_id, config)
                    .await?,
            );
        }

        Ok(ImportSummary {
            provider: report.provider,
            conversations,
            skipped: report
                .invalid
                .iter()
                .map(|i| i.conversation.id.clone())
                .collect(),
        })
    }

    /// Chunk, extract, deduplicate, and persist one conversation
    pub async fn import_conversation(
        &self,
        conversation: &NormalizedConversation,
        workspace_id: &str,
        config: &ImportConfig,
    ) -> Result<ConversationImport> {
        let chunks = self.chunker.chunk(conversation, &config.chunking)?;
        tracing::info!(
            conversation_id = %conversation.id,
            chunks = chunks.len(),
            "starting chunked extraction"
        );

        let chunk_results = if config.sequential_context {
            self.extract_sequential(conversation, workspace_id, &chunks, config)
                .await
        } else {
            self.extract_parallel(conversation, workspace_id, &chunks, config)
                .await
        };

        let (dedup_result, relationships) = self.deduplicator.deduplicate_chunks(&chunk_results);

        // Memories first; relationships only after every endpoint id is live
        let mut memories_created = 0;
        for mut memory in dedup_result.unique_memories {
            memory.embedding = Some(self.embedder.embed(&memory.content).await?);
            self.storage.create_memory(memory).await?;
            memories_created += 1;
        }

        let mut relationships_created = 0;
        for relationship in relationships {
            match self.storage.create_relationship(relationship).await {
                Ok(_) => relationships_created += 1,
                Err(e) => {
                    tracing::warn!(error = %e, "skipping relationship during import");
                }
            }
        }

        Ok(ConversationImport {
            conversation_id: conversation.id.clone(),
            memories_created,
            relationships_created,
            duplicates_found: dedup_result.duplicates_found,
            chunks: chunk_results
                .iter()
                .map(|result| ChunkReport {
                    chunk_id: result.chunk_id.clone(),
                    sequence: result.sequence,
                    success: result.is_success(),
                    error: match &result.status {
                        ChunkStatus::Failed { error } => Some(error.clone()),
                        ChunkStatus::Success => None,
                    },
                })
                .collect(),
        })
    }

    /// Extract chunks in order, feeding each one a summary of what earlier
    /// chunks produced
    async fn extract_sequential(
        &self,
        conversation: &NormalizedConversation,
        workspace_id: &str,
        chunks: &[mnemon_core::ConversationChunk],
        config: &ImportConfig,
    ) -> Vec<ChunkExtractionResult> {
        let mut results = Vec::with_capacity(chunks.len());
        let mut prior_memories = Vec::new();

        for chunk in chunks {
            let context = if prior_memories.is_empty() {
                None
            } else {
                Some(PreviousChunkContext::from_memories(&prior_memories))
            };
            let result = self
                .extraction
                .extract_from_chunk(
                    &chunk.messages,
                    &conversation.id,
                    workspace_id,
                    &chunk.id,
                    chunk.sequence,
                    &config.extraction,
                    context.as_ref(),
                )
                .await;

            if result.is_success() {
                prior_memories.extend(result.memories.iter().cloned());
            }
            results.push(result);
        }
        results
    }

    /// Extract all chunks concurrently; used when context threading is off
    async fn extract_parallel(
        &self,
        conversation: &NormalizedConversation,
        workspace_id: &str,
        chunks: &[mnemon_core::ConversationChunk],
        config: &ImportConfig,
    ) -> Vec<ChunkExtractionResult> {
        let futures = chunks.iter().map(|chunk| {
            self.extraction.extract_from_chunk(
                &chunk.messages,
                &conversation.id,
                workspace_id,
                &chunk.id,
                chunk.sequence,
                &config.extraction,
                None,
            )
        });
        join_all(futures).await
    }
}
