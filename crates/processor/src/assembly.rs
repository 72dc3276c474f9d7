//! Default process-boundary assembly
//!
//! Everything in the pipeline takes its collaborators by constructor; this
//! module is the one place the default stack is wired together. Embedders
//! and storage default to the in-process implementations until real
//! adapters are plugged in.

use std::sync::Arc;

use mnemon_chunking::Chunker;
use mnemon_config::Settings;
use mnemon_core::{EmbeddingProvider, Result, StorageClient};
use mnemon_extraction::{
    ChunkDeduplicator, DeduplicatorConfig, ExtractionStrategy, MemoryTypeRegistry,
};
use mnemon_ingest::ParserRegistry;
use mnemon_llm::{CompletionBackend, CompletionProvider, HttpBackend, RetryConfig};
use mnemon_retrieval::{ContextBuilder, HashEmbedder, RetrievalConfig};
use mnemon_storage::InMemoryStorage;
use mnemon_tokens::{TokenCounter, TokenCounterConfig};

use crate::import::ImportPipeline;
use crate::processor::{CommandProcessor, ProcessorConfig};

/// A wired default stack
pub struct Assembly {
    pub processor: Arc<CommandProcessor>,
    pub import: Arc<ImportPipeline>,
    pub storage: Arc<dyn StorageClient>,
    pub registry: Arc<ParserRegistry>,
    pub memory_types: Arc<MemoryTypeRegistry>,
    pub counter: Arc<TokenCounter>,
}

/// Build the default assembly from settings, using the configured HTTP LLM
/// backend
pub fn build_default(settings: &Settings) -> Result<Assembly> {
    let backend = HttpBackend::new((&settings.llm).into()).map_err(mnemon_core::Error::from)?;
    Ok(build_with(
        settings,
        Arc::new(backend),
        Arc::new(InMemoryStorage::new(settings.embedding.dimension)),
        Arc::new(HashEmbedder::new(settings.embedding.dimension)),
    ))
}

/// Build an assembly with explicit backend, storage, and embedder
pub fn build_with(
    settings: &Settings,
    backend: Arc<dyn CompletionBackend>,
    storage: Arc<dyn StorageClient>,
    embedder: Arc<dyn EmbeddingProvider>,
) -> Assembly {
    let counter = Arc::new(TokenCounter::new(TokenCounterConfig::from(&settings.tokens)));
    let provider = Arc::new(CompletionProvider::new(
        backend,
        RetryConfig::from(&settings.retry),
    ));
    let memory_types = Arc::new(MemoryTypeRegistry::new());
    let extraction = Arc::new(ExtractionStrategy::new(
        provider.clone(),
        memory_types.clone(),
    ));
    let registry = Arc::new(ParserRegistry::with_builtins());

    let context_builder = Arc::new(ContextBuilder::new(
        storage.clone(),
        embedder.clone(),
        counter.clone(),
        RetrievalConfig::from(&settings.retrieval),
    ));

    let processor = Arc::new(CommandProcessor::new(
        storage.clone(),
        embedder.clone(),
        context_builder,
        provider,
        extraction.clone(),
        ProcessorConfig::default(),
    ));

    let import = Arc::new(ImportPipeline::new(
        registry.clone(),
        Arc::new(Chunker::new(counter.clone())),
        extraction,
        ChunkDeduplicator::new(DeduplicatorConfig {
            similarity_threshold: settings.retrieval.similarity_threshold,
            allow_self_loops: false,
        }),
        storage.clone(),
        embedder,
    ));

    Assembly {
        processor,
        import,
        storage,
        registry,
        memory_types,
        counter,
    }
}

/// Install the tracing subscriber; call once at process start
pub fn init_tracing() {
    use tracing_subscriber::EnvFilter;

    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .try_init();
}
