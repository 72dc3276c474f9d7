//! Context builder

use std::sync::Arc;

use once_cell::sync::Lazy;
use regex::Regex;

use mnemon_config::constants::retrieval as retrieval_constants;
use mnemon_config::RetrievalSettings;
use mnemon_core::{
    EmbeddingProvider, Result, ScoredMemory, SearchQuery, StorageClient,
};
use mnemon_tokens::{CountMethod, TokenCounter};

use crate::boost::{boost_scores, filter_conversational};

/// Score assigned to results from score-less fallback paths
const TEXT_FALLBACK_SCORE: f32 = 0.5;
const RECENT_FALLBACK_SCORE: f32 = 0.3;

static WORD: Lazy<Regex> = Lazy::new(|| Regex::new(r"[a-z0-9]{3,}").expect("static regex"));

static STOPWORDS: Lazy<std::collections::HashSet<&'static str>> = Lazy::new(|| {
    [
        "the", "and", "for", "are", "was", "can", "could", "what", "which", "who", "how",
        "why", "when", "where", "this", "that", "with", "from", "into", "about", "you",
        "your", "please", "show", "tell",
    ]
    .into_iter()
    .collect()
});

/// Retrieval parameters
#[derive(Debug, Clone)]
pub struct RetrievalConfig {
    /// Candidates fetched from vector search
    pub k: usize,
    /// Token budget for the composed context
    pub token_budget: usize,
    pub fact_boost_factor: f32,
}

impl Default for RetrievalConfig {
    fn default() -> Self {
        Self {
            k: retrieval_constants::DEFAULT_TOP_K,
            token_budget: retrieval_constants::CONTEXT_TOKEN_BUDGET,
            fact_boost_factor: retrieval_constants::FACT_BOOST_FACTOR,
        }
    }
}

impl From<&RetrievalSettings> for RetrievalConfig {
    fn from(settings: &RetrievalSettings) -> Self {
        Self {
            k: settings.k,
            token_budget: settings.token_budget,
            fact_boost_factor: settings.fact_boost_factor,
        }
    }
}

/// A composed context with the memories behind it
#[derive(Debug, Clone)]
pub struct RetrievedContext {
    pub context: String,
    pub memories: Vec<ScoredMemory>,
}

/// Orchestrates retrieval: vector search, filtering, boosting, fallback
/// cascade, and budgeted composition
pub struct ContextBuilder {
    storage: Arc<dyn StorageClient>,
    embedder: Arc<dyn EmbeddingProvider>,
    counter: Arc<TokenCounter>,
    config: RetrievalConfig,
}

impl ContextBuilder {
    pub fn new(
        storage: Arc<dyn StorageClient>,
        embedder: Arc<dyn EmbeddingProvider>,
        counter: Arc<TokenCounter>,
        config: RetrievalConfig,
    ) -> Self {
        Self {
            storage,
            embedder,
            counter,
            config,
        }
    }

    /// The plain retrieval pipeline: vector search, conversational filter,
    /// fact boost, composition
    pub async fn build_context(&self, query: &str, workspace_id: &str) -> Result<RetrievedContext> {
        let memories = self.retrieve(query, workspace_id).await?;
        Ok(self.compose(memories))
    }

    /// Retrieval plus the fallback cascade; what the command processor uses
    pub async fn build_context_with_fallbacks(
        &self,
        query: &str,
        workspace_id: &str,
    ) -> Result<RetrievedContext> {
        let memories = self.retrieve(query, workspace_id).await?;
        let memories = self.apply_fallbacks(query, workspace_id, memories).await?;
        Ok(self.compose(memories))
    }

    async fn retrieve(&self, query: &str, workspace_id: &str) -> Result<Vec<ScoredMemory>> {
        let vector = self.embedder.embed(query).await?;
        let candidates = self
            .storage
            .search_memories(workspace_id, SearchQuery::vector(vector, self.config.k))
            .await?;

        let filtered = filter_conversational(candidates);
        Ok(boost_scores(filtered, self.config.fact_boost_factor))
    }

    /// The fallback cascade, in order:
    /// 1. empty -> text-mode search, then plain text search, then recent
    ///    non-screen memories
    /// 2. only file/screen hits -> inject non-file memories via text search,
    ///    then keyword-augmented text search
    /// 3. non-screen memories present -> drop screen and echo types
    /// 4. still empty -> recent files as a last resort
    pub async fn apply_fallbacks(
        &self,
        query: &str,
        workspace_id: &str,
        mut memories: Vec<ScoredMemory>,
    ) -> Result<Vec<ScoredMemory>> {
        if memories.is_empty() {
            tracing::debug!(workspace_id, "vector retrieval empty, trying text search");
            memories = self
                .storage
                .search_memories(workspace_id, SearchQuery::text(query, self.config.k))
                .await?;
        }
        if memories.is_empty() {
            memories = self.text_search(query, workspace_id).await?;
        }
        if memories.is_empty() {
            memories = with_score(
                self.storage
                    .get_recent_non_screen_memories(workspace_id, self.config.k)
                    .await?,
                RECENT_FALLBACK_SCORE,
            );
        }

        // Only file-ish hits: pull in substantive memories by text
        if !memories.is_empty() && memories.iter().all(|m| is_file_like(m)) {
            tracing::debug!(workspace_id, "only file memories retrieved, injecting non-file hits");
            let injected = self.text_search(query, workspace_id).await?;
            memories.extend(injected.into_iter().filter(|m| !is_file_like(m)));

            if memories.iter().all(|m| is_file_like(m)) {
                let keywords = extract_keywords(query).join(" ");
                if !keywords.is_empty() {
                    let augmented = self.text_search(&keywords, workspace_id).await?;
                    memories.extend(augmented.into_iter().filter(|m| !is_file_like(m)));
                }
            }
        }

        // With real content present, screen captures and echoes only dilute
        if memories.iter().any(|m| !is_screen_or_echo(m)) {
            memories.retain(|m| !is_screen_or_echo(m));
        }

        if memories.is_empty() {
            tracing::debug!(workspace_id, "falling back to recent files");
            memories = with_score(
                self.storage
                    .get_recent_files(workspace_id, self.config.k)
                    .await?,
                RECENT_FALLBACK_SCORE,
            );
        }

        dedup_by_id(&mut memories);
        Ok(boost_scores(memories, 1.0))
    }

    async fn text_search(&self, query: &str, workspace_id: &str) -> Result<Vec<ScoredMemory>> {
        Ok(with_score(
            self.storage
                .search_memories_text(query, workspace_id, self.config.k)
                .await?,
            TEXT_FALLBACK_SCORE,
        ))
    }

    /// Render memories into a context string under the token budget,
    /// highest score first, truncating cleanly at a summary boundary
    pub fn compose(&self, memories: Vec<ScoredMemory>) -> RetrievedContext {
        let mut context = String::new();
        let mut used_tokens = 0;

        for scored in &memories {
            let line = format!(
                "- [{}] {}",
                scored.memory.memory_type,
                scored.memory.summary()
            );
            let line_tokens = self.counter.count(&line, CountMethod::Approximate).tokens;
            if used_tokens + line_tokens > self.config.token_budget {
                break;
            }
            if !context.is_empty() {
                context.push('\n');
            }
            context.push_str(&line);
            used_tokens += line_tokens;
        }

        RetrievedContext { context, memories }
    }
}

fn with_score(memories: Vec<mnemon_core::ExtractedMemory>, score: f32) -> Vec<ScoredMemory> {
    memories
        .into_iter()
        .map(|memory| ScoredMemory { memory, score })
        .collect()
}

fn is_file_like(scored: &ScoredMemory) -> bool {
    let t = &scored.memory.memory_type;
    t.starts_with("entity.file") || t.starts_with("context.screen")
}

fn is_screen_or_echo(scored: &ScoredMemory) -> bool {
    let t = &scored.memory.memory_type;
    t.starts_with("context.screen")
        || t.starts_with("fact.command")
        || t.starts_with("fact.response")
}

fn dedup_by_id(memories: &mut Vec<ScoredMemory>) {
    let mut seen = std::collections::HashSet::new();
    memories.retain(|m| seen.insert(m.memory.id.clone()));
}

/// Stopword-filtered keywords for augmented text search
fn extract_keywords(query: &str) -> Vec<String> {
    WORD.find_iter(&query.to_lowercase())
        .map(|m| m.as_str().to_string())
        .filter(|w| !STOPWORDS.contains(w.as_str()))
        .take(5)
        .collect()
}
