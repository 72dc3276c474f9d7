//! Parser trait and registry

use std::sync::Arc;

use parking_lot::RwLock;
use serde_json::Value;

use mnemon_core::NormalizedConversation;

use crate::{AnthropicParser, IngestError, OpenAiParser};

/// Normalizes one provider's export format into canonical conversations
pub trait ChatParser: Send + Sync {
    /// Provider identifier, e.g. `"openai"`
    fn provider(&self) -> &str;

    /// Cheap structural sniff: does this payload look like ours?
    fn can_parse(&self, raw: &Value) -> bool;

    fn parse(&self, raw: &Value) -> Result<Vec<NormalizedConversation>, IngestError>;
}

/// Registry of chat parsers
///
/// Process-wide and safe for concurrent readers. Detection walks parsers in
/// registration order and picks the first whose `can_parse` succeeds, so
/// more specific formats should be registered before permissive ones.
pub struct ParserRegistry {
    parsers: RwLock<Vec<Arc<dyn ChatParser>>>,
}

impl ParserRegistry {
    pub fn new() -> Self {
        Self {
            parsers: RwLock::new(Vec::new()),
        }
    }

    /// Registry with the built-in OpenAI and Anthropic parsers
    pub fn with_builtins() -> Self {
        let registry = Self::new();
        registry.register(Arc::new(OpenAiParser::new()));
        registry.register(Arc::new(AnthropicParser::new()));
        registry
    }

    pub fn register(&self, parser: Arc<dyn ChatParser>) {
        self.parsers.write().push(parser);
    }

    /// Look up a parser by provider identifier
    pub fn get(&self, provider: &str) -> Result<Arc<dyn ChatParser>, IngestError> {
        self.parsers
            .read()
            .iter()
            .find(|p| p.provider().eq_ignore_ascii_case(provider))
            .cloned()
            .ok_or_else(|| IngestError::ProviderNotFound(provider.to_string()))
    }

    /// Auto-detect the parser for a payload, in registration order
    pub fn detect(&self, raw: &Value) -> Result<Arc<dyn ChatParser>, IngestError> {
        self.parsers
            .read()
            .iter()
            .find(|p| p.can_parse(raw))
            .cloned()
            .ok_or(IngestError::DetectionFailed)
    }

    pub fn providers(&self) -> Vec<String> {
        self.parsers
            .read()
            .iter()
            .map(|p| p.provider().to_string())
            .collect()
    }
}

impl Default for ParserRegistry {
    fn default() -> Self {
        Self::with_builtins()
    }
}
