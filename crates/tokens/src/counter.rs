//! Token counter

use std::hash::{Hash, Hasher};
use std::time::{Duration, Instant};

use tokenizers::Tokenizer;
use unicode_segmentation::UnicodeSegmentation;

use mnemon_config::constants::tokens as token_constants;
use mnemon_config::TokenSettings;
use mnemon_core::{NormalizedConversation, NormalizedMessage};

use crate::cache::{CacheStats, TokenCache};

/// How a count was produced
///
/// The two estimated variants share the public label `"estimated"`; keeping
/// them distinct makes the cache key honest about which divisor was used.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CountMethod {
    /// BPE encoding (OpenAI-family models)
    Exact,
    /// ceil(chars / 3.5)
    EstimatedAnthropic,
    /// ceil(chars / 3.8)
    EstimatedGemini,
    /// ceil(graphemes / 4)
    Approximate,
}

impl CountMethod {
    pub fn label(&self) -> &'static str {
        match self {
            CountMethod::Exact => "exact",
            CountMethod::EstimatedAnthropic | CountMethod::EstimatedGemini => "estimated",
            CountMethod::Approximate => "approximate",
        }
    }

    /// Parse a configured method label
    pub fn from_label(label: &str) -> Option<Self> {
        match label.to_lowercase().as_str() {
            "exact" => Some(CountMethod::Exact),
            "estimated" => Some(CountMethod::EstimatedAnthropic),
            "approximate" => Some(CountMethod::Approximate),
            _ => None,
        }
    }
}

/// Accuracy of a produced count; degrades to `Approximate` when the exact
/// encoder was unavailable
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Accuracy {
    Exact,
    Estimated,
    Approximate,
}

impl Accuracy {
    /// Rank for picking the weakest accuracy across summed counts
    fn rank(&self) -> u8 {
        match self {
            Accuracy::Exact => 2,
            Accuracy::Estimated => 1,
            Accuracy::Approximate => 0,
        }
    }

    fn weakest(a: Accuracy, b: Accuracy) -> Accuracy {
        if a.rank() <= b.rank() {
            a
        } else {
            b
        }
    }
}

/// A token count together with how it was obtained
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TokenCount {
    pub tokens: usize,
    pub method: CountMethod,
    pub accuracy: Accuracy,
}

/// Counter configuration
#[derive(Debug, Clone)]
pub struct TokenCounterConfig {
    pub cache_capacity: usize,
    pub cache_ttl: Duration,
    /// Path to a tokenizer.json for the exact method
    pub tokenizer_path: Option<String>,
}

impl Default for TokenCounterConfig {
    fn default() -> Self {
        Self {
            cache_capacity: token_constants::CACHE_CAPACITY,
            cache_ttl: Duration::from_secs(token_constants::CACHE_TTL_SECS),
            tokenizer_path: None,
        }
    }
}

impl From<&TokenSettings> for TokenCounterConfig {
    fn from(settings: &TokenSettings) -> Self {
        Self {
            cache_capacity: settings.cache_capacity,
            cache_ttl: Duration::from_secs(settings.cache_ttl_secs),
            tokenizer_path: settings.tokenizer_path.clone(),
        }
    }
}

/// Token counter with a bounded LRU cache
///
/// Cheap to share behind an `Arc`; the cache is internally locked.
pub struct TokenCounter {
    tokenizer: Option<Tokenizer>,
    cache: TokenCache,
}

impl TokenCounter {
    pub fn new(config: TokenCounterConfig) -> Self {
        let tokenizer = config.tokenizer_path.as_deref().and_then(|path| {
            match Tokenizer::from_file(path) {
                Ok(tok) => Some(tok),
                Err(e) => {
                    tracing::warn!(path, error = %e, "failed to load tokenizer, exact counts will fall back to approximate");
                    None
                }
            }
        });

        Self {
            tokenizer,
            cache: TokenCache::new(config.cache_capacity, config.cache_ttl),
        }
    }

    /// Count tokens in `text` under `method`, consulting the cache first
    pub fn count(&self, text: &str, method: CountMethod) -> TokenCount {
        let key = cache_key(method, text);
        if let Some((tokens, method, accuracy)) = self.cache.get(key) {
            return TokenCount {
                tokens,
                method,
                accuracy,
            };
        }

        let start = Instant::now();
        let result = self.compute(text, method);
        self.cache
            .insert(key, result.tokens, result.method, result.accuracy, start.elapsed());
        result
    }

    /// Count a message formatted as `"{role}: {content}"`
    pub fn count_message(&self, message: &NormalizedMessage, method: CountMethod) -> TokenCount {
        self.count(&message.prompt_line(), method)
    }

    /// Sum of per-message counts; accuracy is the weakest of the parts
    pub fn count_conversation(
        &self,
        conversation: &NormalizedConversation,
        method: CountMethod,
    ) -> TokenCount {
        let mut tokens = 0;
        let mut accuracy = match method {
            CountMethod::Exact => Accuracy::Exact,
            CountMethod::EstimatedAnthropic | CountMethod::EstimatedGemini => Accuracy::Estimated,
            CountMethod::Approximate => Accuracy::Approximate,
        };

        for message in &conversation.messages {
            let count = self.count_message(message, method);
            tokens += count.tokens;
            accuracy = Accuracy::weakest(accuracy, count.accuracy);
        }

        TokenCount {
            tokens,
            method,
            accuracy,
        }
    }

    /// Pick the best method for a model/provider name by substring match
    pub fn recommended_method(provider_name: &str) -> CountMethod {
        let name = provider_name.to_lowercase();
        if name.contains("openai") || name.contains("gpt") {
            CountMethod::Exact
        } else if name.contains("anthropic") || name.contains("claude") {
            CountMethod::EstimatedAnthropic
        } else if name.contains("gemini") || name.contains("google") {
            CountMethod::EstimatedGemini
        } else {
            CountMethod::Approximate
        }
    }

    pub fn cache_stats(&self) -> CacheStats {
        self.cache.stats()
    }

    fn compute(&self, text: &str, method: CountMethod) -> TokenCount {
        match method {
            CountMethod::Exact => match &self.tokenizer {
                Some(tokenizer) => match tokenizer.encode(text, false) {
                    Ok(encoding) => TokenCount {
                        tokens: encoding.len(),
                        method,
                        accuracy: Accuracy::Exact,
                    },
                    Err(e) => {
                        tracing::warn!(error = %e, "exact encoding failed, falling back to approximate");
                        self.approximate(text, method)
                    }
                },
                None => self.approximate(text, method),
            },
            CountMethod::EstimatedAnthropic => TokenCount {
                tokens: ratio_count(text, token_constants::ANTHROPIC_CHARS_PER_TOKEN),
                method,
                accuracy: Accuracy::Estimated,
            },
            CountMethod::EstimatedGemini => TokenCount {
                tokens: ratio_count(text, token_constants::GEMINI_CHARS_PER_TOKEN),
                method,
                accuracy: Accuracy::Estimated,
            },
            CountMethod::Approximate => self.approximate(text, method),
        }
    }

    /// Grapheme-based approximation; also the fallback for a failed exact
    /// count (the requested method is kept, accuracy says approximate)
    fn approximate(&self, text: &str, method: CountMethod) -> TokenCount {
        let graphemes = text.graphemes(true).count();
        let tokens =
            (graphemes as f64 / token_constants::APPROX_CHARS_PER_TOKEN).ceil() as usize;
        TokenCount {
            tokens: tokens.max(if text.is_empty() { 0 } else { 1 }),
            method,
            accuracy: Accuracy::Approximate,
        }
    }
}

impl Default for TokenCounter {
    fn default() -> Self {
        Self::new(TokenCounterConfig::default())
    }
}

fn ratio_count(text: &str, chars_per_token: f64) -> usize {
    let chars = text.chars().count();
    (chars as f64 / chars_per_token).ceil() as usize
}

fn cache_key(method: CountMethod, text: &str) -> u64 {
    let mut hasher = std::collections::hash_map::DefaultHasher::new();
    method.hash(&mut hasher);
    text.hash(&mut hasher);
    hasher.finish()
}

#[cfg(test)]
mod tests {
    use super::*;
    use mnemon_core::MessageRole;

    #[test]
    fn test_approximate_count() {
        let counter = TokenCounter::default();
        // 28 graphemes / 4 = 7
        let count = counter.count("Hello, how are you today????", CountMethod::Approximate);
        assert_eq!(count.tokens, 7);
        assert_eq!(count.accuracy, Accuracy::Approximate);
    }

    #[test]
    fn test_estimated_divisors() {
        let counter = TokenCounter::default();
        let text = "x".repeat(38);
        let anthropic = counter.count(&text, CountMethod::EstimatedAnthropic);
        let gemini = counter.count(&text, CountMethod::EstimatedGemini);
        // ceil(38 / 3.5) = 11, ceil(38 / 3.8) = 10
        assert_eq!(anthropic.tokens, 11);
        assert_eq!(gemini.tokens, 10);
        assert_eq!(anthropic.method.label(), "estimated");
    }

    #[test]
    fn test_exact_without_tokenizer_falls_back() {
        let counter = TokenCounter::default();
        let count = counter.count("fallback please", CountMethod::Exact);
        assert_eq!(count.method, CountMethod::Exact);
        assert_eq!(count.accuracy, Accuracy::Approximate);
        assert!(count.tokens > 0);
    }

    #[test]
    fn test_count_message_formats_role() {
        let counter = TokenCounter::default();
        let msg = mnemon_core::NormalizedMessage::new("m1", MessageRole::User, "Hello");
        let direct = counter.count("user: Hello", CountMethod::Approximate);
        let via_message = counter.count_message(&msg, CountMethod::Approximate);
        assert_eq!(direct.tokens, via_message.tokens);
    }

    #[test]
    fn test_count_conversation_sums_messages() {
        let counter = TokenCounter::default();
        let conv = test_conversation(&["Hello there", "Hi, how can I help?", "Tell me a story"]);

        let total = counter.count_conversation(&conv, CountMethod::Approximate);
        let expected: usize = conv
            .messages
            .iter()
            .map(|m| counter.count_message(m, CountMethod::Approximate).tokens)
            .sum();
        assert_eq!(total.tokens, expected);
    }

    #[test]
    fn test_cache_hits() {
        let counter = TokenCounter::default();
        counter.count("repeated text", CountMethod::Approximate);
        counter.count("repeated text", CountMethod::Approximate);
        let stats = counter.cache_stats();
        assert_eq!(stats.hits, 1);
        assert_eq!(stats.misses, 1);
    }

    #[test]
    fn test_methods_do_not_share_cache_entries() {
        let counter = TokenCounter::default();
        counter.count("same text", CountMethod::Approximate);
        counter.count("same text", CountMethod::EstimatedAnthropic);
        let stats = counter.cache_stats();
        assert_eq!(stats.hits, 0);
        assert_eq!(stats.misses, 2);
    }

    #[test]
    fn test_recommended_method() {
        assert_eq!(
            TokenCounter::recommended_method("openai/gpt-4o"),
            CountMethod::Exact
        );
        assert_eq!(
            TokenCounter::recommended_method("Anthropic Claude"),
            CountMethod::EstimatedAnthropic
        );
        assert_eq!(
            TokenCounter::recommended_method("google-gemini-pro"),
            CountMethod::EstimatedGemini
        );
        assert_eq!(
            TokenCounter::recommended_method("llama-3"),
            CountMethod::Approximate
        );
    }

    fn test_conversation(contents: &[&str]) -> NormalizedConversation {
        let now = chrono::Utc::now();
        NormalizedConversation {
            id: "conv-1".to_string(),
            provider: "test".to_string(),
            external_id: None,
            title: None,
            created_at: now,
            updated_at: now,
            messages: contents
                .iter()
                .enumerate()
                .map(|(i, c)| {
                    mnemon_core::NormalizedMessage::new(
                        format!("m{i}"),
                        if i % 2 == 0 {
                            MessageRole::User
                        } else {
                            MessageRole::Assistant
                        },
                        *c,
                    )
                })
                .collect(),
            raw_metadata: Default::default(),
        }
    }
}
