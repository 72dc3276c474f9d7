//! Completion provider: retry, queueing, structured output

use std::sync::Arc;
use std::time::Duration;

use serde::de::DeserializeOwned;
use serde_json::Value;
use tokio::time::Instant;

use mnemon_config::constants::retry as retry_constants;
use mnemon_config::RetrySettings;

use crate::backend::{BackendRequest, CompletionBackend, CompletionParams, FunctionSpec, RawCompletion};
use crate::clean::clean_structured_response;
use crate::queue::RateLimitGate;
use crate::LlmError;

/// Retry and backoff policy
#[derive(Debug, Clone)]
pub struct RetryConfig {
    pub max_retries: u32,
    pub initial_delay: Duration,
    pub max_delay: Duration,
    pub backoff_multiplier: f64,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_retries: retry_constants::MAX_RETRIES,
            initial_delay: Duration::from_millis(retry_constants::INITIAL_DELAY_MS),
            max_delay: Duration::from_millis(retry_constants::MAX_DELAY_MS),
            backoff_multiplier: retry_constants::BACKOFF_MULTIPLIER,
        }
    }
}

impl From<&RetrySettings> for RetryConfig {
    fn from(settings: &RetrySettings) -> Self {
        Self {
            max_retries: settings.max_retries,
            initial_delay: Duration::from_millis(settings.initial_delay_ms),
            max_delay: Duration::from_millis(settings.max_delay_ms),
            backoff_multiplier: settings.backoff_multiplier,
        }
    }
}

/// The extracted function call from a function-mode completion
#[derive(Debug, Clone, PartialEq)]
pub struct FunctionCallResult {
    pub name: String,
    pub arguments: Value,
}

/// Wraps a backend with retry, rate-limit queueing, deadlines, and the
/// structured/function completion modes
pub struct CompletionProvider {
    backend: Arc<dyn CompletionBackend>,
    retry: RetryConfig,
    gate: Arc<RateLimitGate>,
}

impl CompletionProvider {
    pub fn new(backend: Arc<dyn CompletionBackend>, retry: RetryConfig) -> Self {
        Self {
            backend,
            retry,
            gate: Arc::new(RateLimitGate::new()),
        }
    }

    /// Share an existing gate; callers hitting the same provider must use
    /// one gate so the reset window and queue are process-wide
    pub fn with_gate(mut self, gate: Arc<RateLimitGate>) -> Self {
        self.gate = gate;
        self
    }

    pub fn provider_name(&self) -> &str {
        self.backend.provider_name()
    }

    /// Plain text completion
    pub async fn complete(
        &self,
        prompt: &str,
        params: CompletionParams,
    ) -> Result<String, LlmError> {
        let request = BackendRequest::text(prompt, params);
        Ok(self.execute(&request).await?.text)
    }

    /// Structured completion: the response is cleaned, validated against
    /// `schema`, and deserialized into `T`
    pub async fn complete_structured<T: DeserializeOwned>(
        &self,
        prompt: &str,
        schema: &Value,
        params: CompletionParams,
    ) -> Result<T, LlmError> {
        let prompt = format!(
            "{prompt}\n\nRespond with a single JSON object conforming to this JSON schema. \
             Output only the JSON.\n{schema}"
        );
        let request = BackendRequest::text(prompt, params);
        let raw = self.execute(&request).await?.text;

        let cleaned = clean_structured_response(&raw);
        let value: Value = serde_json::from_str(&cleaned)
            .map_err(|e| LlmError::invalid_response(format!("response is not JSON: {e}"), &raw))?;

        let compiled = jsonschema::JSONSchema::compile(schema)
            .map_err(|e| LlmError::Configuration(format!("invalid output schema: {e}")))?;
        if let Err(mut errors) = compiled.validate(&value) {
            let detail = errors
                .next()
                .map(|e| e.to_string())
                .unwrap_or_else(|| "schema validation failed".to_string());
            return Err(LlmError::invalid_response(
                format!("response violates schema: {detail}"),
                &raw,
            ));
        }

        serde_json::from_value(value)
            .map_err(|e| LlmError::invalid_response(format!("response shape mismatch: {e}"), &raw))
    }

    /// Function-mode completion: exactly one tool call is expected
    pub async fn complete_with_functions(
        &self,
        prompt: &str,
        functions: &[FunctionSpec],
        params: CompletionParams,
    ) -> Result<FunctionCallResult, LlmError> {
        let request = BackendRequest {
            prompt: prompt.to_string(),
            system: None,
            functions: functions.to_vec(),
            params,
        };
        let completion = self.execute(&request).await?;

        completion
            .tool_calls
            .into_iter()
            .next()
            .map(|call| FunctionCallResult {
                name: call.name,
                arguments: call.arguments,
            })
            .ok_or_else(|| {
                LlmError::invalid_response("model returned no tool call", completion.text)
            })
    }

    /// Run one request under retry, queue, and deadline discipline
    async fn execute(&self, request: &BackendRequest) -> Result<RawCompletion, LlmError> {
        let deadline = request.params.timeout.map(|t| Instant::now() + t);
        let mut delay = self.retry.initial_delay;
        let mut last_error: Option<LlmError> = None;

        for attempt in 0..=self.retry.max_retries {
            if attempt > 0 {
                // Rate-limited attempts wait in the gate instead of backing off
                if !matches!(last_error, Some(LlmError::RateLimited { .. })) {
                    self.sleep_within_deadline(delay, deadline).await?;
                    delay = Duration::from_secs_f64(
                        (delay.as_secs_f64() * self.retry.backoff_multiplier)
                            .min(self.retry.max_delay.as_secs_f64()),
                    );
                }
            }

            // Park behind any active rate limit, FIFO. A deadline expiring
            // here abandons the queue slot without re-parking.
            match deadline {
                Some(d) => {
                    if tokio::time::timeout_at(d, self.gate.admit()).await.is_err() {
                        return Err(LlmError::Cancelled);
                    }
                }
                None => self.gate.admit().await,
            }

            let result = match deadline {
                Some(d) => match tokio::time::timeout_at(d, self.backend.complete(request)).await {
                    Ok(result) => result,
                    Err(_) => return Err(LlmError::Cancelled),
                },
                None => self.backend.complete(request).await,
            };

            match result {
                Ok(completion) => return Ok(completion),
                Err(LlmError::RateLimited { retry_after }) => {
                    tracing::warn!(
                        provider = self.provider_name(),
                        retry_after_ms = retry_after.as_millis() as u64,
                        attempt,
                        "rate limited"
                    );
                    self.gate.report_rate_limited(retry_after);
                    last_error = Some(LlmError::RateLimited { retry_after });
                }
                Err(e) if e.is_retryable() => {
                    tracing::warn!(
                        provider = self.provider_name(),
                        error = %e,
                        attempt,
                        "transient failure, will retry"
                    );
                    last_error = Some(e);
                }
                Err(e) => return Err(e),
            }
        }

        // Retry budget exhausted; a terminal rate limit surfaces as an LLM
        // error rather than leaking queue internals
        Err(match last_error {
            Some(LlmError::RateLimited { .. }) => LlmError::Api {
                provider: self.provider_name().to_string(),
                message: "rate limit retry budget exhausted".to_string(),
            },
            Some(e) => e,
            None => LlmError::Network("retry budget exhausted".to_string()),
        })
    }

    async fn sleep_within_deadline(
        &self,
        delay: Duration,
        deadline: Option<Instant>,
    ) -> Result<(), LlmError> {
        if let Some(deadline) = deadline {
            if Instant::now() + delay >= deadline {
                return Err(LlmError::Cancelled);
            }
        }
        tokio::time::sleep(delay).await;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use parking_lot::Mutex;
    use serde::Deserialize;
    use serde_json::json;
    use std::collections::VecDeque;
    use std::sync::atomic::{AtomicUsize, Ordering};

    struct MockBackend {
        script: Mutex<VecDeque<Result<RawCompletion, LlmError>>>,
        calls: AtomicUsize,
        delay: Duration,
    }

    impl MockBackend {
        fn scripted(script: Vec<Result<RawCompletion, LlmError>>) -> Self {
            Self {
                script: Mutex::new(script.into()),
                calls: AtomicUsize::new(0),
                delay: Duration::ZERO,
            }
        }

        fn text(content: &str) -> Result<RawCompletion, LlmError> {
            Ok(RawCompletion {
                text: content.to_string(),
                ..Default::default()
            })
        }

        fn calls(&self) -> usize {
            self.calls.load(Ordering::SeqCst)
        }
    }

    #[async_trait]
    impl CompletionBackend for MockBackend {
        fn provider_name(&self) -> &str {
            "mock"
        }

        async fn complete(&self, _request: &BackendRequest) -> Result<RawCompletion, LlmError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            if !self.delay.is_zero() {
                tokio::time::sleep(self.delay).await;
            }
            self.script
                .lock()
                .pop_front()
                .unwrap_or_else(|| MockBackend::text("default"))
        }
    }

    fn provider(backend: Arc<MockBackend>) -> CompletionProvider {
        CompletionProvider::new(
            backend,
            RetryConfig {
                max_retries: 2,
                initial_delay: Duration::from_millis(10),
                max_delay: Duration::from_millis(100),
                backoff_multiplier: 2.0,
            },
        )
    }

    fn server_error() -> LlmError {
        LlmError::Server {
            provider: "mock".to_string(),
            message: "boom".to_string(),
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_retries_server_errors() {
        let backend = Arc::new(MockBackend::scripted(vec![
            Err(server_error()),
            MockBackend::text("recovered"),
        ]));
        let provider = provider(backend.clone());

        let text = provider
            .complete("hi", CompletionParams::default())
            .await
            .unwrap();
        assert_eq!(text, "recovered");
        assert_eq!(backend.calls(), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn test_api_errors_not_retried() {
        let backend = Arc::new(MockBackend::scripted(vec![Err(LlmError::Api {
            provider: "mock".to_string(),
            message: "bad request".to_string(),
        })]));
        let provider = provider(backend.clone());

        let result = provider.complete("hi", CompletionParams::default()).await;
        assert!(matches!(result, Err(LlmError::Api { .. })));
        assert_eq!(backend.calls(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_retry_budget_exhausted() {
        let backend = Arc::new(MockBackend::scripted(vec![
            Err(server_error()),
            Err(server_error()),
            Err(server_error()),
        ]));
        let provider = provider(backend.clone());

        let result = provider.complete("hi", CompletionParams::default()).await;
        assert!(matches!(result, Err(LlmError::Server { .. })));
        // max_retries = 2 means three attempts total
        assert_eq!(backend.calls(), 3);
    }

    #[tokio::test(start_paused = true)]
    async fn test_rate_limited_calls_complete_in_fifo_order() {
        // First call is rate limited with a 1 s hint; both calls must then
        // succeed in submission order, at least 1 s after the start
        let backend = Arc::new(MockBackend::scripted(vec![
            Err(LlmError::RateLimited {
                retry_after: Duration::from_secs(1),
            }),
            MockBackend::text("first"),
            MockBackend::text("second"),
        ]));
        let provider = Arc::new(provider(backend.clone()));

        let start = Instant::now();
        let order = Arc::new(Mutex::new(Vec::new()));

        let mut handles = Vec::new();
        for label in ["first", "second"] {
            let provider = provider.clone();
            let order = order.clone();
            handles.push(tokio::spawn(async move {
                let text = provider
                    .complete("hi", CompletionParams::default())
                    .await
                    .unwrap();
                order.lock().push((label, text, start.elapsed()));
            }));
            // Ensure submission order is deterministic
            tokio::time::sleep(Duration::from_millis(1)).await;
        }
        for handle in handles {
            handle.await.unwrap();
        }

        let order = order.lock();
        assert_eq!(order[0].0, "first");
        assert_eq!(order[1].0, "second");
        for (_, text, elapsed) in order.iter() {
            assert!(
                *elapsed >= Duration::from_secs(1),
                "completed after {elapsed:?}"
            );
            assert!(text == "first" || text == "second");
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_deadline_cancels_slow_call() {
        let backend = Arc::new(MockBackend {
            script: Mutex::new(VecDeque::new()),
            calls: AtomicUsize::new(0),
            delay: Duration::from_secs(5),
        });
        let provider = provider(backend);

        let params = CompletionParams {
            timeout: Some(Duration::from_millis(100)),
            ..Default::default()
        };
        let result = provider.complete("hi", params).await;
        assert!(matches!(result, Err(LlmError::Cancelled)));
    }

    #[derive(Debug, Deserialize, PartialEq)]
    struct Extraction {
        memories: Vec<MemoryRow>,
    }

    #[derive(Debug, Deserialize, PartialEq)]
    struct MemoryRow {
        content: String,
        confidence: f64,
    }

    fn extraction_schema() -> Value {
        json!({
            "type": "object",
            "properties": {
                "memories": {
                    "type": "array",
                    "items": {
                        "type": "object",
                        "properties": {
                            "content": {"type": "string"},
                            "confidence": {"type": "number"}
                        },
                        "required": ["content", "confidence"]
                    }
                }
            },
            "required": ["memories"]
        })
    }

    #[tokio::test(start_paused = true)]
    async fn test_structured_completion_cleans_fences() {
        let raw = "```json\n{\"memories\": [{\"content\": \"x\", \"confidence\": 0.9}]}\n```";
        let backend = Arc::new(MockBackend::scripted(vec![MockBackend::text(raw)]));
        let provider = provider(backend);

        let extraction: Extraction = provider
            .complete_structured("extract", &extraction_schema(), CompletionParams::default())
            .await
            .unwrap();
        assert_eq!(extraction.memories.len(), 1);
        assert_eq!(extraction.memories[0].content, "x");
    }

    #[tokio::test(start_paused = true)]
    async fn test_structured_completion_schema_violation() {
        let raw = "{\"memories\": [{\"content\": 42, \"confidence\": \"high\"}]}";
        let backend = Arc::new(MockBackend::scripted(vec![MockBackend::text(raw)]));
        let provider = provider(backend);

        let result: Result<Extraction, _> = provider
            .complete_structured("extract", &extraction_schema(), CompletionParams::default())
            .await;
        match result {
            Err(LlmError::InvalidResponse { raw_response, .. }) => {
                assert!(raw_response.unwrap().contains("42"));
            }
            other => panic!("expected InvalidResponse, got {other:?}"),
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_function_call_extracted() {
        let backend = Arc::new(MockBackend::scripted(vec![Ok(RawCompletion {
            tool_calls: vec![crate::backend::ToolCall {
                name: "open_file".to_string(),
                arguments: json!({"path": "README.md"}),
            }],
            ..Default::default()
        })]));
        let provider = provider(backend);

        let call = provider
            .complete_with_functions(
                "open the readme",
                &[FunctionSpec {
                    name: "open_file".to_string(),
                    description: "Open a file".to_string(),
                    parameters: json!({"type": "object"}),
                }],
                CompletionParams::default(),
            )
            .await
            .unwrap();
        assert_eq!(call.name, "open_file");
        assert_eq!(call.arguments["path"], "README.md");
    }

    #[tokio::test(start_paused = true)]
    async fn test_missing_tool_call_is_parse_error() {
        let backend = Arc::new(MockBackend::scripted(vec![MockBackend::text(
            "I decided not to call anything",
        )]));
        let provider = provider(backend);

        let result = provider
            .complete_with_functions("do it", &[], CompletionParams::default())
            .await;
        assert!(matches!(result, Err(LlmError::InvalidResponse { .. })));
    }
}
