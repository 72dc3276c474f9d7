//! OpenAI-compatible HTTP backend
//!
//! Works with OpenAI and any server speaking the `/chat/completions`
//! protocol (vLLM, Ollama's compat endpoint, gateways). One request, no
//! retry; the provider layer owns retry and queueing.

use std::time::Duration;

use async_trait::async_trait;
use reqwest::{Client, StatusCode};
use serde::{Deserialize, Serialize};

use mnemon_config::constants::retry as retry_constants;
use mnemon_config::LlmSettings;

use crate::backend::{BackendRequest, CompletionBackend, RawCompletion, ToolCall};
use crate::LlmError;

/// Configuration for the HTTP backend
#[derive(Debug, Clone)]
pub struct HttpBackendConfig {
    pub endpoint: String,
    pub api_key: String,
    pub model: String,
    /// Socket-level timeout; caller deadlines are enforced above this
    pub timeout: Duration,
}

impl Default for HttpBackendConfig {
    fn default() -> Self {
        Self {
            endpoint: "https://api.openai.com/v1".to_string(),
            api_key: String::new(),
            model: "gpt-4o-mini".to_string(),
            timeout: Duration::from_secs(60),
        }
    }
}

impl From<&LlmSettings> for HttpBackendConfig {
    fn from(settings: &LlmSettings) -> Self {
        Self {
            endpoint: settings.endpoint.clone(),
            api_key: settings.api_key.clone().unwrap_or_default(),
            model: settings.model.clone(),
            timeout: Duration::from_secs(settings.timeout_secs),
        }
    }
}

/// OpenAI-compatible chat-completions backend
pub struct HttpBackend {
    config: HttpBackendConfig,
    client: Client,
}

impl HttpBackend {
    pub fn new(config: HttpBackendConfig) -> Result<Self, LlmError> {
        if config.api_key.is_empty() && !config.endpoint.starts_with("http://localhost") {
            return Err(LlmError::Configuration(
                "API key required for remote endpoints".to_string(),
            ));
        }

        let client = Client::builder()
            .timeout(config.timeout)
            .build()
            .map_err(|e| LlmError::Configuration(format!("failed to create HTTP client: {e}")))?;

        Ok(Self { config, client })
    }

    fn chat_url(&self) -> String {
        format!(
            "{}/chat/completions",
            self.config.endpoint.trim_end_matches('/')
        )
    }

    fn build_request(&self, request: &BackendRequest) -> ChatRequest {
        let mut messages = Vec::new();
        if let Some(system) = &request.system {
            messages.push(ChatMessage {
                role: "system".to_string(),
                content: Some(system.clone()),
            });
        }
        messages.push(ChatMessage {
            role: "user".to_string(),
            content: Some(request.prompt.clone()),
        });

        let tools: Vec<ToolSpec> = request
            .functions
            .iter()
            .map(|f| ToolSpec {
                kind: "function".to_string(),
                function: FunctionPayload {
                    name: f.name.clone(),
                    description: f.description.clone(),
                    parameters: f.parameters.clone(),
                },
            })
            .collect();

        ChatRequest {
            model: self.config.model.clone(),
            messages,
            max_tokens: Some(request.params.max_tokens),
            temperature: Some(request.params.temperature),
            tools: if tools.is_empty() { None } else { Some(tools) },
        }
    }
}

#[async_trait]
impl CompletionBackend for HttpBackend {
    fn provider_name(&self) -> &str {
        "openai"
    }

    async fn complete(&self, request: &BackendRequest) -> Result<RawCompletion, LlmError> {
        let response = self
            .client
            .post(self.chat_url())
            .bearer_auth(&self.config.api_key)
            .json(&self.build_request(request))
            .send()
            .await?;

        let status = response.status();
        if status == StatusCode::TOO_MANY_REQUESTS {
            let retry_after = parse_retry_after(&response);
            return Err(LlmError::RateLimited { retry_after });
        }
        if status.is_server_error() {
            let body = response.text().await.unwrap_or_default();
            return Err(LlmError::Server {
                provider: self.provider_name().to_string(),
                message: format!("HTTP {status}: {body}"),
            });
        }
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(LlmError::Api {
                provider: self.provider_name().to_string(),
                message: format!("HTTP {status}: {body}"),
            });
        }

        let body: ChatResponse = response
            .json()
            .await
            .map_err(|e| LlmError::InvalidResponse {
                message: e.to_string(),
                raw_response: None,
            })?;

        let choice = body
            .choices
            .into_iter()
            .next()
            .ok_or_else(|| LlmError::InvalidResponse {
                message: "no choices in response".to_string(),
                raw_response: None,
            })?;

        let tool_calls = choice
            .message
            .tool_calls
            .unwrap_or_default()
            .into_iter()
            .map(|call| {
                let arguments = serde_json::from_str(&call.function.arguments)
                    .unwrap_or(serde_json::Value::Null);
                ToolCall {
                    name: call.function.name,
                    arguments,
                }
            })
            .collect();

        let usage = body.usage.unwrap_or_default();
        Ok(RawCompletion {
            text: choice.message.content.unwrap_or_default(),
            tool_calls,
            prompt_tokens: usage.prompt_tokens,
            completion_tokens: usage.completion_tokens,
        })
    }
}

/// Parse a retry hint from the `Retry-After` header (seconds), defaulting
/// to the configured window when the provider gives none
fn parse_retry_after(response: &reqwest::Response) -> Duration {
    response
        .headers()
        .get("retry-after")
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.trim().parse::<f64>().ok())
        .map(|secs| Duration::from_millis((secs * 1000.0) as u64))
        .unwrap_or(Duration::from_millis(retry_constants::DEFAULT_RETRY_AFTER_MS))
}

// OpenAI API types

#[derive(Debug, Serialize)]
struct ChatRequest {
    model: String,
    messages: Vec<ChatMessage>,
    #[serde(skip_serializing_if = "Option::is_none")]
    max_tokens: Option<usize>,
    #[serde(skip_serializing_if = "Option::is_none")]
    temperature: Option<f32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    tools: Option<Vec<ToolSpec>>,
}

#[derive(Debug, Serialize)]
struct ToolSpec {
    #[serde(rename = "type")]
    kind: String,
    function: FunctionPayload,
}

#[derive(Debug, Serialize)]
struct FunctionPayload {
    name: String,
    description: String,
    parameters: serde_json::Value,
}

#[derive(Debug, Serialize, Deserialize)]
struct ChatMessage {
    role: String,
    #[serde(default)]
    content: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ChatResponse {
    choices: Vec<Choice>,
    #[serde(default)]
    usage: Option<Usage>,
}

#[derive(Debug, Deserialize)]
struct Choice {
    message: ResponseMessage,
}

#[derive(Debug, Deserialize)]
struct ResponseMessage {
    #[serde(default)]
    content: Option<String>,
    #[serde(default)]
    tool_calls: Option<Vec<ResponseToolCall>>,
}

#[derive(Debug, Deserialize)]
struct ResponseToolCall {
    function: ResponseFunction,
}

#[derive(Debug, Deserialize)]
struct ResponseFunction {
    name: String,
    arguments: String,
}

#[derive(Debug, Deserialize, Default)]
struct Usage {
    #[serde(default)]
    prompt_tokens: usize,
    #[serde(default)]
    completion_tokens: usize,
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::{CompletionParams, FunctionSpec};
    use serde_json::json;

    fn backend() -> HttpBackend {
        HttpBackend::new(HttpBackendConfig {
            api_key: "test-key".to_string(),
            ..Default::default()
        })
        .unwrap()
    }

    #[test]
    fn test_remote_endpoint_requires_key() {
        let result = HttpBackend::new(HttpBackendConfig::default());
        assert!(matches!(result, Err(LlmError::Configuration(_))));

        let local = HttpBackend::new(HttpBackendConfig {
            endpoint: "http://localhost:11434/v1".to_string(),
            ..Default::default()
        });
        assert!(local.is_ok());
    }

    #[test]
    fn test_chat_url() {
        assert_eq!(
            backend().chat_url(),
            "https://api.openai.com/v1/chat/completions"
        );
    }

    #[test]
    fn test_request_serialization() {
        let backend = backend();
        let request = BackendRequest {
            prompt: "Hello".to_string(),
            system: Some("You extract memories".to_string()),
            functions: vec![FunctionSpec {
                name: "store_memory".to_string(),
                description: "Store a memory".to_string(),
                parameters: json!({"type": "object", "properties": {}}),
            }],
            params: CompletionParams::default(),
        };

        let chat = backend.build_request(&request);
        let body = serde_json::to_value(&chat).unwrap();
        assert_eq!(body["messages"][0]["role"], "system");
        assert_eq!(body["messages"][1]["content"], "Hello");
        assert_eq!(body["tools"][0]["type"], "function");
        assert_eq!(body["tools"][0]["function"]["name"], "store_memory");
    }

    #[test]
    fn test_response_parsing() {
        let raw = json!({
            "choices": [{
                "message": {
                    "content": "All done",
                    "tool_calls": [{
                        "function": {"name": "store_memory", "arguments": "{\"key\": 1}"}
                    }]
                }
            }],
            "usage": {"prompt_tokens": 12, "completion_tokens": 4}
        });

        let parsed: ChatResponse = serde_json::from_value(raw).unwrap();
        assert_eq!(parsed.choices.len(), 1);
        let message = &parsed.choices[0].message;
        assert_eq!(message.content.as_deref(), Some("All done"));
        assert_eq!(
            message.tool_calls.as_ref().unwrap()[0].function.name,
            "store_memory"
        );
    }
}
