//! Backend trait and request/response types

use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::LlmError;

/// Sampling and deadline parameters for one completion
#[derive(Debug, Clone)]
pub struct CompletionParams {
    pub max_tokens: usize,
    pub temperature: f32,
    /// Overall deadline for the call, including retries and queue time
    pub timeout: Option<Duration>,
}

impl Default for CompletionParams {
    fn default() -> Self {
        Self {
            max_tokens: 1024,
            temperature: 0.2,
            timeout: None,
        }
    }
}

/// A callable function exposed to the model
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FunctionSpec {
    pub name: String,
    pub description: String,
    /// JSON schema of the arguments object
    pub parameters: serde_json::Value,
}

/// A tool call requested by the model
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolCall {
    pub name: String,
    pub arguments: serde_json::Value,
}

/// Raw completion as returned by a backend, before any cleanup
#[derive(Debug, Clone, Default)]
pub struct RawCompletion {
    pub text: String,
    pub tool_calls: Vec<ToolCall>,
    pub prompt_tokens: usize,
    pub completion_tokens: usize,
}

/// One request handed to a backend
#[derive(Debug, Clone)]
pub struct BackendRequest {
    pub prompt: String,
    pub system: Option<String>,
    pub functions: Vec<FunctionSpec>,
    pub params: CompletionParams,
}

impl BackendRequest {
    pub fn text(prompt: impl Into<String>, params: CompletionParams) -> Self {
        Self {
            prompt: prompt.into(),
            system: None,
            functions: Vec::new(),
            params,
        }
    }
}

/// An LLM backend; implementations perform a single request with no retry
/// (the provider owns retry and queue policy)
#[async_trait]
pub trait CompletionBackend: Send + Sync {
    fn provider_name(&self) -> &str;

    async fn complete(&self, request: &BackendRequest) -> Result<RawCompletion, LlmError>;
}
