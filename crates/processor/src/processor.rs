//! Command processor

use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;

use mnemon_core::{
    Action, CommandRequest, CommandResponse, EmbeddingProvider, Error, MemoryReference,
    MessageRole, NormalizedConversation, NormalizedMessage, Result, ScoredMemory, StorageClient,
};
use mnemon_extraction::{ExtractionConfig, ExtractionStrategy};
use mnemon_llm::{CompletionParams, CompletionProvider, FunctionSpec};
use mnemon_retrieval::ContextBuilder;

use crate::events::{EventBus, ProcessorEvent};

/// Command processor configuration
#[derive(Debug, Clone)]
pub struct ProcessorConfig {
    pub max_tokens: usize,
    pub temperature: f32,
    /// Deadline for the whole command (context LLM call included)
    pub timeout: Option<Duration>,
    /// Host actions the model may request; empty disables action extraction
    pub action_functions: Vec<FunctionSpec>,
    /// Parameters for the background extraction pass
    pub extraction: ExtractionConfig,
}

impl Default for ProcessorConfig {
    fn default() -> Self {
        Self {
            max_tokens: 1024,
            temperature: 0.4,
            timeout: Some(Duration::from_secs(60)),
            action_functions: Vec::new(),
            extraction: ExtractionConfig::default(),
        }
    }
}

/// End-to-end command handler
pub struct CommandProcessor {
    storage: Arc<dyn StorageClient>,
    embedder: Arc<dyn EmbeddingProvider>,
    context_builder: Arc<ContextBuilder>,
    provider: Arc<CompletionProvider>,
    extraction: Arc<ExtractionStrategy>,
    events: EventBus,
    config: ProcessorConfig,
}

impl CommandProcessor {
    pub fn new(
        storage: Arc<dyn StorageClient>,
        embedder: Arc<dyn EmbeddingProvider>,
        context_builder: Arc<ContextBuilder>,
        provider: Arc<CompletionProvider>,
        extraction: Arc<ExtractionStrategy>,
        config: ProcessorConfig,
    ) -> Self {
        Self {
            storage,
            embedder,
            context_builder,
            provider,
            extraction,
            events: EventBus::new(),
            config,
        }
    }

    /// Subscribe to `command_processed` events
    pub fn subscribe(&self) -> tokio::sync::broadcast::Receiver<ProcessorEvent> {
        self.events.subscribe()
    }

    /// Handle one command: validate, retrieve, complete, persist, emit,
    /// then schedule background memory extraction over the exchange
    pub async fn process_command(
        &self,
        workspace_id: &str,
        request: CommandRequest,
    ) -> Result<CommandResponse> {
        validate_request(&request)?;

        let retrieved = self
            .context_builder
            .build_context_with_fallbacks(&request.text, workspace_id)
            .await?;

        let prompt = compose_prompt(&retrieved.context, &request.text);
        let params = CompletionParams {
            max_tokens: self.config.max_tokens,
            temperature: self.config.temperature,
            timeout: self.config.timeout,
        };
        let assistant_text = self.provider.complete(&prompt, params.clone()).await?;
        let actions = self.extract_actions(&prompt, params).await;

        let memories_used: Vec<MemoryReference> =
            retrieved.memories.iter().map(to_reference).collect();
        let response = CommandResponse {
            command_id: request.command_id.clone(),
            assistant_text,
            actions,
            memories_used: memories_used.clone(),
        };

        self.storage
            .save_command(&request, &response, &memories_used)
            .await?;

        self.events.emit(ProcessorEvent::CommandProcessed {
            response: response.clone(),
        });

        self.spawn_background_extraction(workspace_id.to_string(), &request, &response);

        tracing::info!(
            command_id = %response.command_id,
            memories = memories_used.len(),
            "command processed"
        );
        Ok(response)
    }

    /// Extract and persist memories from a (request, response) exchange.
    /// Used as the background pass after a command; failures are logged and
    /// never surfaced to the command path.
    pub async fn extract_and_persist(
        &self,
        workspace_id: &str,
        request: &CommandRequest,
        response: &CommandResponse,
    ) -> Result<usize> {
        let conversation = exchange_conversation(request, response);
        let (memories, relationships) = self
            .extraction
            .extract(&conversation, workspace_id, &self.config.extraction)
            .await
            .map_err(mnemon_core::Error::from)?;

        let mut created = 0;
        for mut memory in memories {
            memory.embedding = Some(self.embedder.embed(&memory.content).await?);
            self.storage.create_memory(memory).await?;
            created += 1;
        }
        for relationship in relationships {
            if let Err(e) = self.storage.create_relationship(relationship).await {
                tracing::warn!(error = %e, "skipping relationship with dead endpoint");
            }
        }
        Ok(created)
    }

    /// Ask the model for a host action via function calling; a model that
    /// declines to call anything simply yields no actions
    async fn extract_actions(&self, prompt: &str, params: CompletionParams) -> Vec<Action> {
        if self.config.action_functions.is_empty() {
            return Vec::new();
        }
        match self
            .provider
            .complete_with_functions(prompt, &self.config.action_functions, params)
            .await
        {
            Ok(call) => vec![Action {
                action_type: call.name,
                params: call.arguments,
            }],
            Err(e) => {
                tracing::debug!(error = %e, "no action extracted");
                Vec::new()
            }
        }
    }

    fn spawn_background_extraction(
        &self,
        workspace_id: String,
        request: &CommandRequest,
        response: &CommandResponse,
    ) {
        let storage = self.storage.clone();
        let embedder = self.embedder.clone();
        let extraction = self.extraction.clone();
        let config = self.config.extraction.clone();
        let request = request.clone();
        let response = response.clone();

        tokio::spawn(async move {
            let conversation = exchange_conversation(&request, &response);
            let extracted = extraction
                .extract(&conversation, &workspace_id, &config)
                .await;

            let (memories, relationships) = match extracted {
                Ok(pair) => pair,
                Err(e) => {
                    tracing::warn!(command_id = %request.command_id, error = %e, "background extraction failed");
                    return;
                }
            };

            for mut memory in memories {
                match embedder.embed(&memory.content).await {
                    Ok(embedding) => memory.embedding = Some(embedding),
                    Err(e) => {
                        tracing::warn!(error = %e, "embedding failed, storing memory without vector");
                    }
                }
                if let Err(e) = storage.create_memory(memory).await {
                    tracing::warn!(error = %e, "failed to persist extracted memory");
                }
            }
            for relationship in relationships {
                if let Err(e) = storage.create_relationship(relationship).await {
                    tracing::warn!(error = %e, "failed to persist extracted relationship");
                }
            }
        });
    }
}

fn validate_request(request: &CommandRequest) -> Result<()> {
    for (field, value) in [
        ("user_id", &request.user_id),
        ("command_id", &request.command_id),
        ("text", &request.text),
    ] {
        if value.trim().is_empty() {
            return Err(Error::Validation(format!("{field} must be non-empty")));
        }
    }
    Ok(())
}

fn compose_prompt(context: &str, text: &str) -> String {
    if context.is_empty() {
        return text.to_string();
    }
    format!("Relevant memories about this user:\n{context}\n\nUser request: {text}")
}

fn to_reference(scored: &ScoredMemory) -> MemoryReference {
    MemoryReference {
        id: scored.memory.id.clone(),
        memory_type: scored.memory.memory_type.clone(),
        score: scored.score,
        summary: scored.memory.summary(),
        metadata: None,
    }
}

/// Wrap a command exchange as a two-message conversation for extraction
fn exchange_conversation(
    request: &CommandRequest,
    response: &CommandResponse,
) -> NormalizedConversation {
    let now = Utc::now();
    let id = format!("command-{}", request.command_id);
    let mut user = NormalizedMessage::new(
        format!("{id}-m0"),
        MessageRole::User,
        request.text.clone(),
    );
    user.created_at = request.timestamp;
    let assistant = NormalizedMessage::new(
        format!("{id}-m1"),
        MessageRole::Assistant,
        response.assistant_text.clone(),
    );

    NormalizedConversation {
        id,
        provider: "command".to_string(),
        external_id: Some(request.command_id.clone()),
        title: None,
        created_at: request.timestamp.min(now),
        updated_at: now,
        messages: vec![user, assistant],
        raw_metadata: std::collections::HashMap::from([(
            "user_id".to_string(),
            serde_json::Value::String(request.user_id.clone()),
        )]),
    }
}
