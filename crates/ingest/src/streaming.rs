//! Incremental conversation assembly
//!
//! A `StreamingBuilder` accumulates a conversation from live capture:
//! complete messages, or token deltas appended to a pending message.
//! Mutators take `&mut self`, so single-writer access is enforced by the
//! borrow checker; share a builder across tasks behind a mutex if needed.

use chrono::{DateTime, Utc};
use uuid::Uuid;

use mnemon_core::{MessageRole, NormalizedConversation, NormalizedMessage};

use crate::IngestError;

/// Snapshot of builder progress
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BuilderState {
    pub conversation_id: String,
    pub message_count: usize,
    pub is_finalized: bool,
}

struct PendingMessage {
    id: String,
    role: MessageRole,
    content: String,
    created_at: DateTime<Utc>,
}

/// Builds a conversation incrementally, then freezes it
pub struct StreamingBuilder {
    conversation_id: String,
    provider: String,
    created_at: DateTime<Utc>,
    messages: Vec<NormalizedMessage>,
    pending: Option<PendingMessage>,
    finalized: Option<NormalizedConversation>,
}

impl StreamingBuilder {
    pub fn new(provider: impl Into<String>) -> Self {
        Self {
            conversation_id: Uuid::new_v4().to_string(),
            provider: provider.into(),
            created_at: Utc::now(),
            messages: Vec::new(),
            pending: None,
            finalized: None,
        }
    }

    /// Append a complete message. Any pending partial message is closed
    /// first so message order follows arrival order.
    pub fn add_message(
        &mut self,
        role: MessageRole,
        content: impl Into<String>,
    ) -> Result<&NormalizedMessage, IngestError> {
        self.ensure_open()?;
        self.close_pending();

        let message = NormalizedMessage::new(Uuid::new_v4().to_string(), role, content);
        self.messages.push(message);
        Ok(self.messages.last().expect("just pushed"))
    }

    /// Append a content delta to the pending message with `id`, starting a
    /// new pending assistant message when none exists yet.
    ///
    /// Deltas are append-only; a delta for a different id than the current
    /// pending message is rejected.
    pub fn add_partial_message_delta(
        &mut self,
        id: &str,
        content_chunk: &str,
    ) -> Result<(), IngestError> {
        self.ensure_open()?;

        match &mut self.pending {
            Some(pending) if pending.id == id => {
                pending.content.push_str(content_chunk);
                Ok(())
            }
            Some(pending) => Err(IngestError::Validation(format!(
                "delta targets message '{id}' but '{}' is pending",
                pending.id
            ))),
            None => {
                self.pending = Some(PendingMessage {
                    id: id.to_string(),
                    role: MessageRole::Assistant,
                    content: content_chunk.to_string(),
                    created_at: Utc::now(),
                });
                Ok(())
            }
        }
    }

    /// Close the builder and return the conversation.
    ///
    /// Idempotent: repeated calls return the same snapshot. Fails when no
    /// message was ever added.
    pub fn finalize(
        &mut self,
        raw_metadata: std::collections::HashMap<String, serde_json::Value>,
    ) -> Result<NormalizedConversation, IngestError> {
        if let Some(conversation) = &self.finalized {
            return Ok(conversation.clone());
        }

        self.close_pending();
        if self.messages.is_empty() {
            return Err(IngestError::Validation(
                "cannot finalize a conversation with no messages".to_string(),
            ));
        }

        let updated_at = self
            .messages
            .last()
            .map(|m| m.created_at)
            .unwrap_or(self.created_at)
            .max(self.created_at);

        let conversation = NormalizedConversation {
            id: self.conversation_id.clone(),
            provider: self.provider.clone(),
            external_id: None,
            title: None,
            created_at: self.created_at,
            updated_at,
            messages: std::mem::take(&mut self.messages),
            raw_metadata,
        };

        self.finalized = Some(conversation.clone());
        Ok(conversation)
    }

    pub fn get_state(&self) -> BuilderState {
        let message_count = match &self.finalized {
            Some(conversation) => conversation.messages.len(),
            None => self.messages.len() + usize::from(self.pending.is_some()),
        };
        BuilderState {
            conversation_id: self.conversation_id.clone(),
            message_count,
            is_finalized: self.finalized.is_some(),
        }
    }

    fn ensure_open(&self) -> Result<(), IngestError> {
        if self.finalized.is_some() {
            Err(IngestError::BuilderFinalized)
        } else {
            Ok(())
        }
    }

    fn close_pending(&mut self) {
        if let Some(pending) = self.pending.take() {
            let mut message = NormalizedMessage::new(pending.id, pending.role, pending.content);
            message.created_at = pending.created_at;
            self.messages.push(message);
        }
    }
}
