//! Canonical conversation types
//!
//! Every provider-specific chat export is normalized into these types before
//! any downstream processing (validation, chunking, extraction) happens.

use std::collections::HashMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Role of a message author
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MessageRole {
    User,
    Assistant,
    System,
}

impl MessageRole {
    pub fn as_str(&self) -> &'static str {
        match self {
            MessageRole::User => "user",
            MessageRole::Assistant => "assistant",
            MessageRole::System => "system",
        }
    }

    /// Parse a role string; returns `None` for anything unrecognized
    pub fn parse(s: &str) -> Option<Self> {
        match s.to_lowercase().as_str() {
            "user" => Some(MessageRole::User),
            "assistant" => Some(MessageRole::Assistant),
            "system" => Some(MessageRole::System),
            _ => None,
        }
    }
}

impl std::fmt::Display for MessageRole {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A single normalized chat message
///
/// Immutable once captured; provider fields that have no canonical slot are
/// preserved under `raw_metadata`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NormalizedMessage {
    /// Stable id, derived from provider + external id + position
    pub id: String,
    pub role: MessageRole,
    pub content: String,
    pub created_at: DateTime<Utc>,
    #[serde(default)]
    pub raw_metadata: HashMap<String, serde_json::Value>,
}

impl NormalizedMessage {
    pub fn new(id: impl Into<String>, role: MessageRole, content: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            role,
            content: content.into(),
            created_at: Utc::now(),
            raw_metadata: HashMap::new(),
        }
    }

    /// Render as a single `"{role}: {content}"` line
    pub fn prompt_line(&self) -> String {
        format!("{}: {}", self.role.as_str(), self.content)
    }
}

/// A normalized conversation
///
/// Invariants (enforced by the ingest validator):
/// - `messages` is non-empty
/// - `provider` is non-empty
/// - `updated_at >= created_at`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NormalizedConversation {
    pub id: String,
    pub provider: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub external_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub messages: Vec<NormalizedMessage>,
    #[serde(default)]
    pub raw_metadata: HashMap<String, serde_json::Value>,
}

impl NormalizedConversation {
    /// Ids of all messages, in conversation order
    pub fn message_ids(&self) -> Vec<String> {
        self.messages.iter().map(|m| m.id.clone()).collect()
    }
}
