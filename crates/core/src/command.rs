//! Command request/response types
//!
//! The command surface is the synchronous entry point: a user request comes
//! in, relevant memories are retrieved, the LLM answers, and the exchange is
//! persisted. These types are also what the dashboard event stream carries.

use std::collections::HashMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::memory::MemoryType;

/// An incoming user command
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CommandRequest {
    pub user_id: String,
    pub command_id: String,
    pub text: String,
    pub timestamp: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub screen_context: Option<HashMap<String, serde_json::Value>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub meta: Option<HashMap<String, serde_json::Value>>,
}

impl CommandRequest {
    pub fn new(
        user_id: impl Into<String>,
        command_id: impl Into<String>,
        text: impl Into<String>,
    ) -> Self {
        Self {
            user_id: user_id.into(),
            command_id: command_id.into(),
            text: text.into(),
            timestamp: Utc::now(),
            screen_context: None,
            meta: None,
        }
    }
}

/// An action the assistant asked the host to perform
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Action {
    #[serde(rename = "type")]
    pub action_type: String,
    #[serde(default)]
    pub params: serde_json::Value,
}

/// Reference to a memory that informed a response
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MemoryReference {
    pub id: String,
    #[serde(rename = "type")]
    pub memory_type: MemoryType,
    pub score: f32,
    pub summary: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub metadata: Option<serde_json::Value>,
}

/// The assistant's answer to a command
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CommandResponse {
    pub command_id: String,
    pub assistant_text: String,
    #[serde(default)]
    pub actions: Vec<Action>,
    #[serde(default)]
    pub memories_used: Vec<MemoryReference>,
}
