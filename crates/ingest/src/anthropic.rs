//! Anthropic chat export parser
//!
//! Anthropic exports are flat: each conversation carries a `chat_messages`
//! array in display order, with `sender` values `human`/`assistant`.

use std::collections::HashMap;

use chrono::{DateTime, Utc};
use serde::Deserialize;
use serde_json::Value;

use mnemon_core::{MessageRole, NormalizedConversation, NormalizedMessage};

use crate::parser::ChatParser;
use crate::IngestError;

const PROVIDER: &str = "anthropic";

#[derive(Debug, Deserialize)]
struct ExportMessage {
    #[serde(default)]
    uuid: Option<String>,
    #[serde(default)]
    sender: Option<String>,
    #[serde(default)]
    text: Option<String>,
    #[serde(default)]
    content: Option<Vec<ContentBlock>>,
    #[serde(default)]
    created_at: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ContentBlock {
    #[serde(default)]
    text: Option<String>,
}

/// Parser for Anthropic conversation exports
pub struct AnthropicParser;

impl AnthropicParser {
    pub fn new() -> Self {
        Self
    }

    fn parse_export(
        &self,
        raw: &Value,
        position: usize,
    ) -> Result<NormalizedConversation, IngestError> {
        let obj = raw.as_object().ok_or_else(|| self.err("export is not an object"))?;

        let chat_messages = obj
            .get("chat_messages")
            .and_then(Value::as_array)
            .ok_or_else(|| self.err("export has no chat_messages"))?;

        let external_id = obj.get("uuid").and_then(Value::as_str).map(str::to_string);
        let conversation_id = match &external_id {
            Some(ext) => format!("{PROVIDER}-{ext}"),
            None => format!("{PROVIDER}-conv-{position}"),
        };

        let created_at = obj
            .get("created_at")
            .and_then(Value::as_str)
            .and_then(parse_timestamp)
            .unwrap_or_else(Utc::now);
        let updated_at = obj
            .get("updated_at")
            .and_then(Value::as_str)
            .and_then(parse_timestamp)
            .unwrap_or(created_at)
            .max(created_at);

        let mut messages = Vec::new();
        for raw_message in chat_messages {
            let export: ExportMessage = serde_json::from_value(raw_message.clone())
                .map_err(|e| self.err(format!("invalid chat message: {e}")))?;

            let Some(role) = export.sender.as_deref().and_then(map_sender) else {
                continue;
            };
            let Some(content) = message_text(&export) else {
                continue;
            };

            let index = messages.len();
            let mut message =
                NormalizedMessage::new(format!("{conversation_id}-m{index}"), role, content);
            message.created_at = export
                .created_at
                .as_deref()
                .and_then(parse_timestamp)
                .unwrap_or(created_at);
            if let Some(uuid) = &export.uuid {
                message
                    .raw_metadata
                    .insert("original_id".to_string(), Value::String(uuid.clone()));
            }
            messages.push(message);
        }

        if messages.is_empty() {
            return Err(self.err("export contains no messages"));
        }

        let mut raw_metadata = HashMap::new();
        for (key, value) in obj {
            if !matches!(
                key.as_str(),
                "chat_messages" | "uuid" | "name" | "created_at" | "updated_at"
            ) {
                raw_metadata.insert(key.clone(), value.clone());
            }
        }

        Ok(NormalizedConversation {
            id: conversation_id,
            provider: PROVIDER.to_string(),
            external_id,
            title: obj.get("name").and_then(Value::as_str).map(str::to_string),
            created_at,
            updated_at,
            messages,
            raw_metadata,
        })
    }

    fn err(&self, message: impl Into<String>) -> IngestError {
        IngestError::Parse {
            provider: PROVIDER.to_string(),
            message: message.into(),
        }
    }
}

impl Default for AnthropicParser {
    fn default() -> Self {
        Self::new()
    }
}

impl ChatParser for AnthropicParser {
    fn provider(&self) -> &str {
        PROVIDER
    }

    fn can_parse(&self, raw: &Value) -> bool {
        match raw {
            Value::Object(obj) => obj.get("chat_messages").is_some_and(Value::is_array),
            Value::Array(items) => items.first().is_some_and(|item| self.can_parse(item)),
            _ => false,
        }
    }

    fn parse(&self, raw: &Value) -> Result<Vec<NormalizedConversation>, IngestError> {
        match raw {
            Value::Array(items) => items
                .iter()
                .enumerate()
                .map(|(i, item)| self.parse_export(item, i))
                .collect(),
            _ => Ok(vec![self.parse_export(raw, 0)?]),
        }
    }
}

fn map_sender(sender: &str) -> Option<MessageRole> {
    match sender {
        "human" => Some(MessageRole::User),
        "assistant" => Some(MessageRole::Assistant),
        _ => None,
    }
}

fn message_text(export: &ExportMessage) -> Option<String> {
    if let Some(text) = &export.text {
        return Some(text.clone());
    }
    let blocks = export.content.as_ref()?;
    let parts: Vec<&str> = blocks.iter().filter_map(|b| b.text.as_deref()).collect();
    if parts.is_empty() {
        None
    } else {
        Some(parts.join("\n"))
    }
}

fn parse_timestamp(s: &str) -> Option<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(s)
        .ok()
        .map(|dt| dt.with_timezone(&Utc))
}
