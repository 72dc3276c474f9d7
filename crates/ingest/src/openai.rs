//! OpenAI chat export parser
//!
//! OpenAI exports store each conversation as a tree of nodes under
//! `mapping`, keyed by node id, with `parent`/`children` links. The tree is
//! linearized depth-first from the root, following each node's `children`
//! order, which reproduces the conversation as displayed.

use std::collections::HashMap;

use chrono::{DateTime, TimeZone, Utc};
use serde::Deserialize;
use serde_json::Value;

use mnemon_core::{MessageRole, NormalizedConversation, NormalizedMessage};

use crate::parser::ChatParser;
use crate::IngestError;

const PROVIDER: &str = "openai";

#[derive(Debug, Deserialize)]
struct ExportNode {
    #[serde(default)]
    message: Option<ExportMessage>,
    #[serde(default)]
    parent: Option<String>,
    #[serde(default)]
    children: Vec<String>,
}

#[derive(Debug, Deserialize)]
struct ExportMessage {
    #[serde(default)]
    id: Option<String>,
    #[serde(default)]
    author: Option<ExportAuthor>,
    #[serde(default)]
    content: Option<ExportContent>,
    #[serde(default)]
    create_time: Option<f64>,
}

#[derive(Debug, Deserialize)]
struct ExportAuthor {
    #[serde(default)]
    role: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ExportContent {
    #[serde(default)]
    parts: Option<Vec<Value>>,
}

/// Parser for OpenAI conversation exports
pub struct OpenAiParser;

impl OpenAiParser {
    pub fn new() -> Self {
        Self
    }

    fn parse_export(
        &self,
        raw: &Value,
        position: usize,
    ) -> Result<NormalizedConversation, IngestError> {
        let obj = raw.as_object().ok_or_else(|| self.err("export is not an object"))?;

        let mapping_value = obj
            .get("mapping")
            .ok_or_else(|| self.err("export has no mapping"))?;
        let mapping: HashMap<String, ExportNode> =
            serde_json::from_value(mapping_value.clone())
                .map_err(|e| self.err(format!("invalid mapping: {e}")))?;

        let external_id = obj
            .get("id")
            .or_else(|| obj.get("conversation_id"))
            .and_then(Value::as_str)
            .map(str::to_string);

        let conversation_id = match &external_id {
            Some(ext) => format!("{PROVIDER}-{ext}"),
            None => format!("{PROVIDER}-conv-{position}"),
        };

        let created_at = obj
            .get("create_time")
            .and_then(Value::as_f64)
            .and_then(epoch_to_datetime)
            .unwrap_or_else(Utc::now);
        let updated_at = obj
            .get("update_time")
            .and_then(Value::as_f64)
            .and_then(epoch_to_datetime)
            .unwrap_or(created_at)
            .max(created_at);

        let mut messages = Vec::new();
        for node_id in linearize(&mapping) {
            let node = &mapping[&node_id];
            let Some(export_msg) = &node.message else {
                continue;
            };
            let Some(role) = export_msg
                .author
                .as_ref()
                .and_then(|a| a.role.as_deref())
                .and_then(MessageRole::parse)
            else {
                continue;
            };
            let Some(content) = join_parts(export_msg.content.as_ref()) else {
                continue;
            };

            let index = messages.len();
            let mut message = NormalizedMessage::new(
                format!("{conversation_id}-m{index}"),
                role,
                content,
            );
            message.created_at = export_msg
                .create_time
                .and_then(epoch_to_datetime)
                .unwrap_or(created_at);
            message
                .raw_metadata
                .insert("node_id".to_string(), Value::String(node_id.clone()));
            if let Some(original) = &export_msg.id {
                message
                    .raw_metadata
                    .insert("original_id".to_string(), Value::String(original.clone()));
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
                "mapping" | "title" | "id" | "conversation_id" | "create_time" | "update_time"
            ) {
                raw_metadata.insert(key.clone(), value.clone());
            }
        }

        Ok(NormalizedConversation {
            id: conversation_id,
            provider: PROVIDER.to_string(),
            external_id,
            title: obj.get("title").and_then(Value::as_str).map(str::to_string),
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

impl Default for OpenAiParser {
    fn default() -> Self {
        Self::new()
    }
}

impl ChatParser for OpenAiParser {
    fn provider(&self) -> &str {
        PROVIDER
    }

    fn can_parse(&self, raw: &Value) -> bool {
        match raw {
            Value::Object(obj) => obj.get("mapping").is_some_and(Value::is_object),
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

/// Depth-first node order from the tree roots, following `children` order
fn linearize(mapping: &HashMap<String, ExportNode>) -> Vec<String> {
    // Roots: nodes whose parent is absent or points outside the mapping.
    // Sorted for determinism; real exports have exactly one root.
    let mut roots: Vec<&String> = mapping
        .iter()
        .filter(|(_, node)| {
            node.parent
                .as_ref()
                .map_or(true, |parent| !mapping.contains_key(parent))
        })
        .map(|(id, _)| id)
        .collect();
    roots.sort();

    let mut order = Vec::with_capacity(mapping.len());
    let mut visited = std::collections::HashSet::with_capacity(mapping.len());
    let mut stack: Vec<&String> = roots.iter().rev().copied().collect();
    while let Some(id) = stack.pop() {
        if !visited.insert(id.clone()) {
            continue; // cycle guard
        }
        order.push(id.clone());
        if let Some(node) = mapping.get(id) {
            for child in node.children.iter().rev() {
                if mapping.contains_key(child) {
                    stack.push(child);
                }
            }
        }
    }
    order
}

fn join_parts(content: Option<&ExportContent>) -> Option<String> {
    let parts = content?.parts.as_ref()?;
    let text: Vec<&str> = parts.iter().filter_map(Value::as_str).collect();
    if text.is_empty() {
        return None;
    }
    Some(text.join("\n"))
}

fn epoch_to_datetime(secs: f64) -> Option<DateTime<Utc>> {
    let whole = secs.trunc() as i64;
    let nanos = ((secs - secs.trunc()) * 1e9) as u32;
    Utc.timestamp_opt(whole, nanos).single()
}
