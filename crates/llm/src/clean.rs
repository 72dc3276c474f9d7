//! Structured-response cleanup
//!
//! Models asked for JSON still wrap it in markdown often enough that the
//! parse path needs two recovery branches, applied in order:
//!
//! 1. Fenced code blocks are stripped (```json ... ```).
//! 2. If the remainder still isn't JSON but carries `## Section` headers,
//!    the known sections are mapped onto the output schema:
//!    `entities`/`facts`/`decisions` become typed `memories[]` rows and
//!    `relationships` becomes `relationships[]`.
//!
//! Anything else is returned as-is and fails upstream with a parse error
//! that carries the raw body.

use serde_json::{json, Map, Value};

/// Default confidence assigned to plain-text section rows
const SECTION_ROW_CONFIDENCE: f64 = 0.8;

/// Clean a raw model response into (hopefully) parseable JSON
pub fn clean_structured_response(raw: &str) -> String {
    let stripped = strip_code_fences(raw.trim());

    if serde_json::from_str::<Value>(&stripped).is_ok() {
        return stripped;
    }

    if stripped.lines().any(|line| line.trim_start().starts_with("## ")) {
        if let Some(mapped) = map_sections(&stripped) {
            return mapped;
        }
    }

    stripped
}

/// Extract the contents of the first fenced code block, if any
fn strip_code_fences(raw: &str) -> String {
    let Some(open) = raw.find("```") else {
        return raw.to_string();
    };
    let after_open = &raw[open + 3..];
    let Some(close) = after_open.find("```") else {
        return raw.to_string();
    };

    let mut block = &after_open[..close];
    // Drop a language tag like `json` on the opening fence line
    if let Some(newline) = block.find('\n') {
        let first_line = block[..newline].trim();
        if !first_line.is_empty() && first_line.chars().all(|c| c.is_ascii_alphanumeric()) {
            block = &block[newline + 1..];
        }
    }
    block.trim().to_string()
}

/// Map `## Section` bodies onto the extraction output schema
fn map_sections(text: &str) -> Option<String> {
    let mut memories = Vec::new();
    let mut relationships = Vec::new();
    let mut matched_any = false;

    for (header, body) in sections(text) {
        let header = header.to_lowercase();
        let memory_type = match header.as_str() {
            "entities" | "entity" => Some("entity"),
            "facts" | "fact" => Some("fact"),
            "decisions" | "decision" => Some("decision"),
            _ => None,
        };

        if let Some(memory_type) = memory_type {
            matched_any = true;
            for item in section_items(&body) {
                memories.push(typed_memory_row(item, memory_type));
            }
        } else if header == "relationships" {
            matched_any = true;
            for item in section_items(&body) {
                // Relationship rows are only usable as structured objects
                if item.is_object() {
                    relationships.push(item);
                }
            }
        }
    }

    if !matched_any {
        return None;
    }

    Some(json!({ "memories": memories, "relationships": relationships }).to_string())
}

/// Split markdown into (header, body) pairs
fn sections(text: &str) -> Vec<(String, String)> {
    let mut out: Vec<(String, String)> = Vec::new();
    for line in text.lines() {
        let trimmed = line.trim_start();
        if let Some(header) = trimmed.strip_prefix("## ") {
            out.push((header.trim().to_string(), String::new()));
        } else if let Some((_, body)) = out.last_mut() {
            body.push_str(line);
            body.push('\n');
        }
    }
    out
}

/// Parse a section body: a whole-body JSON array, or bullet rows that are
/// each either a JSON object or plain text
fn section_items(body: &str) -> Vec<Value> {
    let trimmed = body.trim();
    if let Ok(Value::Array(items)) = serde_json::from_str::<Value>(trimmed) {
        return items;
    }

    trimmed
        .lines()
        .filter_map(|line| {
            let line = line.trim();
            let item = line
                .strip_prefix("- ")
                .or_else(|| line.strip_prefix("* "))?
                .trim();
            if item.is_empty() {
                return None;
            }
            match serde_json::from_str::<Value>(item) {
                Ok(value) if value.is_object() => Some(value),
                _ => Some(Value::String(item.to_string())),
            }
        })
        .collect()
}

/// Coerce a section row into a typed memory object
fn typed_memory_row(item: Value, memory_type: &str) -> Value {
    match item {
        Value::Object(mut obj) => {
            obj.entry("type".to_string())
                .or_insert_with(|| Value::String(memory_type.to_string()));
            obj.entry("confidence".to_string())
                .or_insert_with(|| json!(SECTION_ROW_CONFIDENCE));
            obj.entry("metadata".to_string())
                .or_insert_with(|| Value::Object(Map::new()));
            Value::Object(obj)
        }
        Value::String(content) => json!({
            "type": memory_type,
            "content": content,
            "confidence": SECTION_ROW_CONFIDENCE,
            "metadata": {}
        }),
        other => json!({
            "type": memory_type,
            "content": other.to_string(),
            "confidence": SECTION_ROW_CONFIDENCE,
            "metadata": {}
        }),
    }
}
