//! Output schema construction
//!
//! The model is constrained to one object: `{memories: [...], relationships:
//! [...]}`. The memory metadata schema merges the default fields of every
//! requested built-in type with the properties of registered custom types;
//! unknown metadata fields are allowed through and preserved.

use serde_json::{json, Map, Value};

use mnemon_core::{MemoryType, RelationshipType};

use crate::registry::MemoryTypeRegistry;

/// Default metadata fields per built-in type
fn builtin_metadata_properties(memory_type: &str) -> Value {
    match memory_type {
        "entity" => json!({
            "entity_type": {"type": "string"},
            "name": {"type": "string"}
        }),
        "fact" => json!({
            "category": {"type": "string"}
        }),
        "decision" => json!({
            "rationale": {"type": "string"}
        }),
        _ => json!({}),
    }
}

/// Build the structured-output schema for one extraction call
pub fn build_output_schema(
    memory_types: &[MemoryType],
    registry: &MemoryTypeRegistry,
) -> Value {
    let type_names: Vec<&str> = memory_types.iter().map(|t| t.as_str()).collect();

    let mut metadata_properties = Map::new();
    for memory_type in memory_types {
        let defaults = builtin_metadata_properties(memory_type.as_str());
        if let Some(defaults) = defaults.as_object() {
            for (key, value) in defaults {
                metadata_properties.insert(key.clone(), value.clone());
            }
        }
        if let Some(custom) = registry.get(memory_type.as_str()) {
            if let Some(properties) = custom.schema.get("properties").and_then(Value::as_object) {
                for (key, value) in properties {
                    metadata_properties.insert(key.clone(), value.clone());
                }
            }
        }
    }

    json!({
        "type": "object",
        "properties": {
            "memories": {
                "type": "array",
                "items": {
                    "type": "object",
                    "properties": {
                        "type": {"type": "string", "enum": type_names},
                        "content": {"type": "string"},
                        "confidence": {"type": "number", "minimum": 0.0, "maximum": 1.0},
                        "metadata": {
                            "type": "object",
                            "properties": Value::Object(metadata_properties),
                            "additionalProperties": true
                        }
                    },
                    "required": ["type", "content", "confidence"]
                }
            },
            "relationships": {
                "type": "array",
                "items": {
                    "type": "object",
                    "properties": {
                        "from_memory_index": {"type": "integer", "minimum": 0},
                        "to_memory_index": {"type": "integer", "minimum": 0},
                        "relationship_type": {"type": "string"},
                        "confidence": {"type": "number", "minimum": 0.0, "maximum": 1.0}
                    },
                    "required": [
                        "from_memory_index",
                        "to_memory_index",
                        "relationship_type",
                        "confidence"
                    ]
                }
            }
        },
        "required": ["memories", "relationships"],
        "$comment": format!("known relationship types: {}", RelationshipType::KNOWN.join(", "))
    })
}
