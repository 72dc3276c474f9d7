//! Custom memory-type registry
//!
//! Beyond the built-in `entity`/`fact`/`decision` types, callers can
//! register domain types (e.g. `preference`, `context.screen`) with their
//! own extraction prompt and metadata schema. The registry is process-wide
//! and safe for concurrent readers.

use dashmap::DashMap;
use serde_json::Value;

use mnemon_core::MemoryType;

use crate::ExtractionError;

/// A registered custom memory type
#[derive(Debug, Clone)]
pub struct CustomMemoryType {
    /// Must match the registration name (lowercased)
    pub type_name: String,
    /// Instructions appended to the extraction prompt for this type
    pub extraction_prompt: String,
    /// JSON schema of the type's metadata object
    pub schema: Value,
}

/// Registry of custom memory types
#[derive(Debug, Default)]
pub struct MemoryTypeRegistry {
    types: DashMap<String, CustomMemoryType>,
}

impl MemoryTypeRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a custom memory type; names are case-insensitive
    pub fn register_memory_type(
        &self,
        name: &str,
        config: CustomMemoryType,
    ) -> Result<(), ExtractionError> {
        let name = name.trim().to_lowercase();
        if name.is_empty() {
            return Err(ExtractionError::InvalidTypeRegistration(
                "type name must be non-empty".to_string(),
            ));
        }
        if MemoryType::BUILTIN_ROOTS.contains(&name.as_str()) {
            return Err(ExtractionError::InvalidTypeRegistration(format!(
                "'{name}' conflicts with a default memory type"
            )));
        }
        if config.type_name.to_lowercase() != name {
            return Err(ExtractionError::InvalidTypeRegistration(format!(
                "config type '{}' does not match registration name '{name}'",
                config.type_name
            )));
        }
        if config.extraction_prompt.trim().is_empty() {
            return Err(ExtractionError::InvalidTypeRegistration(
                "extraction_prompt must be non-empty".to_string(),
            ));
        }
        validate_metadata_schema(&config.schema)?;

        let mut config = config;
        config.type_name = name.clone();
        self.types.insert(name, config);
        Ok(())
    }

    pub fn get(&self, name: &str) -> Option<CustomMemoryType> {
        self.types.get(&name.to_lowercase()).map(|e| e.clone())
    }

    pub fn contains(&self, name: &str) -> bool {
        self.types.contains_key(&name.to_lowercase())
    }

    pub fn names(&self) -> Vec<String> {
        let mut names: Vec<String> = self.types.iter().map(|e| e.key().clone()).collect();
        names.sort();
        names
    }
}

fn validate_metadata_schema(schema: &Value) -> Result<(), ExtractionError> {
    let obj = schema.as_object().ok_or_else(|| {
        ExtractionError::InvalidTypeRegistration("schema must be a JSON object".to_string())
    })?;

    let schema_type = obj.get("type").and_then(Value::as_str).ok_or_else(|| {
        ExtractionError::InvalidTypeRegistration("schema must declare a 'type'".to_string())
    })?;

    if schema_type == "object" && !obj.contains_key("properties") {
        return Err(ExtractionError::InvalidTypeRegistration(
            "object schemas must declare 'properties'".to_string(),
        ));
    }

    Ok(())
}
