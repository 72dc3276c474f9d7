//! Payload import entry point
//!
//! Accepts a raw UTF-8 JSON payload, enforces size and conversation-count
//! limits, detects (or is told) the provider, parses, and validates. Two
//! failure postures: `strict` turns any invalid conversation into a batch
//! error; otherwise invalid conversations are skipped and reported.

use serde_json::Value;

use mnemon_config::IngestSettings;
use mnemon_core::NormalizedConversation;

use crate::parser::ParserRegistry;
use crate::validator::{ConversationValidator, ValidationError};
use crate::IngestError;

/// Import behavior switches
#[derive(Debug, Clone, Copy, Default)]
pub struct ImportOptions {
    /// Fail the whole batch when any conversation is invalid
    pub strict: bool,
}

/// Payload limits
#[derive(Debug, Clone, Copy)]
pub struct ImportLimits {
    pub max_file_size: usize,
    pub max_conversations: usize,
}

impl Default for ImportLimits {
    fn default() -> Self {
        Self {
            max_file_size: mnemon_config::constants::ingest::MAX_FILE_SIZE,
            max_conversations: mnemon_config::constants::ingest::MAX_CONVERSATIONS_PER_FILE,
        }
    }
}

impl From<&IngestSettings> for ImportLimits {
    fn from(settings: &IngestSettings) -> Self {
        Self {
            max_file_size: settings.max_file_size,
            max_conversations: settings.max_conversations_per_file,
        }
    }
}

/// A conversation rejected by validation, with its defects
#[derive(Debug, Clone)]
pub struct InvalidConversation {
    pub conversation: NormalizedConversation,
    pub errors: Vec<ValidationError>,
}

/// Outcome of a successful import
#[derive(Debug, Clone)]
pub struct ImportReport {
    pub provider: String,
    pub conversations: Vec<NormalizedConversation>,
    /// Conversations skipped in non-strict mode
    pub invalid: Vec<InvalidConversation>,
}

/// Import a JSON payload of chat exports
///
/// `provider` pins the parser; `None` auto-detects over the registry.
pub fn import_json(
    payload: &str,
    provider: Option<&str>,
    registry: &ParserRegistry,
    options: ImportOptions,
    limits: ImportLimits,
) -> Result<ImportReport, IngestError> {
    if payload.len() > limits.max_file_size {
        return Err(IngestError::FileTooLarge {
            size: payload.len(),
            limit: limits.max_file_size,
        });
    }

    let raw: Value = serde_json::from_str(payload).map_err(|e| IngestError::Parse {
        provider: provider.unwrap_or("unknown").to_string(),
        message: format!("invalid JSON: {e}"),
    })?;

    let parser = match provider {
        Some(name) => registry.get(name)?,
        None => registry.detect(&raw)?,
    };

    let conversations = parser.parse(&raw)?;
    if conversations.len() > limits.max_conversations {
        return Err(IngestError::TooManyConversations {
            count: conversations.len(),
            limit: limits.max_conversations,
        });
    }

    let batch = ConversationValidator::new().validate_batch(conversations);

    if options.strict && !batch.invalid_conversations.is_empty() {
        let detail: Vec<String> = batch
            .invalid_conversations
            .iter()
            .flat_map(|(conv, errors)| {
                errors
                    .iter()
                    .map(move |e| format!("{}: {} ({})", conv.id, e.message, e.field))
            })
            .collect();
        return Err(IngestError::Validation(detail.join("; ")));
    }

    if batch.valid_conversations.is_empty() {
        return Err(IngestError::Validation(
            "no valid conversations in payload".to_string(),
        ));
    }

    tracing::info!(
        provider = parser.provider(),
        valid = batch.valid_conversations.len(),
        invalid = batch.invalid_conversations.len(),
        "imported payload"
    );

    Ok(ImportReport {
        provider: parser.provider().to_string(),
        conversations: batch.valid_conversations,
        invalid: batch
            .invalid_conversations
            .into_iter()
            .map(|(conversation, errors)| InvalidConversation {
                conversation,
                errors,
            })
            .collect(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn openai_payload() -> String {
        json!({
            "mapping": {
                "n1": {
                    "message": {
                        "author": {"role": "user"},
                        "content": {"parts": ["Hello"]},
                        "create_time": 1234567890
                    },
                    "parent": null,
                    "children": []
                }
            },
            "title": "T"
        })
        .to_string()
    }

    #[test]
    fn test_import_with_detection() {
        let registry = ParserRegistry::with_builtins();
        let report = import_json(
            &openai_payload(),
            None,
            &registry,
            ImportOptions::default(),
            ImportLimits::default(),
        )
        .unwrap();

        assert_eq!(report.provider, "openai");
        assert_eq!(report.conversations.len(), 1);
        assert!(report.invalid.is_empty());
    }

    #[test]
    fn test_import_with_pinned_provider() {
        let registry = ParserRegistry::with_builtins();
        let result = import_json(
            &openai_payload(),
            Some("anthropic"),
            &registry,
            ImportOptions::default(),
            ImportLimits::default(),
        );
        // The anthropic parser does not understand an OpenAI payload
        assert!(matches!(result, Err(IngestError::Parse { .. })));
    }

    #[test]
    fn test_file_too_large() {
        let registry = ParserRegistry::with_builtins();
        let limits = ImportLimits {
            max_file_size: 10,
            max_conversations: 100,
        };
        let result = import_json(
            &openai_payload(),
            None,
            &registry,
            ImportOptions::default(),
            limits,
        );
        assert!(matches!(result, Err(IngestError::FileTooLarge { .. })));
    }

    #[test]
    fn test_too_many_conversations() {
        let registry = ParserRegistry::with_builtins();
        let payload = format!("[{},{}]", openai_payload(), openai_payload());
        let limits = ImportLimits {
            max_file_size: usize::MAX,
            max_conversations: 1,
        };
        let result = import_json(
            &payload,
            None,
            &registry,
            ImportOptions::default(),
            limits,
        );
        assert!(matches!(
            result,
            Err(IngestError::TooManyConversations { count: 2, limit: 1 })
        ));
    }

    #[test]
    fn test_invalid_json() {
        let registry = ParserRegistry::with_builtins();
        let result = import_json(
            "{not json",
            None,
            &registry,
            ImportOptions::default(),
            ImportLimits::default(),
        );
        assert!(matches!(result, Err(IngestError::Parse { .. })));
    }
}
