//! Conversation validation
//!
//! Validation collects every defect in a conversation before reporting; it
//! never short-circuits, so a caller sees the full repair list at once.

use serde::{Deserialize, Serialize};

use mnemon_core::NormalizedConversation;

/// A single validation defect
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ValidationError {
    /// Dotted path of the offending field, e.g. `messages[2].id`
    pub field: String,
    pub message: String,
    pub conversation_id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message_id: Option<String>,
}

/// Result of validating one conversation
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ValidationReport {
    pub valid: bool,
    pub errors: Vec<ValidationError>,
}

/// Outcome of validating a batch
#[derive(Debug, Clone)]
pub struct BatchValidation {
    pub valid_conversations: Vec<NormalizedConversation>,
    pub invalid_conversations: Vec<(NormalizedConversation, Vec<ValidationError>)>,
}

/// Structural validator for normalized conversations
#[derive(Debug, Clone, Copy, Default)]
pub struct ConversationValidator;

impl ConversationValidator {
    pub fn new() -> Self {
        Self
    }

    /// Validate one conversation, collecting all errors
    pub fn validate(&self, conv: &NormalizedConversation) -> ValidationReport {
        let mut errors = Vec::new();

        if conv.provider.trim().is_empty() {
            errors.push(ValidationError {
                field: "provider".to_string(),
                message: "provider must be non-empty".to_string(),
                conversation_id: conv.id.clone(),
                message_id: None,
            });
        }

        if conv.id.trim().is_empty() {
            errors.push(ValidationError {
                field: "id".to_string(),
                message: "conversation id must be non-empty".to_string(),
                conversation_id: conv.id.clone(),
                message_id: None,
            });
        }

        if conv.messages.is_empty() {
            errors.push(ValidationError {
                field: "messages".to_string(),
                message: "conversation must contain at least one message".to_string(),
                conversation_id: conv.id.clone(),
                message_id: None,
            });
        }

        if conv.updated_at < conv.created_at {
            errors.push(ValidationError {
                field: "updated_at".to_string(),
                message: "updated_at must not precede created_at".to_string(),
                conversation_id: conv.id.clone(),
                message_id: None,
            });
        }

        let mut seen_ids = std::collections::HashSet::new();
        for (index, message) in conv.messages.iter().enumerate() {
            if message.id.trim().is_empty() {
                errors.push(ValidationError {
                    field: format!("messages[{index}].id"),
                    message: "message id must be non-empty".to_string(),
                    conversation_id: conv.id.clone(),
                    message_id: None,
                });
            } else if !seen_ids.insert(message.id.clone()) {
                errors.push(ValidationError {
                    field: format!("messages[{index}].id"),
                    message: format!("duplicate message id '{}'", message.id),
                    conversation_id: conv.id.clone(),
                    message_id: Some(message.id.clone()),
                });
            }
        }

        ValidationReport {
            valid: errors.is_empty(),
            errors,
        }
    }

    /// Partition a batch into valid and invalid conversations
    pub fn validate_batch(&self, conversations: Vec<NormalizedConversation>) -> BatchValidation {
        let mut valid_conversations = Vec::new();
        let mut invalid_conversations = Vec::new();

        for conv in conversations {
            let report = self.validate(&conv);
            if report.valid {
                valid_conversations.push(conv);
            } else {
                invalid_conversations.push((conv, report.errors));
            }
        }

        BatchValidation {
            valid_conversations,
            invalid_conversations,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Duration, Utc};
    use mnemon_core::{MessageRole, NormalizedMessage};

    fn conversation() -> NormalizedConversation {
        let now = Utc::now();
        NormalizedConversation {
            id: "conv-1".to_string(),
            provider: "openai".to_string(),
            external_id: None,
            title: None,
            created_at: now,
            updated_at: now,
            messages: vec![NormalizedMessage::new("m1", MessageRole::User, "Hello")],
            raw_metadata: Default::default(),
        }
    }

    #[test]
    fn test_valid_conversation() {
        let report = ConversationValidator::new().validate(&conversation());
        assert!(report.valid);
        assert!(report.errors.is_empty());
    }

    #[test]
    fn test_all_errors_collected() {
        let mut conv = conversation();
        conv.provider = String::new();
        conv.messages.clear();
        conv.updated_at = conv.created_at - Duration::seconds(10);

        let report = ConversationValidator::new().validate(&conv);
        assert!(!report.valid);
        // No short-circuit: every broken field is reported
        let fields: Vec<&str> = report.errors.iter().map(|e| e.field.as_str()).collect();
        assert!(fields.contains(&"provider"));
        assert!(fields.contains(&"messages"));
        assert!(fields.contains(&"updated_at"));
    }

    #[test]
    fn test_duplicate_message_ids_rejected() {
        let mut conv = conversation();
        conv.messages
            .push(NormalizedMessage::new("m1", MessageRole::Assistant, "Hi"));

        let report = ConversationValidator::new().validate(&conv);
        assert!(!report.valid);
        assert_eq!(report.errors[0].message_id.as_deref(), Some("m1"));
    }

    #[test]
    fn test_empty_content_is_permitted() {
        let mut conv = conversation();
        conv.messages[0].content = String::new();
        assert!(ConversationValidator::new().validate(&conv).valid);
    }

    #[test]
    fn test_batch_partition() {
        let good = conversation();
        let mut bad = conversation();
        bad.id = "conv-2".to_string();
        bad.messages.clear();

        let batch = ConversationValidator::new().validate_batch(vec![good, bad]);
        assert_eq!(batch.valid_conversations.len(), 1);
        assert_eq!(batch.invalid_conversations.len(), 1);
        assert_eq!(batch.invalid_conversations[0].0.id, "conv-2");
        assert!(!batch.invalid_conversations[0].1.is_empty());
    }
}
