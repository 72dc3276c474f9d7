//! Extraction prompt construction

use mnemon_core::{MemoryType, NormalizedMessage, RelationshipType};

use crate::registry::MemoryTypeRegistry;
use crate::types::PreviousChunkContext;

const ENTITY_INSTRUCTIONS: &str = "entity: People, organizations, projects, files, tools, and \
other named things. Set metadata.entity_type (e.g. person, file, project) and metadata.name to \
the canonical name.";

const FACT_INSTRUCTIONS: &str = "fact: Durable statements about the user or their world that \
remain true beyond this conversation. Prefer specific, self-contained sentences.";

const DECISION_INSTRUCTIONS: &str = "decision: Choices that were made, including what was decided \
and, when stated, why. Skip options that were merely discussed.";

/// Build the prompt for one extraction call
///
/// Messages are rendered as `"{ROLE}: {content}"` blocks; per-type
/// instructions follow, and earlier chunks' memories are summarized up front
/// so the model avoids duplicating them.
pub fn build_extraction_prompt(
    messages: &[NormalizedMessage],
    memory_types: &[MemoryType],
    registry: &MemoryTypeRegistry,
    previous: Option<&PreviousChunkContext>,
) -> String {
    let mut prompt = String::new();

    if let Some(previous) = previous.filter(|p| !p.is_empty()) {
        prompt.push_str("Memories already extracted from earlier parts of this conversation:\n");
        for (index, (memory_type, content)) in previous.summaries.iter().enumerate() {
            prompt.push_str(&format!("{}. [{}] {}\n", index + 1, memory_type, content));
        }
        prompt.push_str(
            "Do not extract duplicates of the memories above. When a relationship involves one \
             of them, refer to it by its position in the list above in your reasoning, but only \
             emit relationships between newly extracted memories.\n\n",
        );
    }

    prompt.push_str("Extract memories from this conversation:\n\n");
    let transcript: Vec<String> = messages
        .iter()
        .map(|m| format!("{}: {}", m.role.as_str().to_uppercase(), m.content))
        .collect();
    prompt.push_str(&transcript.join("\n\n"));

    prompt.push_str("\n\nExtract the following memory types:\n");
    for memory_type in memory_types {
        let instructions = match memory_type.as_str() {
            "entity" => ENTITY_INSTRUCTIONS.to_string(),
            "fact" => FACT_INSTRUCTIONS.to_string(),
            "decision" => DECISION_INSTRUCTIONS.to_string(),
            name => match registry.get(name) {
                Some(custom) => format!("{name}: {}", custom.extraction_prompt),
                None => format!("{name}: Extract memories of this type."),
            },
        };
        prompt.push_str(&format!("- {instructions}\n"));
    }

    prompt.push_str(&format!(
        "\nAlso extract relationships between the memories you produce, as \
         (from_memory_index, to_memory_index, relationship_type) triples indexing into your \
         memories array. Known relationship types: {}. Assign a confidence between 0 and 1 to \
         every memory and relationship.",
        RelationshipType::KNOWN.join(", ")
    ));

    prompt
}
