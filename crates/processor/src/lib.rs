//! Command processing and import orchestration
//!
//! The synchronous command path: validate, retrieve context, ask the LLM,
//! persist, emit `command_processed`, then extract memories from the
//! exchange in the background. The import path fans a payload through
//! parsing, validation, chunking, per-chunk extraction, deduplication, and
//! persistence, with a per-chunk breakdown in the report.
//!
//! Collaborators (storage, embedder, provider, extraction) are constructor
//! arguments; `assembly` wires a default stack at the process boundary.

pub mod assembly;
pub mod events;
pub mod import;
pub mod processor;

pub use assembly::{build_default, init_tracing, Assembly};
pub use events::{EventBus, ProcessorEvent};
pub use import::{ChunkReport, ConversationImport, ImportConfig, ImportPipeline, ImportSummary};
pub use processor::{CommandProcessor, ProcessorConfig};
