//! Configuration for the memory layer
//!
//! Settings are loaded from an optional TOML file layered with
//! `MNEMON_`-prefixed environment variables; every field has a serde default
//! so an empty config is always valid. `constants` carries the tuned numeric
//! defaults shared across crates.

pub mod constants;
pub mod settings;

pub use settings::{
    ChunkingSettings, EmbeddingSettings, IngestSettings, LlmSettings, RetrievalSettings,
    RetrySettings, Settings, TokenSettings,
};

use thiserror::Error;

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("failed to load configuration: {0}")]
    Load(String),

    #[error("invalid configuration: {0}")]
    Invalid(String),
}
