//! Context retrieval
//!
//! Composes the response context for a command: embed the query, pull
//! candidates from workspace-scoped vector search, drop request/response
//! echoes, boost explicit facts over file-metadata hits, then render the
//! winners into a token-budgeted context string. A fallback cascade keeps
//! the context useful when vector search comes back empty or lopsided.

pub mod boost;
pub mod builder;
pub mod embedder;

pub use boost::{boost_scores, filter_conversational};
pub use builder::{ContextBuilder, RetrievalConfig, RetrievedContext};
pub use embedder::HashEmbedder;
