//! In-memory storage client
//!
//! Implements the full `StorageClient` surface against process memory:
//! workspace-scoped maps under a read-write lock, cosine similarity for
//! vector search, and keyword scoring for text search. Used by tests and by
//! assemblies that have not wired a database adapter yet; the semantics
//! (active-only reads, workspace scoping, edge upserts) match what a SQL
//! adapter must provide.

pub mod memory;

pub use memory::InMemoryStorage;
