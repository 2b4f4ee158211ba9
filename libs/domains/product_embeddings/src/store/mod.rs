//! Vector store backends
//!
//! - [`InMemoryVectorStore`]: process-local map, used by tests and one-shot runs
//! - [`JsonFileVectorStore`]: the in-memory store persisted to a JSON snapshot

mod file;
mod memory;

pub use file::JsonFileVectorStore;
pub use memory::{InMemoryVectorStore, cosine_similarity};
