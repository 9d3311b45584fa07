//! Metadata-aware chunking, vector index backends, and per-job memory.

pub mod document;
pub mod fusion;
pub mod in_memory_index;
pub mod job;
#[cfg(any(test, feature = "mock"))]
pub mod mock;
pub mod qdrant_index;
pub mod tokens;
pub mod vector_index;

pub use in_memory_index::InMemoryVectorIndex;
pub use qdrant_index::QdrantVectorIndex;
pub use tokens::estimate_tokens;
pub use vector_index::{
    IndexStats, RetrievalResult, SearchFilter, VectorIndex, VectorIndexError, index_name,
};
