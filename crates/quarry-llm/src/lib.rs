//! Embedding and reranker service boundaries.
//!
//! [`content`] is the decoding point for generation-service responses.

pub mod any;
pub mod cache;
pub mod content;
pub mod error;
pub mod http;
#[cfg(feature = "mock")]
pub mod mock;
pub mod openai;
pub mod provider;
pub mod rerank;
mod retry;

pub use any::AnyReranker;
pub use cache::{CacheStats, CachedEmbeddings};
pub use content::ContentBlock;
pub use error::LlmError;
pub use openai::OpenAiEmbeddings;
pub use provider::{EmbeddingProvider, Reranker};
pub use rerank::{HttpReranker, TermOverlapReranker};
