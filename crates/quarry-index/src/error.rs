use quarry_llm::LlmError;
use quarry_memory::VectorIndexError;
use quarry_memory::document::DocumentError;

#[derive(Debug, thiserror::Error)]
pub enum IndexError {
    #[error("service call failed: {0}")]
    Llm(#[from] LlmError),

    #[error("vector index error: {0}")]
    VectorIndex(#[from] VectorIndexError),

    #[error("document error: {0}")]
    Document(#[from] DocumentError),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("invalid retrieval config: {0}")]
    InvalidConfig(String),
}

pub type Result<T> = std::result::Result<T, IndexError>;
