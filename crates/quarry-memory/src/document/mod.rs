pub mod chunker;
pub mod error;
pub mod heading;
pub mod loader;
pub mod tokenizer;
pub mod types;

pub use chunker::{
    ChunkStatistics, Chunker, ChunkerConfig, DirectoryChunks, FileFailure, token_windows,
};
pub use error::DocumentError;
pub use loader::{DocumentLoader, TextLoader};
pub use tokenizer::{TiktokenCounter, TokenCounter};
pub use types::{Chunk, ChunkMetadata, Document, Paragraph, UNKNOWN, chunk_id};

/// Default maximum file size: 50 MiB.
pub const DEFAULT_MAX_FILE_SIZE: u64 = 50 * 1024 * 1024;
