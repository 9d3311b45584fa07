#[derive(Debug, thiserror::Error)]
pub enum DocumentError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("unsupported format: {0}")]
    UnsupportedFormat(String),

    #[error("file too large: {0} bytes")]
    FileTooLarge(u64),

    #[error("tokenizer error: {0}")]
    Tokenizer(String),

    #[error("invalid chunker config: {0}")]
    InvalidConfig(String),
}
