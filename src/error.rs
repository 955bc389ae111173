use std::path::PathBuf;

pub type Result<T> = std::result::Result<T, Error>;

#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("configuration error: {0}")]
    Config(String),

    #[error("unsupported document type: '{extension}'")]
    UnsupportedFormat { extension: String },

    #[error("failed to extract text from {}: {reason}", path.display())]
    Extraction { path: PathBuf, reason: String },

    #[error("embedding service error: {0}")]
    EmbeddingService(String),

    #[error("embedding dimension mismatch: expected {expected}, got {actual}")]
    DimensionMismatch { expected: usize, actual: usize },

    #[error("embedding {0} has a non-finite component")]
    NonFiniteEmbedding(String),

    #[error("pipeline has already failed; start a new one")]
    PipelineFailed,

    #[error("generation failed: {0}")]
    Generation(String),

    #[error("tensor computation error: {0}")]
    Tensor(#[from] candle_core::Error),
}
