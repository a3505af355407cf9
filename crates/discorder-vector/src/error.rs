use thiserror::Error;

#[derive(Debug, Error)]
pub enum VectorError {
    #[error("vector store connection error: {0}")]
    Connection(String),

    #[error("vector store error: {0}")]
    Store(String),

    #[error("vector dimension mismatch: expected {expected}, got {got}")]
    DimensionMismatch { expected: usize, got: usize },
}

pub type Result<T> = std::result::Result<T, VectorError>;
