use thiserror::Error;

#[derive(Debug, Error)]
pub enum DiscorderError {
    #[error("configuration error: {0}")]
    Config(String),

    #[error("server not configured: {server_id}")]
    ServerNotConfigured { server_id: String },

    #[error("database error: {0}")]
    Database(String),

    #[error("model provider error: {0}")]
    ModelProvider(String),

    #[error("vector store error: {0}")]
    VectorStore(String),

    #[error("request timeout after {ms}ms")]
    Timeout { ms: u64 },

    #[error("payload too large: {size} bytes (max {max})")]
    PayloadTooLarge { size: usize, max: usize },

    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("internal error: {0}")]
    Internal(String),
}

impl DiscorderError {
    /// Short error code string for logs and metrics.
    pub fn code(&self) -> &'static str {
        match self {
            DiscorderError::Config(_) => "CONFIG_ERROR",
            DiscorderError::ServerNotConfigured { .. } => "SERVER_NOT_CONFIGURED",
            DiscorderError::Database(_) => "DATABASE_ERROR",
            DiscorderError::ModelProvider(_) => "MODEL_PROVIDER_ERROR",
            DiscorderError::VectorStore(_) => "VECTOR_STORE_ERROR",
            DiscorderError::Timeout { .. } => "TIMEOUT",
            DiscorderError::PayloadTooLarge { .. } => "PAYLOAD_TOO_LARGE",
            DiscorderError::Serialization(_) => "SERIALIZATION_ERROR",
            DiscorderError::Io(_) => "IO_ERROR",
            DiscorderError::Internal(_) => "INTERNAL_ERROR",
        }
    }
}

pub type Result<T> = std::result::Result<T, DiscorderError>;
