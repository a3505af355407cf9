use thiserror::Error;

#[derive(Debug, Error)]
pub enum RegistryError {
    #[error("database error: {0}")]
    Database(#[from] rusqlite::Error),

    #[error("server not configured: {server_id}")]
    NotConfigured { server_id: String },

    #[error("setup flow failed for server {server_id}: {reason}")]
    SetupFailed { server_id: String, reason: String },
}

pub type Result<T> = std::result::Result<T, RegistryError>;
