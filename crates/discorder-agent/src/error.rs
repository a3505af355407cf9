use thiserror::Error;

#[derive(Debug, Error)]
pub enum AgentError {
    #[error("gateway error: {0}")]
    Gateway(#[from] discorder_gateway::GatewayError),
    #[error("vector store error: {0}")]
    Vector(#[from] discorder_vector::VectorError),
    #[error("server {0} has no configuration")]
    NotConfigured(String),
}

pub type Result<T> = std::result::Result<T, AgentError>;
