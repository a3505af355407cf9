use thiserror::Error;

#[derive(Debug, Error)]
pub enum PipelineError {
    #[error("batch aborted for server {server_id} on message {message_id}: {reason}")]
    BatchAborted {
        server_id: String,
        message_id: String,
        reason: String,
    },
}

pub type Result<T> = std::result::Result<T, PipelineError>;
