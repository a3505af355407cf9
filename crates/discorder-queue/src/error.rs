use thiserror::Error;

#[derive(Debug, Error)]
pub enum QueueError {
    #[error("queue is full")]
    Full,
    #[error("user {0} already has a request in flight")]
    DuplicateUser(String),
}

pub type Result<T> = std::result::Result<T, QueueError>;
