use thiserror::Error;

#[derive(Debug, Error)]
pub enum VoiceError {
    #[error("store error: {0}")]
    Store(#[from] discorder_store::StoreError),
    #[error("gateway error: {0}")]
    Gateway(#[from] discorder_gateway::GatewayError),
    #[error("resample error: {0}")]
    Resample(String),
    #[error("vad model error: {0}")]
    Vad(String),
    #[error("no active session for user {0}")]
    NoSession(String),
    #[error("channel setup failed: {0}")]
    ChannelSetup(String),
}

pub type Result<T> = std::result::Result<T, VoiceError>;
