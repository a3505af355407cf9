/// Errors produced by the Discord adapter.
#[derive(Debug, thiserror::Error)]
pub enum DiscordError {
    #[error("serenity error: {0}")]
    Serenity(#[from] serenity::Error),

    #[error("songbird error: {0}")]
    Songbird(String),

    #[error("no bot token configured")]
    NoToken,
}

pub type Result<T> = std::result::Result<T, DiscordError>;
