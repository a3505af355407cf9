use thiserror::Error;

#[derive(Debug, Error)]
pub enum ExtractError {
    #[error("fetch failed for {url}: {source}")]
    Fetch {
        url: String,
        #[source]
        source: reqwest::Error,
    },

    #[error("non-success status {status} fetching {url}")]
    BadStatus { url: String, status: u16 },

    #[error("summarization failed for {url}: {reason}")]
    Summarize { url: String, reason: String },

    #[error("image download failed: {0}")]
    ImageDownload(String),

    #[error("image too large: {size} bytes exceeds {max} byte cap")]
    ImageTooLarge { size: usize, max: usize },

    #[error("unsupported content type for image: {0}")]
    UnsupportedContentType(String),

    #[error("captioning failed: {0}")]
    Caption(String),
}

pub type Result<T> = std::result::Result<T, ExtractError>;
