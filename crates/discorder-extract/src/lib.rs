pub mod error;
pub mod images;
pub mod links;
pub mod mentions;

pub use error::{ExtractError, Result};
pub use images::ImageCaptioner;
pub use links::{LinkExtractor, LinkSummary};
pub use mentions::{extract_mentions, extract_urls, Mentions};
