pub mod error;
pub mod store;

pub use error::{Result, VectorError};
pub use store::{PointMetadata, QueryHit, VectorStore};
