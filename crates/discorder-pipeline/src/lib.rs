pub mod error;
pub mod pipeline;

pub use error::{PipelineError, Result};
pub use pipeline::{MessagePipeline, PipelineOutcome};
