pub mod dispatch;
pub mod error;
pub mod messages;
pub mod queue;
pub mod worker;

pub use dispatch::{ChatResponder, StatusSink, VoiceSessionStarter};
pub use error::{QueueError, Result};
pub use queue::{EnqueueOutcome, RequestQueue, DEFAULT_CAPACITY};
pub use worker::{QueueWorker, DEFAULT_CHAT_TIMEOUT};
