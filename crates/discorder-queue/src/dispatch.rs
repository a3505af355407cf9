use async_trait::async_trait;

use discorder_core::types::{OriginChannelRef, QueueRequest};

/// Implemented by the Agent Runner. Kept as a trait here so the queue crate
/// does not depend on the agent crate — the binary wires the real
/// implementation in.
#[async_trait]
pub trait ChatResponder: Send + Sync {
    async fn respond(&self, req: &QueueRequest) -> Result<String, String>;
}

/// Implemented by the Voice Manager.
#[async_trait]
pub trait VoiceSessionStarter: Send + Sync {
    async fn begin_session(&self, req: &QueueRequest) -> Result<(), String>;
}

/// Implemented by the Discord adapter: best-effort edit-or-send of the
/// origin status message.
#[async_trait]
pub trait StatusSink: Send + Sync {
    async fn update_status(&self, origin: &OriginChannelRef, text: &str);
}
