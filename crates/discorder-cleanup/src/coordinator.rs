//! Ordered shutdown: stop intake, drain in-flight work, tear down voice,
//! unload models, then let store handles drop. Each step is independent —
//! a failure in one does not skip the rest.

use std::time::Duration;

use discorder_gateway::ModelGateway;
use discorder_voice::VoiceManager;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{info, instrument, warn};

use crate::report::ShutdownReport;

pub struct CleanupCoordinator {
    shutdown_tx: watch::Sender<bool>,
    voice: std::sync::Arc<VoiceManager>,
    gateway: std::sync::Arc<ModelGateway>,
    chat_model: String,
    embedding_model: String,
}

impl CleanupCoordinator {
    pub fn new(
        shutdown_tx: watch::Sender<bool>,
        voice: std::sync::Arc<VoiceManager>,
        gateway: std::sync::Arc<ModelGateway>,
        chat_model: impl Into<String>,
        embedding_model: impl Into<String>,
    ) -> Self {
        Self {
            shutdown_tx,
            voice,
            gateway,
            chat_model: chat_model.into(),
            embedding_model: embedding_model.into(),
        }
    }

    /// Runs the five-step shutdown sequence. `worker_handle` is the Queue
    /// Worker's task; `drain_budget` bounds how long step 2 waits for it to
    /// finish the request it's currently handling.
    #[instrument(skip(self, worker_handle))]
    pub async fn run(&self, worker_handle: JoinHandle<()>, drain_budget: Duration) -> ShutdownReport {
        let mut report = ShutdownReport::default();

        match self.shutdown_tx.send(true) {
            Ok(()) => report.record("stop_intake", true, "queue worker signaled to drain"),
            Err(e) => {
                warn!(error = %e, "failed to signal queue worker shutdown");
                report.record("stop_intake", false, e.to_string());
            }
        }

        match tokio::time::timeout(drain_budget, worker_handle).await {
            Ok(Ok(())) => report.record("drain_in_flight", true, "worker exited cleanly"),
            Ok(Err(e)) => {
                warn!(error = %e, "queue worker task panicked during drain");
                report.record("drain_in_flight", false, e.to_string());
            }
            Err(_) => {
                warn!(budget_secs = drain_budget.as_secs(), "queue worker drain exceeded budget, continuing shutdown");
                report.record("drain_in_flight", false, "exceeded drain budget");
            }
        }

        self.voice.shutdown_active_session().await;
        self.voice.retry_pending_deletions().await;
        report.record("voice_teardown", true, "active session ended, pending channel deletions retried");

        self.gateway.unload_all(&self.chat_model, &self.embedding_model).await;
        report.record("unload_models", true, format!("released {} and {}", self.chat_model, self.embedding_model));

        report.record("close_stores", true, "store handles released on drop");

        info!(all_ok = report.all_ok(), "shutdown sequence complete");
        report
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    use async_trait::async_trait;
    use discorder_gateway::{
        ChatRequest, ChatResponse, EmbeddingProvider, GatewayError, LlmProvider, VisionProvider,
    };
    use discorder_store::ConversationStore;
    use discorder_voice::AudioSink;
    use rusqlite::Connection;

    struct NullChat;
    #[async_trait]
    impl LlmProvider for NullChat {
        fn name(&self) -> &str {
            "null-chat"
        }
        async fn send(&self, _req: &ChatRequest) -> Result<ChatResponse, GatewayError> {
            unreachable!("cleanup tests never dispatch chat")
        }
    }

    struct NullVision;
    #[async_trait]
    impl VisionProvider for NullVision {
        fn name(&self) -> &str {
            "null-vision"
        }
        async fn caption(&self, _m: &str, _b: &[u8], _mime: &str, _p: &str) -> Result<String, GatewayError> {
            unreachable!("cleanup tests never caption")
        }
    }

    struct NullEmbed;
    #[async_trait]
    impl EmbeddingProvider for NullEmbed {
        fn name(&self) -> &str {
            "null-embed"
        }
        async fn embed(&self, _model: &str, _text: &str) -> Result<Vec<f32>, GatewayError> {
            unreachable!("cleanup tests never embed")
        }
        async fn unload(&self, _model: &str) -> Result<(), GatewayError> {
            Ok(())
        }
    }

    struct NullProvisioner;
    #[async_trait]
    impl discorder_voice::VoiceChannelProvisioner for NullProvisioner {
        async fn create_and_join(&self, _g: &str, _u: &str, _d: &str) -> std::result::Result<String, String> {
            unreachable!("cleanup tests never create channels")
        }
        async fn is_user_present(&self, _g: &str, _c: &str, _u: &str) -> bool {
            false
        }
        async fn disconnect_and_delete(&self, _g: &str, _c: &str) -> std::result::Result<(), String> {
            Ok(())
        }
        async fn notify_user(&self, _u: &str, _t: &str) {}
        async fn attach_sink(&self, _g: &str, _c: &str, _s: Arc<AudioSink>) {}
    }

    fn fixture() -> (Arc<VoiceManager>, Arc<ModelGateway>) {
        let conn = Connection::open_in_memory().unwrap();
        let store = Arc::new(ConversationStore::new(conn).unwrap());
        let gateway = Arc::new(ModelGateway::new(
            Arc::new(NullChat),
            Arc::new(NullVision),
            Arc::new(NullEmbed),
            None,
        ));
        let queue = Arc::new(discorder_queue::RequestQueue::new(10));
        let voice = VoiceManager::new(store, Arc::clone(&gateway), Arc::new(NullProvisioner), queue);
        (voice, gateway)
    }

    #[tokio::test]
    async fn happy_path_all_steps_ok() {
        let (voice, gateway) = fixture();
        let (tx, mut rx) = watch::channel(false);
        let coordinator = CleanupCoordinator::new(tx, voice, gateway, "chat-model", "embed-model");

        let worker = tokio::spawn(async move {
            let _ = rx.changed().await;
        });

        let report = coordinator.run(worker, Duration::from_secs(5)).await;
        assert!(report.all_ok(), "{report}");
        assert_eq!(report.steps.len(), 5);
    }

    #[tokio::test]
    async fn slow_worker_trips_drain_budget_but_shutdown_continues() {
        let (voice, gateway) = fixture();
        let (tx, _rx) = watch::channel(false);
        let coordinator = CleanupCoordinator::new(tx, voice, gateway, "chat-model", "embed-model");

        let worker = tokio::spawn(async move {
            tokio::time::sleep(Duration::from_secs(60)).await;
        });

        let report = coordinator.run(worker, Duration::from_millis(20)).await;
        assert!(!report.all_ok());
        let drain = report.steps.iter().find(|s| s.name == "drain_in_flight").unwrap();
        assert!(!drain.ok);
        let voice_step = report.steps.iter().find(|s| s.name == "voice_teardown").unwrap();
        assert!(voice_step.ok, "later steps still run after a failed drain");
    }
}
