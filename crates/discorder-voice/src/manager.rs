use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, Weak};
use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::Mutex as AsyncMutex;
use tracing::{info, instrument, warn};

use discorder_core::types::{QueueRequest, UserId};
use discorder_gateway::ModelGateway;
use discorder_queue::{RequestQueue, VoiceSessionStarter};
use discorder_store::ConversationStore;

use crate::channel::VoiceChannelProvisioner;
use crate::error::{Result, VoiceError};
use crate::sink::{AudioSink, DEFAULT_SILENCE_DURATION_MS};
use crate::vad::{EnergyVad, Vad};

/// Builds a fresh [`Vad`] for each voice session. Boxed so callers can
/// inject `SileroVad::new` (behind the `onnx` feature) in place of the
/// energy-based fallback.
pub type VadFactory = Arc<dyn Fn() -> Arc<dyn Vad> + Send + Sync>;

fn default_vad_factory() -> VadFactory {
    Arc::new(|| Arc::new(EnergyVad::default()) as Arc<dyn Vad>)
}

/// Default "alone" timeout — how long a private channel waits for the
/// inviting user to join before it tears itself down.
pub const DEFAULT_ALONE_TIMEOUT: Duration = Duration::from_secs(300);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum VoiceState {
    Waiting,
    Active,
    Cleanup,
    Ended,
}

struct ManagedSession {
    session_id: String,
    user_id: UserId,
    guild_id: String,
    channel_id: String,
    state: VoiceState,
    sink: Arc<AudioSink>,
    queue_slot_freed: bool,
}

/// Owns the lifecycle of at most one active voice session at a time,
/// mirroring the single concurrent session this workspace's voice feature
/// has always supported. The Discord-specific half of provisioning (create
/// a channel, watch presence, tear it down) is behind
/// [`VoiceChannelProvisioner`] so this crate stays independent of the
/// Discord adapter.
pub struct VoiceManager {
    self_ref: Weak<VoiceManager>,
    store: Arc<ConversationStore>,
    gateway: Arc<ModelGateway>,
    channels: Arc<dyn VoiceChannelProvisioner>,
    queue: Arc<RequestQueue>,
    vad_factory: VadFactory,
    alone_timeout: Duration,
    silence_duration_ms: u64,
    current: AsyncMutex<Option<ManagedSession>>,
    pending_deletion: Mutex<Vec<(String, String)>>,
    alone_timer_cancel: Arc<AtomicBool>,
}

impl VoiceManager {
    pub fn new(
        store: Arc<ConversationStore>,
        gateway: Arc<ModelGateway>,
        channels: Arc<dyn VoiceChannelProvisioner>,
        queue: Arc<RequestQueue>,
    ) -> Arc<Self> {
        Self::with_config(
            store,
            gateway,
            channels,
            queue,
            DEFAULT_ALONE_TIMEOUT,
            DEFAULT_SILENCE_DURATION_MS,
            default_vad_factory(),
        )
    }

    #[allow(clippy::too_many_arguments)]
    pub fn with_config(
        store: Arc<ConversationStore>,
        gateway: Arc<ModelGateway>,
        channels: Arc<dyn VoiceChannelProvisioner>,
        queue: Arc<RequestQueue>,
        alone_timeout: Duration,
        silence_duration_ms: u64,
        vad_factory: VadFactory,
    ) -> Arc<Self> {
        Arc::new_cyclic(|weak| Self {
            self_ref: weak.clone(),
            store,
            gateway,
            channels,
            queue,
            vad_factory,
            alone_timeout,
            silence_duration_ms,
            current: AsyncMutex::new(None),
            pending_deletion: Mutex::new(Vec::new()),
            alone_timer_cancel: Arc::new(AtomicBool::new(false)),
        })
    }

    fn arc(&self) -> Arc<Self> {
        self.self_ref.upgrade().expect("VoiceManager dropped while still in use")
    }

    /// At startup, finish off any sessions left `ended_at IS NULL` by a
    /// previous crash — their Discord channels may still exist.
    #[instrument(skip(self))]
    pub async fn recover_orphaned_sessions(&self) {
        let orphans = match self.store.list_active_voice_sessions() {
            Ok(rows) => rows,
            Err(e) => {
                warn!(error = %e, "failed to list orphaned voice sessions");
                return;
            }
        };
        for row in orphans {
            info!(session_id = %row.id, "recovering orphaned voice session");
            if let Err(e) = self.channels.disconnect_and_delete(&row.guild_id, &row.channel_id).await {
                warn!(error = %e, channel_id = %row.channel_id, "orphan cleanup failed, queued for retry");
                self.pending_deletion.lock().unwrap().push((row.guild_id.clone(), row.channel_id.clone()));
            }
            if let Err(e) = self.store.end_voice_session(&row.id) {
                warn!(error = %e, session_id = %row.id, "failed to mark orphaned session ended");
            }
        }
    }

    /// `requested -> channel_created -> waiting`. Fails if a session is
    /// already active (this workspace supports exactly one at a time).
    #[instrument(skip(self, req), fields(user_id = %req.user_id, server_id = %req.server_id))]
    pub async fn start(&self, req: &QueueRequest) -> Result<()> {
        let mut current = self.current.lock().await;
        if current.is_some() {
            return Err(VoiceError::ChannelSetup("a voice session is already active".to_string()));
        }

        let guild_id = req.server_id.as_str().to_string();
        let channel_id = self
            .channels
            .create_and_join(&guild_id, req.user_id.as_str(), req.user_id.as_str())
            .await
            .map_err(VoiceError::ChannelSetup)?;

        let row = self.store.create_voice_session(&req.user_id, &guild_id, &channel_id)?;
        let vad = (self.vad_factory)();
        let sink = AudioSink::new(
            row.id.clone(),
            Arc::clone(&self.store),
            Arc::clone(&self.gateway),
            vad,
            self.silence_duration_ms,
        );

        self.channels
            .attach_sink(&guild_id, &channel_id, Arc::clone(&sink))
            .await;

        *current = Some(ManagedSession {
            session_id: row.id.clone(),
            user_id: req.user_id.clone(),
            guild_id: guild_id.clone(),
            channel_id: channel_id.clone(),
            state: VoiceState::Waiting,
            sink,
            queue_slot_freed: false,
        });
        drop(current);

        self.alone_timer_cancel.store(false, Ordering::SeqCst);
        self.spawn_alone_timer(row.id.clone());
        info!(session_id = %row.id, channel_id, "voice session waiting for user to join");
        Ok(())
    }

    fn spawn_alone_timer(&self, session_id: String) {
        let this = self.arc();
        let cancel = Arc::clone(&self.alone_timer_cancel);
        let timeout = self.alone_timeout;
        tokio::spawn(async move {
            tokio::time::sleep(timeout).await;
            if cancel.load(Ordering::SeqCst) {
                return;
            }
            info!(session_id, "alone timer fired, tearing down session");
            this.cleanup(&session_id, "alone timeout").await;
        });
    }

    /// Poll-driven presence check resolving `waiting -> active`. The
    /// Discord adapter calls this from its voice-state-update handler.
    #[instrument(skip(self))]
    pub async fn on_user_present(&self, session_id: &str) {
        let mut current = self.current.lock().await;
        if let Some(session) = current.as_mut() {
            if session.session_id == session_id && session.state == VoiceState::Waiting {
                session.state = VoiceState::Active;
                self.alone_timer_cancel.store(true, Ordering::SeqCst);
                info!(session_id, "voice session active");
            }
        }
    }

    /// `active -> cleanup` triggered by the user leaving the channel.
    #[instrument(skip(self))]
    pub async fn on_user_left(&self, session_id: &str) {
        self.cleanup(session_id, "user left channel").await;
    }

    /// Session id of the currently active session in `guild_id`, if any.
    /// Used by the Discord adapter to route `voice_state_update` events.
    pub async fn session_id_for_guild(&self, guild_id: &str) -> Option<String> {
        let current = self.current.lock().await;
        current
            .as_ref()
            .filter(|s| s.guild_id == guild_id)
            .map(|s| s.session_id.clone())
    }

    pub fn sink_for(&self, session_id: &str) -> Option<Arc<AudioSink>> {
        self.current
            .try_lock()
            .ok()
            .and_then(|g| g.as_ref().filter(|s| s.session_id == session_id).map(|s| Arc::clone(&s.sink)))
    }

    /// Disconnects, deletes the channel, and marks the row ended. Safe to
    /// call more than once for the same session — the queue slot is only
    /// freed the first time.
    #[instrument(skip(self))]
    pub async fn cleanup(&self, session_id: &str, reason: &str) {
        self.alone_timer_cancel.store(true, Ordering::SeqCst);

        let mut current = self.current.lock().await;
        let Some(session) = current.as_mut().filter(|s| s.session_id == session_id) else {
            return;
        };
        if session.state == VoiceState::Ended {
            return;
        }
        session.state = VoiceState::Cleanup;
        let guild_id = session.guild_id.clone();
        let channel_id = session.channel_id.clone();
        let user_id = session.user_id.clone();
        let freed_already = session.queue_slot_freed;
        session.queue_slot_freed = true;
        drop(current);

        if !freed_already {
            self.queue.complete(user_id.as_str(), true);
            info!(session_id, reason, "voice queue slot freed");
        }

        if let Err(e) = self.channels.disconnect_and_delete(&guild_id, &channel_id).await {
            warn!(error = %e, channel_id, "channel teardown failed, queued for retry");
            self.pending_deletion.lock().unwrap().push((guild_id, channel_id));
        }
        if let Err(e) = self.store.end_voice_session(session_id) {
            warn!(error = %e, session_id, "failed to mark voice session ended");
        }
        self.channels.notify_user(user_id.as_str(), "👋 Voice session ended.").await;

        let mut current = self.current.lock().await;
        if let Some(session) = current.as_mut().filter(|s| s.session_id == session_id) {
            session.state = VoiceState::Ended;
        }
        if current.as_ref().is_some_and(|s| s.session_id == session_id) {
            *current = None;
        }
        info!(session_id, reason, "voice session ended");
    }

    /// Retries any channel deletions that failed earlier. Called by the
    /// Cleanup Coordinator during shutdown.
    #[instrument(skip(self))]
    pub async fn retry_pending_deletions(&self) {
        let pending = std::mem::take(&mut *self.pending_deletion.lock().unwrap());
        for (guild_id, channel_id) in pending {
            if let Err(e) = self.channels.disconnect_and_delete(&guild_id, &channel_id).await {
                warn!(error = %e, channel_id, "pending deletion retry failed");
                self.pending_deletion.lock().unwrap().push((guild_id, channel_id));
            }
        }
    }

    /// Ends whatever session is active. Used by the Cleanup Coordinator.
    pub async fn shutdown_active_session(&self) {
        let session_id = {
            let current = self.current.lock().await;
            current.as_ref().map(|s| s.session_id.clone())
        };
        if let Some(session_id) = session_id {
            self.cleanup(&session_id, "shutdown").await;
        }
    }
}

#[async_trait]
impl VoiceSessionStarter for VoiceManager {
    async fn begin_session(&self, req: &QueueRequest) -> std::result::Result<(), String> {
        self.start(req).await.map_err(|e| e.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use discorder_core::types::{OriginChannelRef, RequestType, ServerId};
    use discorder_gateway::{EmbeddingProvider, LlmProvider, VisionProvider};
    use std::sync::atomic::AtomicUsize;

    struct FakeProvisioner {
        created: AtomicUsize,
        deleted: AtomicUsize,
    }

    #[async_trait]
    impl VoiceChannelProvisioner for FakeProvisioner {
        async fn create_and_join(&self, _: &str, _: &str, _: &str) -> std::result::Result<String, String> {
            self.created.fetch_add(1, Ordering::SeqCst);
            Ok("chan-1".to_string())
        }
        async fn is_user_present(&self, _: &str, _: &str, _: &str) -> bool {
            true
        }
        async fn disconnect_and_delete(&self, _: &str, _: &str) -> std::result::Result<(), String> {
            self.deleted.fetch_add(1, Ordering::SeqCst);
            Ok(())
        }
        async fn notify_user(&self, _: &str, _: &str) {}
    }

    struct NullChat;
    #[async_trait]
    impl LlmProvider for NullChat {
        fn name(&self) -> &str {
            "null"
        }
        async fn send(
            &self,
            _: &discorder_gateway::ChatRequest,
        ) -> std::result::Result<discorder_gateway::ChatResponse, discorder_gateway::GatewayError> {
            unimplemented!()
        }
    }
    struct NullVision;
    #[async_trait]
    impl VisionProvider for NullVision {
        fn name(&self) -> &str {
            "null"
        }
        async fn caption(&self, _: &str, _: &[u8], _: &str, _: &str) -> std::result::Result<String, discorder_gateway::GatewayError> {
            unimplemented!()
        }
    }
    struct NullEmbed;
    #[async_trait]
    impl EmbeddingProvider for NullEmbed {
        fn name(&self) -> &str {
            "null"
        }
        async fn embed(&self, _: &str, _: &str) -> std::result::Result<Vec<f32>, discorder_gateway::GatewayError> {
            unimplemented!()
        }
    }

    fn gateway() -> Arc<ModelGateway> {
        Arc::new(ModelGateway::new(Arc::new(NullChat), Arc::new(NullVision), Arc::new(NullEmbed), None))
    }

    fn store() -> Arc<ConversationStore> {
        Arc::new(ConversationStore::new(rusqlite::Connection::open_in_memory().unwrap()).unwrap())
    }

    fn request() -> QueueRequest {
        QueueRequest {
            user_id: UserId::from("u1"),
            server_id: ServerId::from("g1"),
            message: String::new(),
            request_type: RequestType::Voice,
            enqueued_at: chrono::Utc::now(),
            status: discorder_core::types::RequestStatus::Queued,
            origin_channel: OriginChannelRef { channel_id: 1, status_message_id: None },
        }
    }

    #[tokio::test]
    async fn start_then_cleanup_frees_slot_exactly_once() {
        let provisioner = Arc::new(FakeProvisioner { created: AtomicUsize::new(0), deleted: AtomicUsize::new(0) });
        let queue = Arc::new(RequestQueue::new(10));
        queue.enqueue(request());
        let manager = VoiceManager::with_config(
            store(),
            gateway(),
            provisioner.clone(),
            Arc::clone(&queue),
            Duration::from_secs(60),
            800,
            default_vad_factory(),
        );

        manager.start(&request()).await.unwrap();
        assert_eq!(provisioner.created.load(Ordering::SeqCst), 1);

        // A second start must fail while one is active.
        assert!(manager.start(&request()).await.is_err());

        // The queue slot taken at enqueue time must still be held — it is
        // not freed just because the session reached `Waiting`.
        assert!(matches!(queue.enqueue(request()), discorder_queue::EnqueueOutcome::RejectedDuplicateUser));

        let session_id = {
            let current = manager.current.lock().await;
            current.as_ref().unwrap().session_id.clone()
        };

        manager.cleanup(&session_id, "test").await;
        manager.cleanup(&session_id, "test-again").await;
        assert_eq!(provisioner.deleted.load(Ordering::SeqCst), 1);

        // Cleanup freed the slot exactly once; the user can enqueue again.
        assert!(matches!(queue.enqueue(request()), discorder_queue::EnqueueOutcome::Accepted { .. }));

        // Slot is free again.
        manager.start(&request()).await.unwrap();
    }
}
