use std::sync::Arc;
use std::time::Duration;

use tokio::sync::watch;
use tracing::{error, info, instrument, warn};

use discorder_core::types::{RequestType, TurnRole};
use discorder_store::ConversationStore;

use crate::dispatch::{ChatResponder, StatusSink, VoiceSessionStarter};
use crate::messages;
use crate::queue::RequestQueue;

/// Overall deadline for a single chat dispatch (`T` in the spec).
pub const DEFAULT_CHAT_TIMEOUT: Duration = Duration::from_secs(60);

/// Single long-running task draining the [`RequestQueue`] and dispatching by
/// `request_type`.
pub struct QueueWorker {
    queue: Arc<RequestQueue>,
    store: Arc<ConversationStore>,
    chat: Arc<dyn ChatResponder>,
    voice: Arc<dyn VoiceSessionStarter>,
    status: Arc<dyn StatusSink>,
    chat_timeout: Duration,
}

impl QueueWorker {
    pub fn new(
        queue: Arc<RequestQueue>,
        store: Arc<ConversationStore>,
        chat: Arc<dyn ChatResponder>,
        voice: Arc<dyn VoiceSessionStarter>,
        status: Arc<dyn StatusSink>,
    ) -> Self {
        Self {
            queue,
            store,
            chat,
            voice,
            status,
            chat_timeout: DEFAULT_CHAT_TIMEOUT,
        }
    }

    pub fn with_chat_timeout(mut self, timeout: Duration) -> Self {
        self.chat_timeout = timeout;
        self
    }

    /// Runs until `shutdown` broadcasts `true`. Finishes whatever request is
    /// currently in flight before exiting.
    pub async fn run(&self, mut shutdown: watch::Receiver<bool>) {
        info!("queue worker started");
        loop {
            if *shutdown.borrow() {
                break;
            }
            let req = tokio::select! {
                r = self.queue.next() => r,
                _ = shutdown.changed() => continue,
            };
            let Some(req) = req else { continue };
            self.handle(req).await;
        }
        info!("queue worker drained, exiting");
    }

    #[instrument(skip(self, req), fields(user_id = %req.user_id, request_type = ?req.request_type))]
    async fn handle(&self, req: discorder_core::types::QueueRequest) {
        self.status.update_status(&req.origin_channel, "processing…").await;

        match req.request_type {
            // A started voice session owns the single-flight slot for its
            // whole lifetime and frees it itself on entry to cleanup. Only
            // free it here if it never got that far.
            RequestType::Voice => {
                if !self.handle_voice(&req).await {
                    self.queue.complete(req.user_id.as_str(), false);
                }
            }
            RequestType::Chat => {
                let success = self.handle_chat(&req).await;
                self.queue.complete(req.user_id.as_str(), success);
            }
        }
    }

    async fn handle_voice(&self, req: &discorder_core::types::QueueRequest) -> bool {
        match self.voice.begin_session(req).await {
            Ok(()) => true,
            Err(reason) => {
                error!(reason, "voice session failed to start");
                self.status.update_status(&req.origin_channel, messages::PROCESSING_ERROR).await;
                false
            }
        }
    }

    async fn handle_chat(&self, req: &discorder_core::types::QueueRequest) -> bool {
        let mut user_message_logged = false;
        if let Err(e) = self.store.append_turn(
            &req.user_id,
            &req.server_id,
            TurnRole::User,
            &req.message,
            None,
        ) {
            warn!(error = %e, "failed to log user turn");
        } else {
            user_message_logged = true;
        }

        let outcome = tokio::time::timeout(self.chat_timeout, self.chat.respond(req)).await;

        let (success, assistant_text) = match outcome {
            Ok(Ok(response)) => (true, response),
            Ok(Err(reason)) => {
                error!(reason, "chat dispatch failed");
                (false, messages::PROCESSING_ERROR.to_string())
            }
            Err(_) => {
                warn!("chat dispatch timed out");
                (false, messages::TIMEOUT.to_string())
            }
        };

        if !user_message_logged {
            if let Err(e) = self.store.append_turn(
                &req.user_id,
                &req.server_id,
                TurnRole::User,
                &req.message,
                None,
            ) {
                warn!(error = %e, "failed to log user turn on error path");
            }
        }

        if let Err(e) = self.store.append_turn(
            &req.user_id,
            &req.server_id,
            TurnRole::Assistant,
            &assistant_text,
            None,
        ) {
            warn!(error = %e, "failed to log assistant turn");
        }

        self.status.update_status(&req.origin_channel, &assistant_text).await;
        success
    }
}
