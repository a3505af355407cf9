use std::sync::Arc;
use std::time::Instant;

use tracing::{info, instrument, warn};

use crate::error::{GatewayError, Result};
use crate::health::{HealthTracker, ProviderHealthEntry};
use crate::provider::{ChatRequest, ChatResponse, EmbeddingProvider, LlmProvider, SttProvider, Transcript, VisionProvider};

/// A 1x1 transparent PNG, used only to warm the vision endpoint at startup.
const WARMUP_IMAGE_PNG: &[u8] = &[
    0x89, 0x50, 0x4e, 0x47, 0x0d, 0x0a, 0x1a, 0x0a, 0x00, 0x00, 0x00, 0x0d, 0x49, 0x48, 0x44,
    0x52, 0x00, 0x00, 0x00, 0x01, 0x00, 0x00, 0x00, 0x01, 0x08, 0x06, 0x00, 0x00, 0x00, 0x1f,
    0x15, 0xc4, 0x89, 0x00, 0x00, 0x00, 0x0a, 0x49, 0x44, 0x41, 0x54, 0x78, 0x9c, 0x63, 0x00,
    0x01, 0x00, 0x00, 0x05, 0x00, 0x01, 0x0d, 0x0a, 0x2d, 0xb4, 0x00, 0x00, 0x00, 0x00, 0x49,
    0x45, 0x4e, 0x44, 0xae, 0x42, 0x60, 0x82,
];

/// Unifies chat, vision, embedding, and speech-to-text behind one entry
/// point. Owns model residency (keep-alive pings) and per-endpoint health.
pub struct ModelGateway {
    chat: Arc<dyn LlmProvider>,
    vision: Arc<dyn VisionProvider>,
    embedding: Arc<dyn EmbeddingProvider>,
    stt: Option<Arc<dyn SttProvider>>,
    health: HealthTracker,
}

impl ModelGateway {
    pub fn new(
        chat: Arc<dyn LlmProvider>,
        vision: Arc<dyn VisionProvider>,
        embedding: Arc<dyn EmbeddingProvider>,
        stt: Option<Arc<dyn SttProvider>>,
    ) -> Self {
        Self {
            chat,
            vision,
            embedding,
            stt,
            health: HealthTracker::new(),
        }
    }

    #[instrument(skip(self, req), fields(model = %req.model))]
    pub async fn chat(&self, req: &ChatRequest) -> Result<ChatResponse> {
        let started = Instant::now();
        let result = self.chat.send(req).await;
        self.record(self.chat.name(), started, &result);
        result
    }

    #[instrument(skip(self, image_bytes, prompt))]
    pub async fn caption_image(
        &self,
        model: &str,
        image_bytes: &[u8],
        mime_type: &str,
        prompt: &str,
    ) -> Result<String> {
        let started = Instant::now();
        let result = self.vision.caption(model, image_bytes, mime_type, prompt).await;
        self.record(self.vision.name(), started, &result);
        result
    }

    #[instrument(skip(self, text))]
    pub async fn embed(&self, model: &str, text: &str) -> Result<Vec<f32>> {
        let started = Instant::now();
        let result = self.embedding.embed(model, text).await;
        self.record(self.embedding.name(), started, &result);
        result
    }

    #[instrument(skip(self, samples))]
    pub async fn transcribe(&self, samples: &[f32]) -> Result<Transcript> {
        let Some(stt) = &self.stt else {
            return Err(GatewayError::NoProvider);
        };
        let started = Instant::now();
        let result = stt.transcribe(samples).await;
        self.record(stt.name(), started, &result);
        result
    }

    /// Load the chat and vision models with a negligible prompt so the first
    /// real request doesn't pay cold-start latency.
    #[instrument(skip(self))]
    pub async fn prewarm(&self, chat_model: &str, vision_model: &str) {
        let warmup = ChatRequest {
            model: chat_model.to_string(),
            system: String::new(),
            messages: vec![],
            max_tokens: 1,
            temperature: 0.0,
            tools: vec![],
        };
        if let Err(e) = self.chat.send(&warmup).await {
            warn!(error = %e, "chat model prewarm failed");
        }
        if let Err(e) = self
            .vision
            .caption(vision_model, WARMUP_IMAGE_PNG, "image/png", "warmup")
            .await
        {
            warn!(error = %e, "vision model prewarm failed");
        }
        info!("model gateway prewarm complete");
    }

    /// Release model residency (keep-alive = 0) for the chat and embedding
    /// models. Called by the Cleanup Coordinator during shutdown; errors are
    /// logged and otherwise ignored since the process is exiting anyway.
    #[instrument(skip(self))]
    pub async fn unload_all(&self, chat_model: &str, embedding_model: &str) {
        if let Err(e) = self.chat.unload(chat_model).await {
            warn!(error = %e, model = chat_model, "failed to unload chat model");
        }
        if let Err(e) = self.embedding.unload(embedding_model).await {
            warn!(error = %e, model = embedding_model, "failed to unload embedding model");
        }
    }

    pub fn health_snapshot(&self) -> Vec<ProviderHealthEntry> {
        self.health.snapshot_all()
    }

    fn record<T>(&self, provider: &str, started: Instant, result: &Result<T>) {
        let latency_ms = started.elapsed().as_millis() as u64;
        match result {
            Ok(_) => self.health.record_success(provider, latency_ms),
            Err(GatewayError::RateLimited { retry_after_ms }) => {
                self.health.record_rate_limited(provider, *retry_after_ms)
            }
            Err(_) => self.health.record_failure(provider, latency_ms),
        }
    }
}
