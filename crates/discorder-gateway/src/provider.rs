//! Provider-facing contracts. A single `LlmProvider`-style trait per
//! capability so the remote service behind it — an OpenAI-compatible HTTP
//! endpoint, a local Ollama instance, or (for speech-to-text) an in-process
//! model — is invisible to the rest of the system.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::error::GatewayError;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Message {
    pub role: Role,
    pub content: String,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    User,
    Assistant,
    System,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ToolDefinition {
    pub name: String,
    pub description: String,
    pub input_schema: serde_json::Value,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ToolCall {
    pub id: String,
    pub name: String,
    pub input: serde_json::Value,
}

#[derive(Debug, Clone)]
pub struct ChatRequest {
    pub model: String,
    pub system: String,
    pub messages: Vec<Message>,
    pub max_tokens: u32,
    pub temperature: f32,
    pub tools: Vec<ToolDefinition>,
}

#[derive(Debug, Clone)]
pub struct ChatResponse {
    pub content: String,
    pub model: String,
    pub tokens_in: u32,
    pub tokens_out: u32,
    pub stop_reason: String,
    pub tool_calls: Vec<ToolCall>,
}

/// Text chat with optional tool-call schema.
#[async_trait]
pub trait LlmProvider: Send + Sync {
    fn name(&self) -> &str;

    async fn send(&self, req: &ChatRequest) -> std::result::Result<ChatResponse, GatewayError>;

    /// Release residency for `model` (e.g. set keep-alive to zero). No-op for
    /// providers with no concept of model residency.
    async fn unload(&self, _model: &str) -> std::result::Result<(), GatewayError> {
        Ok(())
    }
}

/// Image-to-caption. Input is raw image bytes plus a hint of the MIME type.
#[async_trait]
pub trait VisionProvider: Send + Sync {
    fn name(&self) -> &str;

    async fn caption(
        &self,
        model: &str,
        image_bytes: &[u8],
        mime_type: &str,
        prompt: &str,
    ) -> std::result::Result<String, GatewayError>;
}

/// Text embedding.
#[async_trait]
pub trait EmbeddingProvider: Send + Sync {
    fn name(&self) -> &str;

    async fn embed(
        &self,
        model: &str,
        text: &str,
    ) -> std::result::Result<Vec<f32>, GatewayError>;

    /// Release residency for `model`. No-op for providers with no concept of
    /// model residency.
    async fn unload(&self, _model: &str) -> std::result::Result<(), GatewayError> {
        Ok(())
    }
}

#[derive(Debug, Clone)]
pub struct Transcript {
    pub text: String,
    /// Average of `1 - no_speech_prob` across segments.
    pub confidence: f32,
}

/// Speech-to-text. Input is 16 kHz mono f32 PCM (already resampled by the
/// Audio Sink).
#[async_trait]
pub trait SttProvider: Send + Sync {
    fn name(&self) -> &str;

    async fn transcribe(
        &self,
        samples: &[f32],
    ) -> std::result::Result<Transcript, GatewayError>;
}
