pub mod error;
pub mod gateway;
pub mod health;
pub mod ollama;
pub mod openai;
pub mod provider;
#[cfg(feature = "whisper")]
pub mod stt;

pub use error::{GatewayError, Result};
pub use gateway::ModelGateway;
pub use provider::{
    ChatRequest, ChatResponse, EmbeddingProvider, LlmProvider, Message, Role, SttProvider,
    Transcript, ToolCall, ToolDefinition, VisionProvider,
};
