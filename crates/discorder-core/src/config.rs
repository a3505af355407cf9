//! Layered TOML + environment configuration, loaded once at startup.
//!
//! Mirrors the two-layer `figment` approach used elsewhere in this workspace:
//! a TOML file for checked-in defaults, overlaid by `DISCORDER_`-prefixed
//! environment variables for secrets and deployment-specific overrides.

use std::path::Path;

use figment::providers::{Env, Format, Toml};
use figment::Figment;
use serde::{Deserialize, Serialize};

use crate::error::{DiscorderError, Result};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AppConfig {
    pub discord: DiscordConfig,
    pub llm: LlmConfig,
    pub agent: AgentConfig,
    pub voice: VoiceConfig,
    pub queue: QueueConfig,
    pub database: DatabaseConfig,
    pub vector_store: VectorStoreConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DiscordConfig {
    pub bot_token: String,
    #[serde(default = "default_command_prefix")]
    pub command_prefix: String,
    #[serde(default)]
    pub debug: bool,
}

fn default_command_prefix() -> String {
    "!".to_string()
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LlmConfig {
    #[serde(default = "default_model_name")]
    pub model_name: String,
    #[serde(default = "default_vision_model_name")]
    pub vision_model_name: String,
    #[serde(default = "default_embedding_model_id")]
    pub embedding_model_id: String,
    /// Base URL for the remote model runtime (Ollama-compatible or
    /// OpenAI-compatible, selected by `provider_kind`).
    #[serde(default = "default_base_url")]
    pub base_url: String,
    #[serde(default = "default_provider_kind")]
    pub provider_kind: String,
    pub api_key: Option<String>,
    #[serde(default = "default_temperature")]
    pub temperature: f32,
    #[serde(default = "default_max_response_chars")]
    pub max_response_chars: usize,
    #[serde(default = "default_max_context_messages")]
    pub max_context_messages: usize,
}

fn default_model_name() -> String {
    "llama3.1:8b".to_string()
}
fn default_vision_model_name() -> String {
    "llava:13b".to_string()
}
fn default_embedding_model_id() -> String {
    "nomic-embed-text".to_string()
}
fn default_base_url() -> String {
    "http://localhost:11434".to_string()
}
fn default_provider_kind() -> String {
    "ollama".to_string()
}
fn default_temperature() -> f32 {
    0.7
}
fn default_max_response_chars() -> usize {
    1800
}
fn default_max_context_messages() -> usize {
    20
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AgentConfig {
    #[serde(default = "default_max_iterations")]
    pub max_iterations: u32,
    #[serde(default = "default_max_execution_time_secs")]
    pub max_execution_time_secs: u64,
    #[serde(default = "default_outer_deadline_secs")]
    pub outer_deadline_secs: u64,
    #[serde(default = "default_search_k")]
    pub search_k: usize,
    #[serde(default = "default_relevance_cutoff")]
    pub relevance_cutoff: f32,
}

fn default_max_iterations() -> u32 {
    10
}
fn default_max_execution_time_secs() -> u64 {
    30
}
fn default_outer_deadline_secs() -> u64 {
    45
}
fn default_search_k() -> usize {
    5
}
fn default_relevance_cutoff() -> f32 {
    0.1
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VoiceConfig {
    #[serde(default)]
    pub stt_enabled: bool,
    #[serde(default = "default_alone_timeout_secs")]
    pub alone_timeout_secs: u64,
    #[serde(default = "default_silence_duration_ms")]
    pub silence_duration_ms: u64,
    #[serde(default = "default_whisper_model_size")]
    pub whisper_model_size: String,
    #[serde(default = "default_whisper_device")]
    pub whisper_device: String,
    #[serde(default = "default_whisper_compute_type")]
    pub whisper_compute_type: String,
    /// Path to the Silero VAD ONNX model. Only consulted when
    /// `discorder-voice` is built with the `onnx` feature; falls back to an
    /// energy-based heuristic if unset or the file fails to load.
    #[serde(default)]
    pub vad_model_path: Option<String>,
}

fn default_alone_timeout_secs() -> u64 {
    300
}
fn default_silence_duration_ms() -> u64 {
    800
}
fn default_whisper_model_size() -> String {
    "base".to_string()
}
fn default_whisper_device() -> String {
    "cpu".to_string()
}
fn default_whisper_compute_type() -> String {
    "int8".to_string()
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct QueueConfig {
    #[serde(default = "default_queue_capacity")]
    pub capacity: usize,
    #[serde(default = "default_worker_timeout_secs")]
    pub worker_timeout_secs: u64,
}

fn default_queue_capacity() -> usize {
    50
}
fn default_worker_timeout_secs() -> u64 {
    60
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DatabaseConfig {
    #[serde(default = "default_db_path")]
    pub path: String,
}

fn default_db_path() -> String {
    "discorder.sqlite3".to_string()
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VectorStoreConfig {
    #[serde(default = "default_vector_endpoint")]
    pub endpoint: String,
    #[serde(default = "default_collection_prefix")]
    pub collection_prefix: String,
    #[serde(default = "default_vector_dim")]
    pub vector_dim: u64,
}

fn default_vector_endpoint() -> String {
    "http://localhost:6334".to_string()
}
fn default_collection_prefix() -> String {
    "messages".to_string()
}
fn default_vector_dim() -> u64 {
    768
}

impl AppConfig {
    /// Load configuration by merging a TOML file with a `DISCORDER_`-prefixed
    /// environment overlay. Missing keys fall back to the `#[serde(default)]`
    /// helpers above.
    pub fn load(path: &Path) -> Result<Self> {
        Figment::new()
            .merge(Toml::file(path))
            .merge(Env::prefixed("DISCORDER_").split("_"))
            .extract()
            .map_err(|e| DiscorderError::Config(e.to_string()))
    }
}

impl std::fmt::Display for DiscordConfig {
    /// Never print the bot token — `fmt::Display`/`fmt::Debug` on configs that
    /// might get logged must not leak secrets.
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "DiscordConfig {{ bot_token: \"<redacted>\", command_prefix: {:?}, debug: {} }}",
            self.command_prefix, self.debug
        )
    }
}
