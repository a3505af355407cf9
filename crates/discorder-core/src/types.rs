//! Domain types shared across every crate in the workspace.
//!
//! These mirror the entities in the data model: `ServerConfig`, `RawMessage`,
//! `ProcessedMessage`, `ConvTurn`, `QueueRequest`, `VoiceSession`, `Transcription`.

use serde::{Deserialize, Serialize};
use std::fmt;

/// A Discord guild ID, stored as a string (Discord IDs exceed i32 range and
/// are opaque — never arithmetic).
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ServerId(pub String);

impl ServerId {
    /// Sentinel used for DM-scoped rows (`server_id = "0"`).
    pub fn dm() -> Self {
        Self("0".to_string())
    }

    pub fn is_dm(&self) -> bool {
        self.0 == "0"
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ServerId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<String> for ServerId {
    fn from(s: String) -> Self {
        Self(s)
    }
}

impl From<&str> for ServerId {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}

/// A Discord user ID, stored as a string for the same reason as `ServerId`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct UserId(pub String);

impl UserId {
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for UserId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<String> for UserId {
    fn from(s: String) -> Self {
        Self(s)
    }
}

impl From<&str> for UserId {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}

/// Per-server ingestion policy and residency.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum ErrorPolicy {
    /// One failed message stage is logged and the batch continues.
    Skip,
    /// One failed message stage aborts the whole batch for this server.
    Stop,
}

impl fmt::Display for ErrorPolicy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ErrorPolicy::Skip => write!(f, "skip"),
            ErrorPolicy::Stop => write!(f, "stop"),
        }
    }
}

impl std::str::FromStr for ErrorPolicy {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s {
            "skip" => Ok(ErrorPolicy::Skip),
            "stop" => Ok(ErrorPolicy::Stop),
            other => Err(format!("unknown error_policy: {other}")),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    pub server_id: ServerId,
    pub server_name: String,
    pub error_policy: ErrorPolicy,
    pub embedding_model_id: String,
    pub created_at: chrono::DateTime<chrono::Utc>,
    pub updated_at: chrono::DateTime<chrono::Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChannelRef {
    pub id: String,
    pub name: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AuthorRef {
    pub id: String,
    pub name: String,
    pub display_name: Option<String>,
    pub global_name: Option<String>,
    pub nick: Option<String>,
    pub bot: bool,
}

impl AuthorRef {
    /// Priority: display_name > global_name > nick > username.
    pub fn best_display_name(&self) -> &str {
        self.display_name
            .as_deref()
            .or(self.global_name.as_deref())
            .or(self.nick.as_deref())
            .unwrap_or(&self.name)
    }
}

/// A message as received from the Discord adapter, before any processing.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RawMessage {
    pub message_id: String,
    pub server_id: ServerId,
    pub channel: ChannelRef,
    pub author: AuthorRef,
    pub content: String,
    pub attachments: Vec<String>,
    pub timestamp: chrono::DateTime<chrono::Utc>,
    pub reply_to: Option<String>,
    pub edited: bool,
    pub pinned: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ProcessedStatus {
    Prepared,
    Stored,
    Failed,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LinkSummary {
    pub url: String,
    pub summary_text: String,
    pub tokens: u32,
    pub elapsed_ms: u64,
}

/// The result of running a `RawMessage` through the pipeline.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProcessedMessage {
    pub message_id: String,
    pub server_id: ServerId,
    pub embedding_text: String,
    pub embedding_vector: Option<Vec<f32>>,
    pub link_summaries: Vec<LinkSummary>,
    pub image_captions: Vec<String>,
    pub status: ProcessedStatus,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TurnRole {
    User,
    Assistant,
}

impl fmt::Display for TurnRole {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TurnRole::User => write!(f, "user"),
            TurnRole::Assistant => write!(f, "assistant"),
        }
    }
}

impl std::str::FromStr for TurnRole {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s {
            "user" => Ok(TurnRole::User),
            "assistant" => Ok(TurnRole::Assistant),
            other => Err(format!("unknown turn role: {other}")),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConvTurn {
    pub id: i64,
    pub user_id: UserId,
    pub server_id: ServerId,
    pub role: TurnRole,
    pub content: String,
    pub timestamp: chrono::DateTime<chrono::Utc>,
    pub session_id: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RequestType {
    Chat,
    Voice,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RequestStatus {
    Queued,
    Processing,
    Completed,
    Failed,
}

/// Origin reference for where to send the response — a Discord channel plus
/// an optional status message that should be edited in place.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OriginChannelRef {
    pub channel_id: u64,
    pub status_message_id: Option<u64>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct QueueRequest {
    pub user_id: UserId,
    pub server_id: ServerId,
    pub message: String,
    pub request_type: RequestType,
    pub enqueued_at: chrono::DateTime<chrono::Utc>,
    pub status: RequestStatus,
    pub origin_channel: OriginChannelRef,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VoiceSession {
    pub id: String,
    pub user_id: UserId,
    pub guild_id: String,
    pub channel_id: String,
    pub created_at: chrono::DateTime<chrono::Utc>,
    pub ended_at: Option<chrono::DateTime<chrono::Utc>>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Transcription {
    pub session_id: String,
    pub chunk_index: u32,
    pub text: String,
    pub confidence: Option<f32>,
    pub duration_sec: Option<f32>,
    pub timestamp: chrono::DateTime<chrono::Utc>,
}
