use std::sync::Arc;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use dashmap::DashMap;
use tracing::{debug, info, instrument, warn};

use discorder_core::types::QueueRequest;
use discorder_gateway::{ChatRequest, Message, ModelGateway, Role};
use discorder_queue::ChatResponder;
use discorder_registry::ConfigRegistry;
use discorder_vector::VectorStore;

use crate::tool::{self, TOOL_NAME};

/// Bounded-iteration cap on tool loop turns.
pub const MAX_ITERATIONS: usize = 10;
/// Per-request soft budget for the tool loop itself.
pub const MAX_EXECUTION_TIME: Duration = Duration::from_secs(30);
/// Outer deadline covering the whole `respond()` call, including the first
/// model round-trip.
pub const OUTER_DEADLINE: Duration = Duration::from_secs(45);
/// Responses longer than this are truncated with a visible marker.
pub const MAX_RESPONSE: usize = 1800;
const TRUNCATION_MARKER: &str = "\n\n*(response truncated)*";

const SYSTEM_PROMPT: &str = "You are a helpful Discord assistant. You have access to a \
    search_messages tool that searches this server's message history. Use it when the user \
    refers to something discussed previously or asks you to recall past context. Keep answers \
    concise.";

/// Immutable per-(user, server) setup: system prompt and tool catalog. There
/// is no conversation memory here — each request is answered statelessly —
/// so the cache only saves re-deriving this fixed setup on every request.
struct CachedExecutor {
    #[allow(dead_code)]
    created_at: Instant,
}

/// Per-`(user_id, server_id)` cached executor bound to a single tool,
/// `search_messages`, implemented against the Vector Store Facade.
pub struct AgentRunner {
    gateway: Arc<ModelGateway>,
    vector_store: Arc<VectorStore>,
    registry: Arc<ConfigRegistry>,
    chat_model: String,
    executors: DashMap<(String, String), Arc<CachedExecutor>>,
}

impl AgentRunner {
    pub fn new(
        gateway: Arc<ModelGateway>,
        vector_store: Arc<VectorStore>,
        registry: Arc<ConfigRegistry>,
        chat_model: impl Into<String>,
    ) -> Self {
        Self {
            gateway,
            vector_store,
            registry,
            chat_model: chat_model.into(),
            executors: DashMap::new(),
        }
    }

    fn executor_for(&self, user_id: &str, server_id: &str) -> Arc<CachedExecutor> {
        let key = (user_id.to_string(), server_id.to_string());
        self.executors
            .entry(key)
            .or_insert_with(|| Arc::new(CachedExecutor { created_at: Instant::now() }))
            .clone()
    }

    /// Answers a single user message. Never propagates an error: every
    /// failure mode resolves to a canonical user-facing string.
    #[instrument(skip(self, message), fields(user_id, server_id))]
    pub async fn respond(&self, user_id: &str, server_id: &str, message: &str) -> String {
        let _executor = self.executor_for(user_id, server_id);

        match tokio::time::timeout(OUTER_DEADLINE, self.run_loop(server_id, message)).await {
            Ok(Ok(text)) => truncate_response(&text),
            Ok(Err(reason)) => {
                warn!(reason, "agent run failed");
                discorder_queue::messages::PROCESSING_ERROR.to_string()
            }
            Err(_) => {
                warn!("agent run exceeded outer deadline");
                discorder_queue::messages::TIMEOUT.to_string()
            }
        }
    }

    async fn run_loop(&self, server_id: &str, message: &str) -> Result<String, String> {
        let Some(config) = self.registry.get(server_id) else {
            return Err(format!("server {server_id} is not configured"));
        };

        let deadline = Instant::now() + MAX_EXECUTION_TIME;
        let mut messages = vec![Message { role: Role::User, content: message.to_string() }];

        for iteration in 0..MAX_ITERATIONS {
            if Instant::now() >= deadline {
                return Err("tool loop exceeded its execution time budget".to_string());
            }

            let req = ChatRequest {
                model: self.chat_model.clone(),
                system: SYSTEM_PROMPT.to_string(),
                messages: messages.clone(),
                max_tokens: 800,
                temperature: 0.4,
                tools: vec![tool::definition()],
            };

            let response = self
                .gateway
                .chat(&req)
                .await
                .map_err(|e| format!("model error: {e}"))?;

            if response.stop_reason != "tool_calls" || response.tool_calls.is_empty() {
                debug!(iteration, "agent loop finished without further tool calls");
                return Ok(response.content);
            }

            messages.push(Message { role: Role::Assistant, content: response.content.clone() });

            for call in &response.tool_calls {
                if call.name != TOOL_NAME {
                    messages.push(Message {
                        role: Role::User,
                        content: format!("Tool '{}' is not available.", call.name),
                    });
                    continue;
                }
                let query = call
                    .input
                    .get("query")
                    .and_then(|v| v.as_str())
                    .unwrap_or_default();
                let server = discorder_core::types::ServerId::from(server_id);
                let result = tool::search_messages(
                    &self.gateway,
                    &self.vector_store,
                    &config.embedding_model_id,
                    &server,
                    query,
                )
                .await
                .unwrap_or_else(|e| format!("search_messages failed: {e}"));
                messages.push(Message { role: Role::User, content: result });
            }
        }

        warn!(max_iterations = MAX_ITERATIONS, "agent tool loop hit iteration cap");
        Err("tool loop exceeded the maximum number of iterations".to_string())
    }
}

#[async_trait]
impl ChatResponder for AgentRunner {
    async fn respond(&self, req: &QueueRequest) -> Result<String, String> {
        Ok(AgentRunner::respond(self, req.user_id.as_str(), req.server_id.as_str(), &req.message).await)
    }
}

fn truncate_response(text: &str) -> String {
    if text.chars().count() <= MAX_RESPONSE {
        return text.to_string();
    }
    let budget = MAX_RESPONSE.saturating_sub(TRUNCATION_MARKER.chars().count());
    let truncated: String = text.chars().take(budget).collect();
    format!("{truncated}{TRUNCATION_MARKER}")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn truncate_is_noop_under_cap() {
        let short = "hello world";
        assert_eq!(truncate_response(short), short);
    }

    #[test]
    fn truncate_adds_marker_over_cap() {
        let long = "x".repeat(MAX_RESPONSE + 500);
        let out = truncate_response(&long);
        assert!(out.chars().count() <= MAX_RESPONSE);
        assert!(out.ends_with(TRUNCATION_MARKER));
    }
}
