//! The single tool bound to an [`AgentRunner`]: `search_messages`, backed by
//! the Vector Store Facade.

use std::sync::Arc;

use tracing::{debug, instrument};

use discorder_core::types::ServerId;
use discorder_gateway::{ModelGateway, ToolDefinition};
use discorder_vector::VectorStore;

use crate::error::Result;

pub const TOOL_NAME: &str = "search_messages";

/// Number of hits requested from the Vector Store Facade.
const RESULT_K: u64 = 5;

/// Hits below this relevance score are dropped before formatting.
const RELEVANCE_CUTOFF: f32 = 0.1;

/// Content is truncated to this many characters per hit in the formatted block.
const CONTENT_PREVIEW_CHARS: usize = 800;

pub fn definition() -> ToolDefinition {
    ToolDefinition {
        name: TOOL_NAME.to_string(),
        description: "Search previously ingested messages in this server for content relevant \
            to the user's question. Use this when the user asks about past conversations, \
            topics discussed earlier, or anything that requires recalling server history."
            .to_string(),
        input_schema: serde_json::json!({
            "type": "object",
            "properties": {
                "query": {
                    "type": "string",
                    "description": "A descriptive search query, e.g. \"standup meeting notes\".",
                }
            },
            "required": ["query"],
        }),
    }
}

/// Embed `query` and search the server's vector collection, returning a
/// human-readable block for injection back into the model's context.
#[instrument(skip(gateway, vector_store), fields(server_id = %server_id))]
pub async fn search_messages(
    gateway: &ModelGateway,
    vector_store: &VectorStore,
    embedding_model: &str,
    server_id: &ServerId,
    query: &str,
) -> Result<String> {
    if query.trim().is_empty() {
        return Ok("No relevant messages found in the server history.".to_string());
    }

    let vector = gateway.embed(embedding_model, query).await?;
    let hits = vector_store.query(server_id, vector, RESULT_K).await?;
    let relevant: Vec<_> = hits.into_iter().filter(|h| h.distance >= RELEVANCE_CUTOFF).collect();

    debug!(count = relevant.len(), "search_messages hits after relevance cutoff");

    if relevant.is_empty() {
        return Ok("No relevant messages found in the server history.".to_string());
    }

    let mut out = String::from("Here's what I found in the message history:\n\n");
    for (i, hit) in relevant.iter().enumerate() {
        let content = if hit.content.chars().count() > CONTENT_PREVIEW_CHARS {
            let truncated: String = hit.content.chars().take(CONTENT_PREVIEW_CHARS).collect();
            format!("{truncated}...")
        } else {
            hit.content.clone()
        };
        out.push_str(&format!(
            "{}. [{}] #{} ({}, relevance {:.2}): {}\n",
            i + 1,
            hit.metadata.author_display_name,
            hit.metadata.channel_name,
            hit.metadata.timestamp.to_rfc3339(),
            hit.distance,
            content,
        ));
    }
    Ok(out)
}

pub struct SearchMessagesTool {
    pub gateway: Arc<ModelGateway>,
    pub vector_store: Arc<VectorStore>,
    pub embedding_model: String,
}

impl SearchMessagesTool {
    pub async fn run(&self, server_id: &ServerId, query: &str) -> Result<String> {
        search_messages(&self.gateway, &self.vector_store, &self.embedding_model, server_id, query)
            .await
    }
}
