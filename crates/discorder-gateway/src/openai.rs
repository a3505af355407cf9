use async_trait::async_trait;
use base64::Engine;
use serde::Deserialize;
use tracing::{debug, warn};

use crate::error::GatewayError;
use crate::provider::{
    ChatRequest, ChatResponse, EmbeddingProvider, LlmProvider, ToolCall, VisionProvider,
};

/// An OpenAI-compatible HTTP endpoint — same request/response shape as
/// `OllamaProvider` exposes, but over a bearer-authenticated REST API.
pub struct OpenAiProvider {
    client: reqwest::Client,
    api_key: String,
    base_url: String,
}

impl OpenAiProvider {
    pub fn new(api_key: impl Into<String>, base_url: impl Into<String>) -> Self {
        Self {
            client: reqwest::Client::new(),
            api_key: api_key.into(),
            base_url: base_url.into(),
        }
    }
}

#[async_trait]
impl LlmProvider for OpenAiProvider {
    fn name(&self) -> &str {
        "openai"
    }

    async fn send(&self, req: &ChatRequest) -> Result<ChatResponse, GatewayError> {
        let url = format!("{}/v1/chat/completions", self.base_url);
        let mut messages = vec![serde_json::json!({"role": "system", "content": req.system})];
        for m in &req.messages {
            messages.push(serde_json::json!({
                "role": role_str(&m.role),
                "content": m.content,
            }));
        }
        let mut body = serde_json::json!({
            "model": req.model,
            "messages": messages,
            "max_tokens": req.max_tokens,
            "temperature": req.temperature,
        });
        if !req.tools.is_empty() {
            let tools: Vec<serde_json::Value> = req
                .tools
                .iter()
                .map(|t| {
                    serde_json::json!({
                        "type": "function",
                        "function": {
                            "name": t.name,
                            "description": t.description,
                            "parameters": t.input_schema,
                        },
                    })
                })
                .collect();
            body["tools"] = serde_json::Value::Array(tools);
        }

        debug!(model = %req.model, "sending chat request to OpenAI-compatible endpoint");
        let resp = self
            .client
            .post(&url)
            .bearer_auth(&self.api_key)
            .json(&body)
            .send()
            .await?;

        let status = resp.status().as_u16();
        if status == 429 {
            let retry_after_ms = resp
                .headers()
                .get("retry-after")
                .and_then(|v| v.to_str().ok())
                .and_then(|v| v.parse::<u64>().ok())
                .map(|s| s * 1000)
                .unwrap_or(5000);
            return Err(GatewayError::RateLimited { retry_after_ms });
        }
        if !resp.status().is_success() {
            let text = resp.text().await.unwrap_or_default();
            warn!(status, body = %text, "OpenAI-compatible chat error");
            return Err(GatewayError::Api { status, message: text });
        }

        let api: ChatCompletionResponse = resp
            .json()
            .await
            .map_err(|e| GatewayError::Parse(e.to_string()))?;
        let choice = api
            .choices
            .into_iter()
            .next()
            .ok_or_else(|| GatewayError::Parse("empty choices array".to_string()))?;

        let tool_calls = choice
            .message
            .tool_calls
            .into_iter()
            .flatten()
            .filter_map(|tc| {
                let input = serde_json::from_str(&tc.function.arguments).unwrap_or_default();
                Some(ToolCall {
                    id: tc.id,
                    name: tc.function.name,
                    input,
                })
            })
            .collect();

        Ok(ChatResponse {
            content: choice.message.content.unwrap_or_default(),
            model: api.model,
            tokens_in: api.usage.as_ref().map(|u| u.prompt_tokens).unwrap_or(0),
            tokens_out: api.usage.as_ref().map(|u| u.completion_tokens).unwrap_or(0),
            stop_reason: choice.finish_reason.unwrap_or_default(),
            tool_calls,
        })
    }
}

#[async_trait]
impl VisionProvider for OpenAiProvider {
    fn name(&self) -> &str {
        "openai"
    }

    async fn caption(
        &self,
        model: &str,
        image_bytes: &[u8],
        mime_type: &str,
        prompt: &str,
    ) -> Result<String, GatewayError> {
        let url = format!("{}/v1/chat/completions", self.base_url);
        let data_url = format!(
            "data:{};base64,{}",
            mime_type,
            base64::engine::general_purpose::STANDARD.encode(image_bytes)
        );
        let body = serde_json::json!({
            "model": model,
            "messages": [{
                "role": "user",
                "content": [
                    {"type": "text", "text": prompt},
                    {"type": "image_url", "image_url": {"url": data_url}},
                ],
            }],
        });

        let resp = self
            .client
            .post(&url)
            .bearer_auth(&self.api_key)
            .json(&body)
            .send()
            .await?;

        let status = resp.status().as_u16();
        if !resp.status().is_success() {
            let text = resp.text().await.unwrap_or_default();
            return Err(GatewayError::Api { status, message: text });
        }

        let api: ChatCompletionResponse = resp
            .json()
            .await
            .map_err(|e| GatewayError::Parse(e.to_string()))?;
        api.choices
            .into_iter()
            .next()
            .and_then(|c| c.message.content)
            .ok_or_else(|| GatewayError::Parse("empty choices array".to_string()))
    }
}

#[async_trait]
impl EmbeddingProvider for OpenAiProvider {
    fn name(&self) -> &str {
        "openai"
    }

    async fn embed(&self, model: &str, text: &str) -> Result<Vec<f32>, GatewayError> {
        let url = format!("{}/v1/embeddings", self.base_url);
        let resp = self
            .client
            .post(&url)
            .bearer_auth(&self.api_key)
            .json(&serde_json::json!({"model": model, "input": text}))
            .send()
            .await?;

        let status = resp.status().as_u16();
        if !resp.status().is_success() {
            let text = resp.text().await.unwrap_or_default();
            return Err(GatewayError::Api { status, message: text });
        }

        let api: EmbeddingResponse = resp
            .json()
            .await
            .map_err(|e| GatewayError::Parse(e.to_string()))?;
        api.data
            .into_iter()
            .next()
            .map(|d| d.embedding)
            .ok_or_else(|| GatewayError::Parse("empty embedding data array".to_string()))
    }
}

fn role_str(role: &crate::provider::Role) -> &'static str {
    match role {
        crate::provider::Role::User => "user",
        crate::provider::Role::Assistant => "assistant",
        crate::provider::Role::System => "system",
    }
}

#[derive(Deserialize)]
struct ChatCompletionResponse {
    model: String,
    choices: Vec<Choice>,
    usage: Option<Usage>,
}

#[derive(Deserialize)]
struct Choice {
    message: ChatMessage,
    finish_reason: Option<String>,
}

#[derive(Deserialize)]
struct ChatMessage {
    content: Option<String>,
    #[serde(default)]
    tool_calls: Option<Vec<ApiToolCall>>,
}

#[derive(Deserialize)]
struct ApiToolCall {
    id: String,
    function: ApiToolCallFunction,
}

#[derive(Deserialize)]
struct ApiToolCallFunction {
    name: String,
    arguments: String,
}

#[derive(Deserialize)]
struct Usage {
    prompt_tokens: u32,
    completion_tokens: u32,
}

#[derive(Deserialize)]
struct EmbeddingResponse {
    data: Vec<EmbeddingData>,
}

#[derive(Deserialize)]
struct EmbeddingData {
    embedding: Vec<f32>,
}
