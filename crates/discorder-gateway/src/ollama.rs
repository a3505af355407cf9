use async_trait::async_trait;
use base64::Engine;
use serde::Deserialize;
use tracing::{debug, warn};

use crate::error::GatewayError;
use crate::provider::{
    ChatRequest, ChatResponse, EmbeddingProvider, LlmProvider, ToolCall, VisionProvider,
};

pub struct OllamaProvider {
    client: reqwest::Client,
    base_url: String,
}

impl OllamaProvider {
    pub fn new(base_url: impl Into<String>) -> Self {
        Self {
            client: reqwest::Client::new(),
            base_url: base_url.into(),
        }
    }

    fn connect_err(e: reqwest::Error) -> GatewayError {
        if e.is_connect() || e.is_timeout() {
            GatewayError::Unavailable(e.to_string())
        } else {
            GatewayError::Http(e)
        }
    }

    /// Send a negligible prompt to load the model into memory and keep it
    /// resident for `keep_alive` (e.g. `"30m"`).
    pub async fn prewarm(&self, model: &str, keep_alive: &str) -> Result<(), GatewayError> {
        let url = format!("{}/api/generate", self.base_url);
        self.client
            .post(&url)
            .json(&serde_json::json!({
                "model": model,
                "prompt": "",
                "keep_alive": keep_alive,
            }))
            .send()
            .await
            .map_err(Self::connect_err)?;
        Ok(())
    }

    pub async fn unload(&self, model: &str) -> Result<(), GatewayError> {
        let url = format!("{}/api/generate", self.base_url);
        self.client
            .post(&url)
            .json(&serde_json::json!({
                "model": model,
                "prompt": "",
                "keep_alive": 0,
            }))
            .send()
            .await
            .map_err(Self::connect_err)?;
        Ok(())
    }
}

#[async_trait]
impl LlmProvider for OllamaProvider {
    fn name(&self) -> &str {
        "ollama"
    }

    async fn unload(&self, model: &str) -> Result<(), GatewayError> {
        OllamaProvider::unload(self, model).await
    }

    async fn send(&self, req: &ChatRequest) -> Result<ChatResponse, GatewayError> {
        let url = format!("{}/api/chat", self.base_url);
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
            "stream": false,
            "options": {
                "num_predict": req.max_tokens,
                "temperature": req.temperature,
            },
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

        debug!(model = %req.model, "sending chat request to Ollama");
        let resp = self
            .client
            .post(&url)
            .json(&body)
            .send()
            .await
            .map_err(Self::connect_err)?;

        let status = resp.status().as_u16();
        if !resp.status().is_success() {
            let text = resp.text().await.unwrap_or_default();
            warn!(status, body = %text, "Ollama chat error");
            return Err(GatewayError::Api { status, message: text });
        }

        let api: ChatApiResponse = resp
            .json()
            .await
            .map_err(|e| GatewayError::Parse(e.to_string()))?;

        let tool_calls: Vec<ToolCall> = api
            .message
            .tool_calls
            .unwrap_or_default()
            .into_iter()
            .enumerate()
            .map(|(i, tc)| ToolCall {
                id: format!("ollama-tool-{i}"),
                name: tc.function.name,
                input: tc.function.arguments,
            })
            .collect();
        let stop_reason = if !tool_calls.is_empty() {
            "tool_calls".to_string()
        } else if api.done {
            "stop".to_string()
        } else {
            String::new()
        };

        Ok(ChatResponse {
            content: api.message.content,
            model: api.model,
            tokens_in: api.prompt_eval_count.unwrap_or(0),
            tokens_out: api.eval_count.unwrap_or(0),
            stop_reason,
            tool_calls,
        })
    }
}

#[async_trait]
impl VisionProvider for OllamaProvider {
    fn name(&self) -> &str {
        "ollama"
    }

    async fn caption(
        &self,
        model: &str,
        image_bytes: &[u8],
        _mime_type: &str,
        prompt: &str,
    ) -> Result<String, GatewayError> {
        let url = format!("{}/api/chat", self.base_url);
        let image_b64 = base64::engine::general_purpose::STANDARD.encode(image_bytes);
        let body = serde_json::json!({
            "model": model,
            "messages": [{
                "role": "user",
                "content": prompt,
                "images": [image_b64],
            }],
            "stream": false,
        });

        let resp = self
            .client
            .post(&url)
            .json(&body)
            .send()
            .await
            .map_err(Self::connect_err)?;

        let status = resp.status().as_u16();
        if !resp.status().is_success() {
            let text = resp.text().await.unwrap_or_default();
            return Err(GatewayError::Api { status, message: text });
        }

        let api: ChatApiResponse = resp
            .json()
            .await
            .map_err(|e| GatewayError::Parse(e.to_string()))?;
        Ok(api.message.content)
    }
}

#[async_trait]
impl EmbeddingProvider for OllamaProvider {
    fn name(&self) -> &str {
        "ollama"
    }

    async fn unload(&self, model: &str) -> Result<(), GatewayError> {
        OllamaProvider::unload(self, model).await
    }

    async fn embed(&self, model: &str, text: &str) -> Result<Vec<f32>, GatewayError> {
        let url = format!("{}/api/embeddings", self.base_url);
        let resp = self
            .client
            .post(&url)
            .json(&serde_json::json!({"model": model, "prompt": text}))
            .send()
            .await
            .map_err(Self::connect_err)?;

        let status = resp.status().as_u16();
        if !resp.status().is_success() {
            let text = resp.text().await.unwrap_or_default();
            return Err(GatewayError::Api { status, message: text });
        }

        let api: EmbeddingApiResponse = resp
            .json()
            .await
            .map_err(|e| GatewayError::Parse(e.to_string()))?;
        Ok(api.embedding)
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
struct ChatApiResponse {
    model: String,
    message: OllamaMessage,
    done: bool,
    prompt_eval_count: Option<u32>,
    eval_count: Option<u32>,
}

#[derive(Deserialize)]
struct OllamaMessage {
    content: String,
    #[serde(default)]
    tool_calls: Option<Vec<OllamaToolCall>>,
}

#[derive(Deserialize)]
struct OllamaToolCall {
    function: OllamaToolCallFunction,
}

#[derive(Deserialize)]
struct OllamaToolCallFunction {
    name: String,
    arguments: serde_json::Value,
}

#[derive(Deserialize)]
struct EmbeddingApiResponse {
    embedding: Vec<f32>,
}
