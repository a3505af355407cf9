use std::sync::Arc;

use scraper::{Html, Selector};
use tracing::{debug, info, instrument};

use discorder_gateway::ModelGateway;

use crate::error::{ExtractError, Result};

const SUMMARIZE_SYSTEM_PROMPT: &str = "Summarize the key information in this web page content \
    in a few concise sentences, suitable for indexing alongside a chat message that linked to it.";
const MAX_SUMMARY_TOKENS: u32 = 500;

#[derive(Debug, Clone)]
pub struct LinkSummary {
    pub url: String,
    pub summary_text: String,
    pub tokens: u32,
    pub elapsed_ms: u64,
}

/// Fetches a URL, strips it to main-content text, and summarizes it with a
/// single model call. Each stage is independently fatal for that URL only —
/// the caller decides whether a failure aborts the batch (`error_policy`).
pub struct LinkExtractor {
    client: reqwest::Client,
    gateway: Arc<ModelGateway>,
    model: String,
}

impl LinkExtractor {
    pub fn new(gateway: Arc<ModelGateway>, model: impl Into<String>) -> Self {
        Self {
            client: reqwest::Client::new(),
            gateway,
            model: model.into(),
        }
    }

    #[instrument(skip(self))]
    pub async fn summarize(&self, url: &str) -> Result<LinkSummary> {
        let started = std::time::Instant::now();
        let html = self.fetch(url).await?;
        let cleaned = clean_html(&html);
        let summary_text = self.summarize_text(url, &cleaned).await?;

        let elapsed_ms = started.elapsed().as_millis() as u64;
        info!(url, chars = summary_text.len(), elapsed_ms, "link summarized");
        Ok(LinkSummary {
            url: url.to_string(),
            summary_text,
            tokens: MAX_SUMMARY_TOKENS,
            elapsed_ms,
        })
    }

    async fn fetch(&self, url: &str) -> Result<String> {
        let resp = self
            .client
            .get(url)
            .send()
            .await
            .map_err(|source| ExtractError::Fetch { url: url.to_string(), source })?;

        if !resp.status().is_success() {
            return Err(ExtractError::BadStatus {
                url: url.to_string(),
                status: resp.status().as_u16(),
            });
        }

        resp.text()
            .await
            .map_err(|source| ExtractError::Fetch { url: url.to_string(), source })
    }

    async fn summarize_text(&self, url: &str, content: &str) -> Result<String> {
        use discorder_gateway::{ChatRequest, Message, Role};

        let req = ChatRequest {
            model: self.model.clone(),
            system: SUMMARIZE_SYSTEM_PROMPT.to_string(),
            messages: vec![Message {
                role: Role::User,
                content: truncate_for_context(content),
            }],
            max_tokens: MAX_SUMMARY_TOKENS,
            temperature: 0.3,
            tools: vec![],
        };

        let resp = self.gateway.chat(&req).await.map_err(|e| ExtractError::Summarize {
            url: url.to_string(),
            reason: e.to_string(),
        })?;

        if resp.content.trim().is_empty() {
            return Err(ExtractError::Summarize {
                url: url.to_string(),
                reason: "model returned empty summary".to_string(),
            });
        }
        Ok(resp.content)
    }
}

/// Strip boilerplate to main-content text: drop script/style, pull visible
/// text from body, collapse whitespace.
fn clean_html(html: &str) -> String {
    let document = Html::parse_document(html);
    let body_selector = Selector::parse("body").unwrap();

    let text: String = match document.select(&body_selector).next() {
        Some(body) => body.text().collect::<Vec<_>>().join(" "),
        None => document.root_element().text().collect::<Vec<_>>().join(" "),
    };

    let collapsed: Vec<&str> = text.split_whitespace().collect();
    collapsed.join(" ")
}

/// Model calls are token-bounded; cap input characters defensively rather
/// than depending on the provider to truncate.
fn truncate_for_context(text: &str) -> String {
    const MAX_CHARS: usize = 8000;
    if text.len() <= MAX_CHARS {
        text.to_string()
    } else {
        debug!(original_len = text.len(), "truncating page content before summarization");
        text.chars().take(MAX_CHARS).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn strips_tags_and_collapses_whitespace() {
        let html = "<html><head><style>.a{}</style></head><body><p>Hello   world</p>\n<p>Second</p></body></html>";
        let cleaned = clean_html(html);
        assert_eq!(cleaned, "Hello world Second");
    }

    #[test]
    fn truncate_respects_cap() {
        let long = "x".repeat(10_000);
        let truncated = truncate_for_context(&long);
        assert_eq!(truncated.len(), 8000);
    }

    #[test]
    fn truncate_is_noop_under_cap() {
        assert_eq!(truncate_for_context("short"), "short");
    }
}
