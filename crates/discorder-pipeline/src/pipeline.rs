use std::sync::Arc;

use tracing::{debug, info, instrument, warn};

use discorder_core::types::{
    ErrorPolicy, LinkSummary as CoreLinkSummary, ProcessedMessage, ProcessedStatus, RawMessage,
};
use discorder_extract::{ImageCaptioner, LinkExtractor};
use discorder_gateway::ModelGateway;
use discorder_registry::ConfigRegistry;
use discorder_vector::{PointMetadata, VectorStore};

use crate::error::{PipelineError, Result};

#[derive(Debug)]
pub enum PipelineOutcome {
    /// Server has no completed ServerConfig; message dropped silently.
    Dropped,
    /// Message had no text and no attachments; reported as success with no writes.
    EmptySkipped,
    Stored(ProcessedMessage),
    Failed { message_id: String, reason: String },
}

struct ContentClassification {
    has_text: bool,
    has_images: bool,
    has_urls: bool,
    has_mentions: bool,
    is_empty: bool,
}

fn classify(msg: &RawMessage) -> ContentClassification {
    let has_text = !msg.content.trim().is_empty();
    let has_images = !msg.attachments.is_empty();
    let has_urls = !discorder_extract::extract_urls(&msg.content).is_empty();
    let mentions = discorder_extract::extract_mentions(&msg.content);
    let has_mentions = !mentions.user_ids.is_empty() || !mentions.channel_ids.is_empty();
    ContentClassification {
        has_text,
        has_images,
        has_urls,
        has_mentions,
        is_empty: !has_text && !has_images,
    }
}

/// Per-message orchestrator: gate → classify → extract → caption →
/// composite-embed → normalize → store.
pub struct MessagePipeline {
    registry: Arc<ConfigRegistry>,
    vector_store: Arc<VectorStore>,
    gateway: Arc<ModelGateway>,
    link_extractor: Arc<LinkExtractor>,
    image_captioner: Arc<ImageCaptioner>,
    vector_dim: u64,
}

impl MessagePipeline {
    pub fn new(
        registry: Arc<ConfigRegistry>,
        vector_store: Arc<VectorStore>,
        gateway: Arc<ModelGateway>,
        link_extractor: Arc<LinkExtractor>,
        image_captioner: Arc<ImageCaptioner>,
        vector_dim: u64,
    ) -> Self {
        Self {
            registry,
            vector_store,
            gateway,
            link_extractor,
            image_captioner,
            vector_dim,
        }
    }

    /// Processes a batch (possibly size 1). Under `error_policy = stop`, the
    /// first failing message aborts the rest of the batch for that server.
    #[instrument(skip(self, messages))]
    pub async fn process_batch(&self, messages: Vec<RawMessage>) -> Vec<PipelineOutcome> {
        let mut outcomes = Vec::with_capacity(messages.len());
        for msg in messages {
            let server_id = msg.server_id.clone();
            match self.process_one(msg).await {
                Ok(outcome) => outcomes.push(outcome),
                Err(PipelineError::BatchAborted { message_id, reason, .. }) => {
                    warn!(server_id = server_id.as_str(), message_id, reason, "batch aborted");
                    outcomes.push(PipelineOutcome::Failed { message_id, reason });
                    break;
                }
            }
        }
        outcomes
    }

    #[instrument(skip(self, msg), fields(message_id = %msg.message_id, server_id = %msg.server_id))]
    async fn process_one(&self, msg: RawMessage) -> Result<PipelineOutcome> {
        let Some(config) = self.registry.get(msg.server_id.as_str()) else {
            debug!("dropping message: server not configured");
            return Ok(PipelineOutcome::Dropped);
        };

        let classification = classify(&msg);
        if classification.is_empty {
            debug!("skipping empty message");
            return Ok(PipelineOutcome::EmptySkipped);
        }

        let mut link_summaries: Vec<CoreLinkSummary> = Vec::new();
        if classification.has_urls || classification.has_mentions {
            let urls = discorder_extract::extract_urls(&msg.content);
            for url in urls {
                match self.link_extractor.summarize(&url).await {
                    Ok(summary) => link_summaries.push(CoreLinkSummary {
                        url: summary.url,
                        summary_text: summary.summary_text,
                        tokens: summary.tokens,
                        elapsed_ms: summary.elapsed_ms,
                    }),
                    Err(e) => {
                        if config.error_policy == ErrorPolicy::Stop {
                            return Err(PipelineError::BatchAborted {
                                server_id: msg.server_id.as_str().to_string(),
                                message_id: msg.message_id.clone(),
                                reason: format!("link extraction failed for {url}: {e}"),
                            });
                        }
                        warn!(url, error = %e, "skipping URL due to extraction failure");
                    }
                }
            }
        }

        let mut image_captions: Vec<String> = Vec::new();
        if classification.has_images {
            for (url, result) in self.image_captioner.caption_all(&msg.attachments).await {
                match result {
                    Ok(caption) => image_captions.push(caption),
                    Err(e) => {
                        if config.error_policy == ErrorPolicy::Stop {
                            return Err(PipelineError::BatchAborted {
                                server_id: msg.server_id.as_str().to_string(),
                                message_id: msg.message_id.clone(),
                                reason: format!("image captioning failed for {url}: {e}"),
                            });
                        }
                        warn!(url, error = %e, "skipping image due to captioning failure");
                    }
                }
            }
        }

        let embedding_text = build_composite_text(&msg.content, &link_summaries, &image_captions);

        let mut processed = ProcessedMessage {
            message_id: msg.message_id.clone(),
            server_id: msg.server_id.clone(),
            embedding_text: embedding_text.clone(),
            embedding_vector: None,
            link_summaries,
            image_captions,
            status: ProcessedStatus::Prepared,
        };

        if embedding_text.trim().is_empty() {
            processed.status = ProcessedStatus::Stored;
            return Ok(PipelineOutcome::Stored(processed));
        }

        let vector = match self.gateway.embed(&config.embedding_model_id, &embedding_text).await {
            Ok(v) => v,
            Err(e) => {
                processed.status = ProcessedStatus::Failed;
                if config.error_policy == ErrorPolicy::Stop {
                    return Err(PipelineError::BatchAborted {
                        server_id: msg.server_id.as_str().to_string(),
                        message_id: msg.message_id.clone(),
                        reason: format!("embedding failed: {e}"),
                    });
                }
                warn!(error = %e, "embedding failed, marking message failed");
                return Ok(PipelineOutcome::Failed {
                    message_id: msg.message_id.clone(),
                    reason: e.to_string(),
                });
            }
        };

        if let Err(e) = self.vector_store.ensure_collection(&msg.server_id, self.vector_dim).await {
            processed.status = ProcessedStatus::Failed;
            if config.error_policy == ErrorPolicy::Stop {
                return Err(PipelineError::BatchAborted {
                    server_id: msg.server_id.as_str().to_string(),
                    message_id: msg.message_id.clone(),
                    reason: format!("collection setup failed: {e}"),
                });
            }
            warn!(error = %e, "collection setup failed, marking message failed");
            return Ok(PipelineOutcome::Failed {
                message_id: msg.message_id.clone(),
                reason: e.to_string(),
            });
        }

        let metadata = PointMetadata {
            author_id: msg.author.id.clone(),
            author_display_name: msg.author.best_display_name().to_string(),
            channel_id: msg.channel.id.clone(),
            channel_name: msg.channel.name.clone(),
            timestamp: msg.timestamp,
        };

        if let Err(e) = self
            .vector_store
            .upsert(&msg.server_id, &msg.message_id, &embedding_text, vector.clone(), metadata)
            .await
        {
            processed.status = ProcessedStatus::Failed;
            if config.error_policy == ErrorPolicy::Stop {
                return Err(PipelineError::BatchAborted {
                    server_id: msg.server_id.as_str().to_string(),
                    message_id: msg.message_id.clone(),
                    reason: format!("vector upsert failed: {e}"),
                });
            }
            warn!(error = %e, "vector upsert failed, marking message failed");
            return Ok(PipelineOutcome::Failed {
                message_id: msg.message_id.clone(),
                reason: e.to_string(),
            });
        }

        processed.embedding_vector = Some(vector);
        processed.status = ProcessedStatus::Stored;
        info!("message stored");
        Ok(PipelineOutcome::Stored(processed))
    }
}

fn build_composite_text(content: &str, link_summaries: &[CoreLinkSummary], image_captions: &[String]) -> String {
    let mut parts = vec![content.to_string()];
    if !link_summaries.is_empty() {
        parts.push(
            link_summaries
                .iter()
                .map(|s| s.summary_text.as_str())
                .collect::<Vec<_>>()
                .join("\n\n"),
        );
    }
    if !image_captions.is_empty() {
        parts.push(image_captions.join("\n\n"));
    }
    parts
        .into_iter()
        .filter(|p| !p.trim().is_empty())
        .collect::<Vec<_>>()
        .join("\n\n")
}

#[cfg(test)]
mod tests {
    use super::*;
    use discorder_core::types::{AuthorRef, ChannelRef};
    use chrono::Utc;

    fn sample_message(content: &str, attachments: Vec<String>) -> RawMessage {
        RawMessage {
            message_id: "m1".to_string(),
            server_id: discorder_core::types::ServerId::from("s1"),
            channel: ChannelRef { id: "c1".into(), name: "general".into() },
            author: AuthorRef {
                id: "u1".into(),
                name: "alice".into(),
                display_name: None,
                global_name: None,
                nick: None,
                bot: false,
            },
            content: content.to_string(),
            attachments,
            timestamp: Utc::now(),
            reply_to: None,
            edited: false,
            pinned: false,
        }
    }

    #[test]
    fn classifies_empty_message() {
        let msg = sample_message("   ", vec![]);
        let c = classify(&msg);
        assert!(c.is_empty);
        assert!(!c.has_text);
        assert!(!c.has_images);
    }

    #[test]
    fn classifies_urls_and_mentions() {
        let msg = sample_message("check <@123> and https://example.com", vec![]);
        let c = classify(&msg);
        assert!(!c.is_empty);
        assert!(c.has_urls);
        assert!(c.has_mentions);
    }

    #[test]
    fn composite_text_joins_nonempty_sections() {
        let summaries = vec![CoreLinkSummary {
            url: "https://x".into(),
            summary_text: "a summary".into(),
            tokens: 10,
            elapsed_ms: 5,
        }];
        let captions = vec!["a caption".to_string()];
        let text = build_composite_text("hello", &summaries, &captions);
        assert_eq!(text, "hello\n\na summary\n\na caption");
    }

    #[test]
    fn composite_text_skips_empty_sections() {
        let text = build_composite_text("hello", &[], &[]);
        assert_eq!(text, "hello");
    }
}
