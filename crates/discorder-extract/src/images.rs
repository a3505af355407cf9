use std::sync::Arc;
use std::time::Duration;

use futures_util::StreamExt;
use tracing::{debug, instrument, warn};

use discorder_gateway::ModelGateway;

use crate::error::{ExtractError, Result};

const MAX_IMAGE_BYTES: usize = 10 * 1024 * 1024;
const DOWNLOAD_TIMEOUT: Duration = Duration::from_secs(30);
const CAPTION_PROMPT: &str = "Describe this image concisely for someone who cannot see it.";

/// Downloads Discord attachment images and captions them via the Model
/// Gateway's vision endpoint.
pub struct ImageCaptioner {
    client: reqwest::Client,
    gateway: Arc<ModelGateway>,
    model: String,
}

impl ImageCaptioner {
    pub fn new(gateway: Arc<ModelGateway>, model: impl Into<String>) -> Self {
        Self {
            client: reqwest::Client::builder()
                .timeout(DOWNLOAD_TIMEOUT)
                .build()
                .expect("reqwest client builder with static config"),
            gateway,
            model: model.into(),
        }
    }

    /// Download, validate, and caption a single attachment. Individual
    /// failures are surfaced to the caller, which applies the pipeline's
    /// `error_policy` (skip vs. stop).
    #[instrument(skip(self))]
    pub async fn caption(&self, url: &str) -> Result<String> {
        let (bytes, mime_type) = self.download(url).await?;
        debug!(url, bytes = bytes.len(), mime_type, "downloaded image attachment");

        self.gateway
            .caption_image(&self.model, &bytes, &mime_type, CAPTION_PROMPT)
            .await
            .map_err(|e| ExtractError::Caption(e.to_string()))
    }

    /// Caption every attachment, concatenating successful captions. Rules
    /// for fatality mirror link extraction: individual failures are logged
    /// and skipped by the caller under `skip`, fatal under `stop`.
    pub async fn caption_all(&self, urls: &[String]) -> Vec<(String, Result<String>)> {
        let mut out = Vec::with_capacity(urls.len());
        for url in urls {
            out.push((url.clone(), self.caption(url).await));
        }
        out
    }

    async fn download(&self, url: &str) -> Result<(Vec<u8>, String)> {
        let resp = self
            .client
            .get(url)
            .send()
            .await
            .map_err(|e| ExtractError::ImageDownload(e.to_string()))?;

        if !resp.status().is_success() {
            return Err(ExtractError::ImageDownload(format!(
                "status {} fetching {url}",
                resp.status()
            )));
        }

        let content_type = resp
            .headers()
            .get(reqwest::header::CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .unwrap_or_default()
            .to_string();

        if !content_type.starts_with("image/") {
            warn!(url, content_type, "rejected non-image content type");
            return Err(ExtractError::UnsupportedContentType(content_type));
        }

        let mut stream = resp.bytes_stream();
        let mut buf = Vec::new();
        while let Some(chunk) = stream.next().await {
            let chunk = chunk.map_err(|e| ExtractError::ImageDownload(e.to_string()))?;
            buf.extend_from_slice(&chunk);
            if buf.len() > MAX_IMAGE_BYTES {
                return Err(ExtractError::ImageTooLarge {
                    size: buf.len(),
                    max: MAX_IMAGE_BYTES,
                });
            }
        }

        Ok((buf, content_type))
    }
}
