//! Local speech-to-text via `whisper-rs` bindings to whisper.cpp. Unlike the
//! other providers this capability is never remote: the model is loaded
//! once and stays resident for the process lifetime.

use async_trait::async_trait;
use tokio::sync::Mutex;
use whisper_rs::{FullParams, SamplingStrategy, WhisperContext, WhisperContextParameters};

use crate::error::GatewayError;
use crate::provider::{SttProvider, Transcript};

pub struct WhisperSttProvider {
    ctx: Mutex<WhisperContext>,
}

impl WhisperSttProvider {
    /// `model_path` points at a local `ggml-*.bin` model matching the
    /// configured `whisper_model_size`.
    pub fn new(model_path: &str) -> Result<Self, GatewayError> {
        let ctx = WhisperContext::new_with_params(model_path, WhisperContextParameters::default())
            .map_err(|e| GatewayError::Stt(e.to_string()))?;
        Ok(Self { ctx: Mutex::new(ctx) })
    }
}

#[async_trait]
impl SttProvider for WhisperSttProvider {
    fn name(&self) -> &str {
        "whisper"
    }

    async fn transcribe(&self, samples: &[f32]) -> Result<Transcript, GatewayError> {
        let ctx = self.ctx.lock().await;
        let mut state = ctx
            .create_state()
            .map_err(|e| GatewayError::Stt(e.to_string()))?;

        let mut params = FullParams::new(SamplingStrategy::Greedy { best_of: 1 });
        params.set_print_progress(false);
        params.set_print_special(false);
        params.set_print_realtime(false);
        params.set_print_timestamps(false);

        state
            .full(params, samples)
            .map_err(|e| GatewayError::Stt(e.to_string()))?;

        let num_segments = state
            .full_n_segments()
            .map_err(|e| GatewayError::Stt(e.to_string()))?;

        let mut text = String::new();
        let mut confidence_sum = 0.0f32;
        let mut confidence_count = 0u32;

        for i in 0..num_segments {
            let segment = state
                .full_get_segment_text(i)
                .map_err(|e| GatewayError::Stt(e.to_string()))?;
            text.push_str(&segment);

            if let Ok(no_speech_prob) = state.full_get_segment_no_speech_prob(i) {
                confidence_sum += 1.0 - no_speech_prob;
                confidence_count += 1;
            }
        }

        let confidence = if confidence_count > 0 {
            confidence_sum / confidence_count as f32
        } else {
            0.0
        };

        Ok(Transcript {
            text: text.trim().to_string(),
            confidence,
        })
    }
}
