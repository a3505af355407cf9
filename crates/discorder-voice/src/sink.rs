use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;

use dashmap::DashMap;
use tokio::sync::mpsc;
use tracing::{debug, instrument, warn};

use discorder_core::types::{Transcription, UserId};
use discorder_gateway::ModelGateway;
use discorder_store::ConversationStore;

use crate::resample::{downmix_stereo_i16, Resampler48kTo16k};
use crate::vad::{Vad, SPEECH_THRESHOLD, VAD_CHUNK_SAMPLES};

/// 20 ms of stereo PCM at 48 kHz: 960 frames * 2 channels.
pub const FRAME_SAMPLES_PER_CHANNEL: usize = 960;

const PACKET_QUEUE_CAPACITY: usize = 50;
/// Default silence run, in ms, before an in-progress segment is flushed.
pub const DEFAULT_SILENCE_DURATION_MS: u64 = 800;
const MIN_SEGMENT_MS: u64 = 300;
const CHUNK_DURATION_MS: u64 = (VAD_CHUNK_SAMPLES as u64 * 1000) / 16_000;

enum SpeakingState {
    Idle,
    Speaking { samples: Vec<f32>, silence_ms: u64 },
}

/// Consumes raw 48 kHz stereo PCM frames per speaker, detects speech
/// segments, and dispatches finished segments to the Model Gateway for
/// transcription.
pub struct AudioSink {
    session_id: String,
    store: Arc<ConversationStore>,
    gateway: Arc<ModelGateway>,
    vad: Arc<dyn Vad>,
    silence_duration_ms: u64,
    chunk_index: AtomicU32,
    senders: DashMap<UserId, mpsc::Sender<Vec<i16>>>,
}

impl AudioSink {
    pub fn new(
        session_id: impl Into<String>,
        store: Arc<ConversationStore>,
        gateway: Arc<ModelGateway>,
        vad: Arc<dyn Vad>,
        silence_duration_ms: u64,
    ) -> Arc<Self> {
        Arc::new(Self {
            session_id: session_id.into(),
            store,
            gateway,
            vad,
            silence_duration_ms,
            chunk_index: AtomicU32::new(0),
            senders: DashMap::new(),
        })
    }

    /// Feed one 20 ms stereo frame for `user_id`. Drops the frame (rather
    /// than blocking the voice receive loop) if that user's packet queue is
    /// already full.
    pub fn push_frame(self: &Arc<Self>, user_id: UserId, interleaved_stereo: Vec<i16>) {
        let sender = self
            .senders
            .entry(user_id.clone())
            .or_insert_with(|| self.spawn_user_task(user_id.clone()))
            .clone();
        if sender.try_send(interleaved_stereo).is_err() {
            debug!(user_id = user_id.as_str(), "packet queue full, dropping frame");
        }
    }

    pub fn remove_user(&self, user_id: &UserId) {
        self.senders.remove(user_id);
    }

    fn spawn_user_task(self: &Arc<Self>, user_id: UserId) -> mpsc::Sender<Vec<i16>> {
        let (tx, mut rx) = mpsc::channel::<Vec<i16>>(PACKET_QUEUE_CAPACITY);
        let this = Arc::clone(self);
        tokio::spawn(async move {
            let mut resampler = match Resampler48kTo16k::new(FRAME_SAMPLES_PER_CHANNEL) {
                Ok(r) => r,
                Err(e) => {
                    warn!(user_id = user_id.as_str(), error = %e, "failed to start resampler");
                    return;
                }
            };
            let mut vad_buffer: Vec<f32> = Vec::with_capacity(VAD_CHUNK_SAMPLES * 2);
            let mut state = SpeakingState::Idle;

            while let Some(frame) = rx.recv().await {
                let mono = downmix_stereo_i16(&frame);
                let resampled = match resampler.process(&mono) {
                    Ok(s) => s,
                    Err(e) => {
                        warn!(user_id = user_id.as_str(), error = %e, "resample failed");
                        continue;
                    }
                };
                vad_buffer.extend(resampled);

                while vad_buffer.len() >= VAD_CHUNK_SAMPLES {
                    let chunk: Vec<f32> = vad_buffer.drain(..VAD_CHUNK_SAMPLES).collect();
                    this.process_chunk(&user_id, &mut state, chunk).await;
                }
            }

            // Flush whatever was in flight when the stream ended.
            if let SpeakingState::Speaking { samples, .. } = state {
                this.flush_segment(&user_id, samples).await;
            }
        });
        tx
    }

    async fn process_chunk(&self, user_id: &UserId, state: &mut SpeakingState, chunk: Vec<f32>) {
        let prob = self.vad.speech_probability(&chunk);
        let is_speech = prob >= SPEECH_THRESHOLD;

        match state {
            SpeakingState::Idle => {
                if is_speech {
                    *state = SpeakingState::Speaking { samples: chunk, silence_ms: 0 };
                }
            }
            SpeakingState::Speaking { samples, silence_ms } => {
                samples.extend(chunk);
                if is_speech {
                    *silence_ms = 0;
                } else {
                    *silence_ms += CHUNK_DURATION_MS;
                    if *silence_ms >= self.silence_duration_ms {
                        let finished = std::mem::take(samples);
                        *state = SpeakingState::Idle;
                        self.flush_segment(user_id, finished).await;
                    }
                }
            }
        }
    }

    #[instrument(skip(self, samples), fields(session_id = %self.session_id))]
    async fn flush_segment(&self, user_id: &UserId, samples: Vec<f32>) {
        let duration_ms = (samples.len() as u64 * 1000) / 16_000;
        if duration_ms < MIN_SEGMENT_MS {
            debug!(user_id = user_id.as_str(), duration_ms, "segment too short, discarding");
            return;
        }

        let transcript = match self.gateway.transcribe(&samples).await {
            Ok(t) => t,
            Err(e) => {
                warn!(user_id = user_id.as_str(), error = %e, "transcription failed");
                return;
            }
        };
        if transcript.text.trim().is_empty() {
            return;
        }

        let chunk_index = self.chunk_index.fetch_add(1, Ordering::SeqCst);
        let row = Transcription {
            session_id: self.session_id.clone(),
            chunk_index,
            text: transcript.text,
            confidence: Some(transcript.confidence),
            duration_sec: Some(duration_ms as f32 / 1000.0),
            timestamp: chrono::Utc::now(),
        };
        if let Err(e) = self.store.append_transcription(&row) {
            warn!(user_id = user_id.as_str(), error = %e, "failed to persist transcription");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn chunk_duration_is_32ms() {
        assert_eq!(CHUNK_DURATION_MS, 32);
    }

    #[test]
    fn silence_flush_exceeds_min_segment() {
        assert!(DEFAULT_SILENCE_DURATION_MS > MIN_SEGMENT_MS);
    }
}
