//! Bridges songbird's receive-side driver events into the Audio Sink.
//!
//! songbird hands us decoded per-speaker PCM on each voice tick, keyed by
//! SSRC; we keep our own SSRC→Discord-user-id map (populated from
//! `SpeakingStateUpdate`) so frames can be routed to the right per-user
//! channel in the sink.

use std::sync::Arc;

use async_trait::async_trait;
use dashmap::DashMap;
use songbird::events::context_data::{SpeakingUpdateData, VoiceTick};
use songbird::{Event, EventContext, EventHandler as SongbirdEventHandler};
use tracing::debug;

use discorder_core::types::UserId;
use discorder_voice::AudioSink;

#[derive(Clone)]
pub struct SinkReceiver {
    sink: Arc<AudioSink>,
    ssrc_to_user: Arc<DashMap<u32, UserId>>,
}

impl SinkReceiver {
    pub fn new(sink: Arc<AudioSink>) -> Self {
        Self {
            sink,
            ssrc_to_user: Arc::new(DashMap::new()),
        }
    }

    fn note_speaking_update(&self, update: &SpeakingUpdateData) {
        if let Some(user_id) = update.user_id {
            self.ssrc_to_user
                .insert(update.ssrc, UserId::from(user_id.0.to_string()));
        }
    }

    fn handle_tick(&self, tick: &VoiceTick) {
        for (ssrc, data) in tick.speaking.iter() {
            let Some(decoded) = data.decoded_voice.as_ref() else {
                continue;
            };
            let Some(user_id) = self.ssrc_to_user.get(ssrc).map(|u| u.clone()) else {
                debug!(ssrc, "voice tick for unmapped ssrc, dropping");
                continue;
            };
            self.sink.push_frame(user_id, decoded.clone());
        }
    }
}

#[async_trait]
impl SongbirdEventHandler for SinkReceiver {
    async fn act(&self, ctx: &EventContext<'_>) -> Option<Event> {
        match ctx {
            EventContext::SpeakingStateUpdate(update) => {
                self.note_speaking_update(update);
            }
            EventContext::VoiceTick(tick) => {
                self.handle_tick(tick);
            }
            _ => {}
        }
        None
    }
}
