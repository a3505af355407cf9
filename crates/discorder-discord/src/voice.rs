use std::sync::{Arc, OnceLock};

use async_trait::async_trait;
use serenity::all::{ChannelId, ChannelType, GuildId, UserId as SerenityUserId};
use serenity::builder::CreateChannel;
use serenity::http::Http;
use songbird::{CoreEvent, Songbird};
use tracing::warn;

use discorder_voice::{AudioSink, VoiceChannelProvisioner};

use crate::chunk::send_chunked;
use crate::receiver::SinkReceiver;

/// Populated once the gateway connects (in the event handler's `ready`),
/// the same deferred-injection shape as a bot's own user id: the cache
/// doesn't exist until the first `Client` is built, but the Voice Manager
/// (and the provisioner it owns) must be constructed before that.
pub type CacheCell = Arc<OnceLock<Arc<serenity::cache::Cache>>>;

/// Provisions per-session Discord voice channels and drives songbird's call
/// handle. `attach_sink` wires songbird's receive-side events to the
/// session's Audio Sink once the Voice Manager has built it. Uses a
/// standalone REST client rather than the gateway client's, since it must
/// exist before the gateway client does.
pub struct DiscordVoiceChannelProvisioner {
    http: Arc<Http>,
    cache: CacheCell,
    songbird: Arc<Songbird>,
}

impl DiscordVoiceChannelProvisioner {
    pub fn new(http: Arc<Http>, cache: CacheCell, songbird: Arc<Songbird>) -> Self {
        Self {
            http,
            cache,
            songbird,
        }
    }
}

#[async_trait]
impl VoiceChannelProvisioner for DiscordVoiceChannelProvisioner {
    async fn create_and_join(
        &self,
        guild_id: &str,
        _user_id: &str,
        display_name: &str,
    ) -> Result<String, String> {
        let guild_id_num: u64 = guild_id.parse().map_err(|_| "bad guild id".to_string())?;
        let guild_id = GuildId::new(guild_id_num);

        let builder = CreateChannel::new(format!("voice-{display_name}")).kind(ChannelType::Voice);
        let channel = guild_id
            .create_channel(&self.http, builder)
            .await
            .map_err(|e| e.to_string())?;

        self.songbird
            .join(guild_id, channel.id)
            .await
            .map_err(|e| e.to_string())?;

        Ok(channel.id.to_string())
    }

    async fn is_user_present(&self, guild_id: &str, channel_id: &str, user_id: &str) -> bool {
        let (Ok(guild_id), Ok(channel_id), Ok(user_id)) = (
            guild_id.parse::<u64>(),
            channel_id.parse::<u64>(),
            user_id.parse::<u64>(),
        ) else {
            return false;
        };
        let guild_id = GuildId::new(guild_id);
        let Some(cache) = self.cache.get() else {
            return false;
        };
        cache
            .guild(guild_id)
            .map(|g| {
                g.voice_states
                    .get(&SerenityUserId::new(user_id))
                    .and_then(|vs| vs.channel_id)
                    .map(|c| c.get() == channel_id)
                    .unwrap_or(false)
            })
            .unwrap_or(false)
    }

    async fn disconnect_and_delete(&self, guild_id: &str, channel_id: &str) -> Result<(), String> {
        let guild_id_num: u64 = guild_id.parse().map_err(|_| "bad guild id".to_string())?;
        let channel_id_num: u64 = channel_id.parse().map_err(|_| "bad channel id".to_string())?;
        let guild_id = GuildId::new(guild_id_num);

        if self.songbird.get(guild_id).is_some() {
            let _ = self.songbird.remove(guild_id).await;
        }

        ChannelId::new(channel_id_num)
            .delete(&self.http)
            .await
            .map_err(|e| e.to_string())?;
        Ok(())
    }

    async fn notify_user(&self, user_id: &str, text: &str) {
        let Ok(id) = user_id.parse::<u64>() else {
            return;
        };
        let user = SerenityUserId::new(id);
        match user.create_dm_channel(&self.http).await {
            Ok(channel) => {
                if let Err(e) = send_chunked(&self.http, channel.id, text).await {
                    warn!(error = %e, "failed to DM voice notification");
                }
            }
            Err(e) => warn!(error = %e, "failed to open DM channel for voice notification"),
        }
    }

    async fn attach_sink(&self, guild_id: &str, _channel_id: &str, sink: Arc<AudioSink>) {
        let Ok(guild_id) = guild_id.parse::<u64>() else {
            return;
        };
        let guild_id = GuildId::new(guild_id);
        let Some(call) = self.songbird.get(guild_id) else {
            warn!("no active songbird call to attach audio sink to");
            return;
        };
        let mut call = call.lock().await;
        let receiver = SinkReceiver::new(sink);
        call.add_global_event(CoreEvent::SpeakingStateUpdate.into(), receiver.clone());
        call.add_global_event(CoreEvent::VoiceTick.into(), receiver);
    }
}
