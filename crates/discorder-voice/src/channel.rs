use std::sync::Arc;

use async_trait::async_trait;

use crate::sink::AudioSink;

/// Discord-side voice channel provisioning, kept behind a trait so this
/// crate has no dependency on the Discord adapter or its HTTP client. The
/// adapter crate supplies the real implementation; tests use a fake.
#[async_trait]
pub trait VoiceChannelProvisioner: Send + Sync {
    /// Create a private channel (visible only to the bot and `user_id`) in
    /// `guild_id`, named after `display_name`, and connect the bot to it.
    /// Returns the new channel's id.
    async fn create_and_join(
        &self,
        guild_id: &str,
        user_id: &str,
        display_name: &str,
    ) -> Result<String, String>;

    /// True once `user_id` is actually present in `channel_id`'s voice
    /// state — used to resolve the `waiting -> active` transition.
    async fn is_user_present(&self, guild_id: &str, channel_id: &str, user_id: &str) -> bool;

    /// Disconnect the bot and delete the channel. Idempotent: called again
    /// on a channel that no longer exists is not an error.
    async fn disconnect_and_delete(&self, guild_id: &str, channel_id: &str) -> Result<(), String>;

    /// Best-effort DM to the session owner (timeout/cleanup notices).
    async fn notify_user(&self, user_id: &str, text: &str);

    /// Called once the session's Audio Sink exists, so the adapter can wire
    /// its receive-side audio event handler to push frames into it. Default
    /// no-op for implementations (e.g. tests) that don't carry live audio.
    async fn attach_sink(&self, _guild_id: &str, _channel_id: &str, _sink: Arc<AudioSink>) {}
}
