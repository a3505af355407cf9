use std::sync::Arc;

use async_trait::async_trait;
use serenity::http::Http;
use serenity::model::id::{ChannelId, MessageId};
use tracing::warn;

use discorder_core::types::OriginChannelRef;
use discorder_queue::StatusSink;

use crate::chunk::send_chunked;

/// Best-effort edit-or-send: if the origin carried a status message id (the
/// "queued" placeholder), edit it in place; otherwise send a fresh message.
/// Errors are logged and swallowed — a failed status update never fails the
/// underlying request.
pub struct DiscordStatusSink {
    http: Arc<Http>,
}

impl DiscordStatusSink {
    pub fn new(http: Arc<Http>) -> Self {
        Self { http }
    }
}

#[async_trait]
impl StatusSink for DiscordStatusSink {
    async fn update_status(&self, origin: &OriginChannelRef, text: &str) {
        let channel_id = ChannelId::new(origin.channel_id);

        if let Some(msg_id) = origin.status_message_id {
            let edit = serenity::builder::EditMessage::new().content(text);
            match channel_id
                .edit_message(&self.http, MessageId::new(msg_id), edit)
                .await
            {
                Ok(_) => return,
                Err(e) => warn!(error = %e, "status edit failed, falling back to send"),
            }
        }

        if let Err(e) = send_chunked(&self.http, channel_id, text).await {
            warn!(error = %e, "status send failed");
        }
    }
}
