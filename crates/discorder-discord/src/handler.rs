use std::sync::{Arc, OnceLock};

use serenity::async_trait;
use serenity::model::channel::Message;
use serenity::model::gateway::Ready;
use serenity::model::guild::Guild;
use serenity::model::id::UserId as SerenityUserId;
use serenity::model::voice::VoiceState;
use serenity::prelude::{Context, EventHandler};
use tracing::{info, warn};

use discorder_core::types::{
    AuthorRef, ChannelRef, OriginChannelRef, QueueRequest, RawMessage, RequestStatus, RequestType,
    ServerId, UserId,
};
use discorder_pipeline::MessagePipeline;
use discorder_queue::{messages, EnqueueOutcome, RequestQueue};
use discorder_registry::{ConfigRegistry, DefaultSetupFlow};
use discorder_store::ConversationStore;
use discorder_vector::VectorStore;
use discorder_voice::VoiceManager;

use crate::chunk::send_chunked;
use crate::commands::{self, Command};
use crate::selector::{self, ServerCandidate};
use crate::voice::CacheCell;

const HELP_TEXT: &str = "**Commands**\n\
`!help` — this message\n\
`!status` — bot status\n\
`!info` — about this bot\n\
`!ask [<server>] <question>` — ask about a server's message history\n\
`!clear-conversation-history` — forget our DM conversation";

const INFO_TEXT: &str = "A Discord bot that indexes server conversations and answers questions about them.";

/// Top-level serenity event handler. Guild messages flow into the Message
/// Pipeline; DM messages are parsed as commands and, for `!ask`, enqueued
/// onto the Request Queue. The Queue Worker owns all outbound dispatch —
/// this handler only ever enqueues and (for everything else) replies
/// directly.
pub struct DiscordHandler {
    pub registry: Arc<ConfigRegistry>,
    pub pipeline: Arc<MessagePipeline>,
    pub queue: Arc<RequestQueue>,
    pub store: Arc<ConversationStore>,
    pub vector_store: Arc<VectorStore>,
    pub voice: Arc<VoiceManager>,
    pub command_prefix: String,
    pub default_embedding_model_id: String,
    pub cache_cell: CacheCell,
    pub bot_id: OnceLock<SerenityUserId>,
}

impl DiscordHandler {
    async fn handle_guild_message(&self, msg: &Message) {
        let Some(guild_id) = msg.guild_id else {
            return;
        };
        if msg.content.trim().is_empty() && msg.attachments.is_empty() {
            return;
        }

        let raw = RawMessage {
            message_id: msg.id.to_string(),
            server_id: ServerId::from(guild_id.to_string()),
            channel: ChannelRef {
                id: msg.channel_id.to_string(),
                name: String::new(),
            },
            author: AuthorRef {
                id: msg.author.id.to_string(),
                name: msg.author.name.clone(),
                display_name: msg.author.global_name.clone(),
                global_name: msg.author.global_name.clone(),
                nick: None,
                bot: msg.author.bot,
            },
            content: msg.content.clone(),
            attachments: msg.attachments.iter().map(|a| a.url.clone()).collect(),
            timestamp: *msg.timestamp,
            reply_to: msg
                .referenced_message
                .as_ref()
                .map(|m| m.id.to_string()),
            edited: msg.edited_timestamp.is_some(),
            pinned: msg.pinned,
        };

        for outcome in self.pipeline.process_batch(vec![raw]).await {
            if let discorder_pipeline::PipelineOutcome::Failed { message_id, reason } = outcome {
                warn!(message_id, reason, "message pipeline failed");
            }
        }
    }

    async fn handle_dm(&self, ctx: &Context, msg: &Message) {
        let Some(command) = commands::parse(&self.command_prefix, &msg.content) else {
            return;
        };

        match command {
            Command::Help => {
                let _ = send_chunked(&ctx.http, msg.channel_id, HELP_TEXT).await;
            }
            Command::Info => {
                let _ = send_chunked(&ctx.http, msg.channel_id, INFO_TEXT).await;
            }
            Command::Status => {
                let text = self.build_status_text().await;
                let _ = send_chunked(&ctx.http, msg.channel_id, &text).await;
            }
            Command::ClearHistory => {
                let user_id = UserId::from(msg.author.id.to_string());
                match self.store.clear(&user_id, &ServerId::dm()) {
                    Ok(n) => {
                        let _ = send_chunked(
                            &ctx.http,
                            msg.channel_id,
                            &format!("Cleared {n} messages from our conversation history."),
                        )
                        .await;
                    }
                    Err(e) => {
                        warn!(error = %e, "failed to clear conversation history");
                        let _ = send_chunked(&ctx.http, msg.channel_id, messages::PROCESSING_ERROR).await;
                    }
                }
            }
            Command::Ask { selector, question } => {
                self.handle_ask(ctx, msg, selector, question).await;
            }
        }
    }

    async fn mutual_configured_servers(&self, ctx: &Context, user_id: SerenityUserId) -> Vec<ServerCandidate> {
        let guild_ids: Vec<_> = ctx.cache.guilds();
        let mut candidates = Vec::new();
        for guild_id in guild_ids {
            let is_member = ctx
                .cache
                .guild(guild_id)
                .map(|g| g.members.contains_key(&user_id))
                .unwrap_or(false);
            if !is_member {
                continue;
            }
            let server_id = ServerId::from(guild_id.to_string());
            let Some(config) = self.registry.get(server_id.as_str()) else {
                continue;
            };
            let message_count = self.vector_store.count(&server_id).await.unwrap_or(0);
            let last_indexed = self
                .vector_store
                .latest_indexed_timestamp(&server_id)
                .await
                .ok()
                .flatten();
            candidates.push(ServerCandidate {
                server_id,
                name: config.server_name,
                message_count,
                last_indexed,
            });
        }
        candidates
    }

    async fn handle_ask(
        &self,
        ctx: &Context,
        msg: &Message,
        selector: Option<commands::ServerSelector>,
        question: String,
    ) {
        let candidates = self.mutual_configured_servers(ctx, msg.author.id).await;

        let server_id = match (candidates.len(), selector) {
            (0, _) => {
                let _ = send_chunked(
                    &ctx.http,
                    msg.channel_id,
                    "❌ **No Configured Servers**: I don't share any configured servers with you.",
                )
                .await;
                return;
            }
            (1, None) => candidates[0].server_id.clone(),
            (_, None) => {
                let listing = selector::format_listing(&candidates);
                let _ = send_chunked(&ctx.http, msg.channel_id, &listing).await;
                return;
            }
            (_, Some(sel)) => match selector::resolve(&candidates, &sel) {
                Some(id) => id,
                None => {
                    let _ = send_chunked(&ctx.http, msg.channel_id, "❌ **Invalid Server**").await;
                    return;
                }
            },
        };

        let user_id = UserId::from(msg.author.id.to_string());
        let req = QueueRequest {
            user_id: user_id.clone(),
            server_id,
            message: question,
            request_type: RequestType::Chat,
            enqueued_at: chrono::Utc::now(),
            status: RequestStatus::Queued,
            origin_channel: OriginChannelRef {
                channel_id: msg.channel_id.get(),
                status_message_id: None,
            },
        };

        match self.queue.enqueue(req) {
            EnqueueOutcome::Accepted { position } => {
                let total = self.queue.len().max(position);
                let _ = send_chunked(&ctx.http, msg.channel_id, &messages::queued_position(position, total)).await;
            }
            EnqueueOutcome::RejectedFull => {
                let _ = send_chunked(&ctx.http, msg.channel_id, messages::QUEUE_FULL).await;
            }
            EnqueueOutcome::RejectedDuplicateUser => {
                let _ = send_chunked(
                    &ctx.http,
                    msg.channel_id,
                    "⏳ **Already Processing**: please wait for your current request to finish.",
                )
                .await;
            }
        }
    }

    async fn build_status_text(&self) -> String {
        let server_ids = self.registry.load_all().unwrap_or_default();
        let mut total_messages = 0u64;
        for id in &server_ids {
            total_messages += self.vector_store.count(id).await.unwrap_or(0);
        }
        format!(
            "**Status**\nconfigured servers: {}\nindexed messages: {}\nqueue size: {}\nmode: live",
            server_ids.len(),
            total_messages,
            self.queue.len(),
        )
    }
}

#[async_trait]
impl EventHandler for DiscordHandler {
    async fn ready(&self, ctx: Context, ready: Ready) {
        self.bot_id.set(ready.user.id).ok();
        self.cache_cell.get_or_init(|| Arc::clone(&ctx.cache));
        info!(name = %ready.user.name, "Discord bot connected");
        self.voice.recover_orphaned_sessions().await;
    }

    async fn guild_create(&self, _ctx: Context, guild: Guild, _is_new: Option<bool>) {
        let setup = DefaultSetupFlow {
            error_policy: discorder_core::types::ErrorPolicy::Skip,
            embedding_model_id: self.default_embedding_model_id.clone(),
        };
        let server_id = guild.id.to_string();
        match self.registry.ensure_configured(&server_id, &guild.name, &setup) {
            Ok(true) => {}
            Ok(false) => warn!(server_id, "server onboarding declined"),
            Err(e) => warn!(error = %e, server_id, "failed to onboard server"),
        }
    }

    async fn message(&self, ctx: Context, msg: Message) {
        if msg.author.bot {
            return;
        }
        if msg.guild_id.is_some() {
            if commands::parse(&self.command_prefix, &msg.content).is_some() {
                let _ = send_chunked(&ctx.http, msg.channel_id, messages::DM_ONLY).await;
                return;
            }
            self.handle_guild_message(&msg).await;
        } else {
            self.handle_dm(&ctx, &msg).await;
        }
    }

    async fn voice_state_update(&self, _ctx: Context, old: Option<VoiceState>, new: VoiceState) {
        let Some(guild_id) = new.guild_id else {
            return;
        };
        let Some(session_id) = self.voice.session_id_for_guild(&guild_id.to_string()).await else {
            return;
        };

        if new.channel_id.is_some() {
            self.voice.on_user_present(&session_id).await;
        } else if old.and_then(|o| o.channel_id).is_some() {
            self.voice.on_user_left(&session_id).await;
        }
    }
}
