use std::sync::Arc;
use std::time::Duration;

use serenity::model::gateway::GatewayIntents;
use serenity::Client;
use songbird::{Songbird, SerenityInit};
use tracing::{error, info, warn};

use crate::handler::DiscordHandler;

/// Wraps a serenity `Client` and drives the gateway event loop until the
/// process exits, reconnecting whenever the connection drops. The songbird
/// manager is constructed by the caller and registered into every rebuilt
/// client, so the same `Arc<Songbird>` handed to the voice channel
/// provisioner always matches the client currently running.
pub struct DiscordAdapter {
    bot_token: String,
    songbird: Arc<Songbird>,
    handler_factory: Box<dyn Fn() -> DiscordHandler + Send + Sync>,
}

impl DiscordAdapter {
    pub fn new(
        bot_token: String,
        songbird: Arc<Songbird>,
        handler_factory: impl Fn() -> DiscordHandler + Send + Sync + 'static,
    ) -> Self {
        Self {
            bot_token,
            songbird,
            handler_factory: Box::new(handler_factory),
        }
    }

    /// Connect to Discord and keep reconnecting whenever the gateway drops.
    /// Never returns under normal operation — runs for the lifetime of the
    /// process.
    pub async fn run(self) {
        let intents = GatewayIntents::GUILDS
            | GatewayIntents::GUILD_MESSAGES
            | GatewayIntents::DIRECT_MESSAGES
            | GatewayIntents::MESSAGE_CONTENT
            | GatewayIntents::GUILD_VOICE_STATES;

        let mut client = loop {
            match self.build_client(intents).await {
                Ok(c) => break c,
                Err(e) => {
                    error!("Discord: initial connect failed ({e}), retrying in 30s");
                    tokio::time::sleep(Duration::from_secs(30)).await;
                }
            }
        };

        loop {
            info!("Discord: gateway connecting");
            if let Err(e) = client.start().await {
                warn!("Discord: gateway error ({e}), reconnecting in 5s");
            } else {
                info!("Discord: gateway stopped cleanly, reconnecting in 5s");
            }
            tokio::time::sleep(Duration::from_secs(5)).await;

            client = loop {
                match self.build_client(intents).await {
                    Ok(c) => break c,
                    Err(e) => {
                        error!("Discord: reconnect failed ({e}), retrying in 30s");
                        tokio::time::sleep(Duration::from_secs(30)).await;
                    }
                }
            };
        }
    }

    async fn build_client(&self, intents: GatewayIntents) -> Result<Client, serenity::Error> {
        let handler = (self.handler_factory)();
        Client::builder(&self.bot_token, intents)
            .event_handler(handler)
            .register_songbird_with(Arc::clone(&self.songbird))
            .await
    }
}
