use std::path::PathBuf;
use std::sync::{Arc, OnceLock};
use std::time::Duration;

use clap::Parser;
use rusqlite::Connection;
use serenity::http::Http;
use songbird::Songbird;
use tokio::sync::watch;
use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;

use discorder_agent::AgentRunner;
use discorder_cleanup::CleanupCoordinator;
use discorder_core::AppConfig;
use discorder_discord::{DiscordAdapter, DiscordHandler, DiscordStatusSink, DiscordVoiceChannelProvisioner};
use discorder_extract::{ImageCaptioner, LinkExtractor};
use discorder_gateway::ollama::OllamaProvider;
use discorder_gateway::openai::OpenAiProvider;
use discorder_gateway::{EmbeddingProvider, LlmProvider, ModelGateway, SttProvider, VisionProvider};
use discorder_pipeline::MessagePipeline;
use discorder_queue::{ChatResponder, QueueWorker, RequestQueue, StatusSink, VoiceSessionStarter};
use discorder_registry::ConfigRegistry;
use discorder_store::ConversationStore;
use discorder_vector::VectorStore;
use discorder_voice::{EnergyVad, Vad, VadFactory, VoiceManager};

/// Discord bot that indexes server conversations and answers questions about
/// them, with an optional voice-channel mode that transcribes and responds
/// to speech.
#[derive(Parser, Debug)]
#[command(name = "discorder")]
struct Cli {
    /// Path to the TOML config file.
    #[arg(long, default_value = "config.toml")]
    config: PathBuf,

    /// Overrides `database.path` from the config file.
    #[arg(long)]
    db_path: Option<String>,

    /// Increase log verbosity; repeatable (-v, -vv, -vvv).
    #[arg(short, long, action = clap::ArgAction::Count)]
    verbose: u8,
}

fn init_tracing(verbose: u8) {
    let default_level = match verbose {
        0 => "info",
        1 => "debug",
        _ => "trace",
    };
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| format!("discorder={default_level}").into()),
        )
        .init();
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    init_tracing(cli.verbose);

    if !cli.config.exists() {
        warn!(path = %cli.config.display(), "config file not found, relying on environment overlay and defaults");
    }
    let mut config = AppConfig::load(&cli.config)?;
    if let Some(db_path) = cli.db_path {
        config.database.path = db_path;
    }

    let registry = Arc::new(ConfigRegistry::new(Connection::open(&config.database.path)?)?);
    registry.load_all()?;
    let store = Arc::new(ConversationStore::new(Connection::open(&config.database.path)?)?);
    let vector_store = Arc::new(VectorStore::new(
        &config.vector_store.endpoint,
        &config.vector_store.collection_prefix,
    )?);

    let gateway = Arc::new(build_gateway(&config));
    gateway.prewarm(&config.llm.model_name, &config.llm.vision_model_name).await;

    let link_extractor = Arc::new(LinkExtractor::new(Arc::clone(&gateway), config.llm.model_name.clone()));
    let image_captioner = Arc::new(ImageCaptioner::new(Arc::clone(&gateway), config.llm.vision_model_name.clone()));
    let pipeline = Arc::new(MessagePipeline::new(
        Arc::clone(&registry),
        Arc::clone(&vector_store),
        Arc::clone(&gateway),
        link_extractor,
        image_captioner,
        config.vector_store.vector_dim,
    ));

    let queue = Arc::new(RequestQueue::new(config.queue.capacity));
    let agent: Arc<dyn ChatResponder> = Arc::new(AgentRunner::new(
        Arc::clone(&gateway),
        Arc::clone(&vector_store),
        Arc::clone(&registry),
        config.llm.model_name.clone(),
    ));

    let http = Arc::new(Http::new(&config.discord.bot_token));
    let cache_cell: discorder_discord::CacheCell = Arc::new(OnceLock::new());
    let songbird = Songbird::serenity();

    let voice_provisioner = Arc::new(DiscordVoiceChannelProvisioner::new(
        Arc::clone(&http),
        Arc::clone(&cache_cell),
        Arc::clone(&songbird),
    ));
    let voice = VoiceManager::with_config(
        Arc::clone(&store),
        Arc::clone(&gateway),
        voice_provisioner,
        Arc::clone(&queue),
        Duration::from_secs(config.voice.alone_timeout_secs),
        config.voice.silence_duration_ms,
        build_vad_factory(&config),
    );

    let status_sink: Arc<dyn StatusSink> = Arc::new(DiscordStatusSink::new(Arc::clone(&http)));
    let voice_starter: Arc<dyn VoiceSessionStarter> = Arc::clone(&voice) as Arc<dyn VoiceSessionStarter>;

    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    let worker = QueueWorker::new(
        Arc::clone(&queue),
        Arc::clone(&store),
        agent,
        voice_starter,
        status_sink,
    )
    .with_chat_timeout(Duration::from_secs(config.queue.worker_timeout_secs));
    let worker = Arc::new(worker);
    let worker_handle = {
        let worker = Arc::clone(&worker);
        tokio::spawn(async move { worker.run(shutdown_rx).await })
    };

    let command_prefix = config.discord.command_prefix.clone();
    let default_embedding_model_id = config.llm.embedding_model_id.clone();
    let handler_factory = {
        let registry = Arc::clone(&registry);
        let pipeline = Arc::clone(&pipeline);
        let queue = Arc::clone(&queue);
        let store = Arc::clone(&store);
        let vector_store = Arc::clone(&vector_store);
        let voice = Arc::clone(&voice);
        let cache_cell = Arc::clone(&cache_cell);
        move || DiscordHandler {
            registry: Arc::clone(&registry),
            pipeline: Arc::clone(&pipeline),
            queue: Arc::clone(&queue),
            store: Arc::clone(&store),
            vector_store: Arc::clone(&vector_store),
            voice: Arc::clone(&voice),
            command_prefix: command_prefix.clone(),
            default_embedding_model_id: default_embedding_model_id.clone(),
            cache_cell: Arc::clone(&cache_cell),
            bot_id: OnceLock::new(),
        }
    };

    let adapter = DiscordAdapter::new(config.discord.bot_token.clone(), Arc::clone(&songbird), handler_factory);

    info!("discorder starting");
    tokio::select! {
        _ = adapter.run() => {
            warn!("Discord adapter exited unexpectedly");
        }
        _ = tokio::signal::ctrl_c() => {
            info!("shutdown signal received");
        }
    }

    let coordinator = CleanupCoordinator::new(
        shutdown_tx,
        voice,
        gateway,
        config.llm.model_name.clone(),
        config.llm.embedding_model_id.clone(),
    );
    let report = coordinator.run(worker_handle, Duration::from_secs(10)).await;
    info!("{report}");
    if !report.all_ok() {
        std::process::exit(1);
    }
    Ok(())
}

/// Builds Silero VAD sessions from `voice.vad_model_path` when set, falling
/// back to the energy-based heuristic otherwise or if the model fails to
/// load for a given session.
fn build_vad_factory(config: &AppConfig) -> VadFactory {
    match config.voice.vad_model_path.clone() {
        Some(model_path) => Arc::new(move || match discorder_voice::vad::SileroVad::new(&model_path) {
            Ok(vad) => Arc::new(vad) as Arc<dyn Vad>,
            Err(e) => {
                warn!(error = %e, model_path, "failed to load Silero VAD model, falling back to energy VAD");
                Arc::new(EnergyVad::default()) as Arc<dyn Vad>
            }
        }),
        None => Arc::new(|| Arc::new(EnergyVad::default()) as Arc<dyn Vad>),
    }
}

fn build_gateway(config: &AppConfig) -> ModelGateway {
    let stt: Option<Arc<dyn SttProvider>> = if config.voice.stt_enabled {
        let model_path = format!("models/ggml-{}.bin", config.voice.whisper_model_size);
        match discorder_gateway::stt::WhisperSttProvider::new(&model_path) {
            Ok(provider) => Some(Arc::new(provider)),
            Err(e) => {
                error!(error = %e, model_path, "failed to load whisper model, voice transcription disabled");
                None
            }
        }
    } else {
        None
    };

    match config.llm.provider_kind.as_str() {
        "openai" => {
            let provider = Arc::new(OpenAiProvider::new(
                config.llm.api_key.clone().unwrap_or_default(),
                config.llm.base_url.clone(),
            ));
            let chat: Arc<dyn LlmProvider> = Arc::clone(&provider);
            let vision: Arc<dyn VisionProvider> = Arc::clone(&provider);
            let embedding: Arc<dyn EmbeddingProvider> = provider;
            ModelGateway::new(chat, vision, embedding, stt)
        }
        other => {
            if other != "ollama" {
                warn!(provider_kind = other, "unrecognized provider_kind, defaulting to ollama");
            }
            let provider = Arc::new(OllamaProvider::new(config.llm.base_url.clone()));
            let chat: Arc<dyn LlmProvider> = Arc::clone(&provider);
            let vision: Arc<dyn VisionProvider> = Arc::clone(&provider);
            let embedding: Arc<dyn EmbeddingProvider> = provider;
            ModelGateway::new(chat, vision, embedding, stt)
        }
    }
}
