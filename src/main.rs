mod api;
mod gateway;

use clap::{Parser, Subcommand};
use std::sync::Arc;
use tally_channels::{evolution::EvolutionClient, media::MediaDecryptor, whisper::WhisperTranscriber};
use tally_core::{
    config::{self, install_bundled_prompts, Config, Prompts},
    context::Context,
    intent::FinancialIntent,
    shellexpand,
};
use tally_ledger::Store;
use tally_providers::{build_provider, http_client};
use tracing::{info, warn};
use tracing_subscriber::{prelude::*, EnvFilter};

#[derive(Parser)]
#[command(
    name = "tally",
    version,
    about = "Tally: WhatsApp bookkeeping assistant"
)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Path to config file.
    #[arg(short, long, default_value = "config.toml", env = "TALLY_CONFIG")]
    config: String,
}

#[derive(Subcommand)]
enum Commands {
    /// Start the webhook server.
    Start,
    /// Check configuration, provider availability and ledger counts.
    Status,
    /// Classify a message without touching the ledger.
    Classify {
        /// The message text.
        #[arg(trailing_var_arg = true)]
        text: Vec<String>,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    let cfg = config::load(&cli.config)?;
    let _log_guard = init_tracing(&cfg);

    match cli.command {
        Commands::Start => start(cfg).await?,
        Commands::Status => status(&cli.config, &cfg).await?,
        Commands::Classify { text } => {
            if text.is_empty() {
                anyhow::bail!("no text provided. Usage: tally classify <text>");
            }
            let intent = classify(&cfg, &text.join(" ")).await?;
            println!("{}", serde_json::to_string_pretty(&intent)?);
        }
    }

    Ok(())
}

/// Stdout plus a daily rolling file under `{data_dir}/logs`.
///
/// `RUST_LOG` wins over `tally.log_level`. The returned guard flushes the
/// file writer on drop.
fn init_tracing(cfg: &Config) -> Option<tracing_appender::non_blocking::WorkerGuard> {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(&cfg.tally.log_level));

    let log_dir = std::path::Path::new(&shellexpand(&cfg.tally.data_dir)).join("logs");
    let (file_layer, guard) = match std::fs::create_dir_all(&log_dir) {
        Ok(()) => {
            let appender = tracing_appender::rolling::daily(&log_dir, "tally.log");
            let (writer, guard) = tracing_appender::non_blocking(appender);
            (
                Some(
                    tracing_subscriber::fmt::layer()
                        .with_writer(writer)
                        .with_ansi(false),
                ),
                Some(guard),
            )
        }
        Err(e) => {
            eprintln!("cannot create log dir {}: {e}", log_dir.display());
            (None, None)
        }
    };

    tracing_subscriber::registry()
        .with(filter)
        .with(tracing_subscriber::fmt::layer())
        .with(file_layer)
        .init();

    guard
}

/// Wire every collaborator and serve the webhook until interrupted.
async fn start(cfg: Config) -> anyhow::Result<()> {
    install_bundled_prompts(&cfg.tally.data_dir);
    let prompts = Prompts::load(&cfg.tally.data_dir);

    let store = Store::new(&cfg.ledger).await?;
    let repos = gateway::Repositories::from_store(store);

    let timeout = cfg.http.timeout();
    let client = http_client(timeout)?;
    let classifier = build_provider(&cfg.provider.default, &cfg.provider, client.clone())?;
    let vision = if cfg.vision.provider == cfg.provider.default {
        classifier.clone()
    } else {
        build_provider(&cfg.vision.provider, &cfg.provider, client)?
    };
    if !vision.supports_vision() {
        warn!("vision: provider {} cannot read images", vision.name());
    }

    let evolution = Arc::new(EvolutionClient::new(&cfg.gateway, timeout)?);
    if !evolution.is_configured() {
        warn!("gateway: instance or api key missing, replies and media conversion will fail");
    }

    let transcriber = WhisperTranscriber::new(&cfg.transcription, &whisper_key(&cfg), timeout)?;
    let media = MediaDecryptor::standard(evolution.clone(), timeout, cfg.media.verify_mac)?;
    info!(
        "media: strategies {:?}, mac check {}",
        media.strategy_names(),
        if cfg.media.verify_mac { "on" } else { "off" }
    );

    let services = gateway::Services {
        classifier,
        vision,
        transcriber: Arc::new(transcriber),
        media: Arc::new(media),
        replies: evolution,
    };
    let gw = gateway::Gateway::new(
        repos,
        services,
        prompts,
        gateway::GatewaySettings::from_config(&cfg),
    );

    info!(
        "{} starting (classifier: {}, vision: {})",
        cfg.tally.name, cfg.provider.default, cfg.vision.provider
    );
    let state = api::ApiState::new(Arc::new(gw), &cfg.server.webhook_token);
    api::serve(&cfg.server, state).await
}

/// Whisper key, falling back to the OpenAI provider key.
fn whisper_key(cfg: &Config) -> String {
    if !cfg.transcription.api_key.is_empty() {
        return cfg.transcription.api_key.clone();
    }
    cfg.provider
        .openai
        .as_ref()
        .map(|o| o.api_key.clone())
        .unwrap_or_default()
}

async fn status(path: &str, cfg: &Config) -> anyhow::Result<()> {
    println!("Tally status\n");
    println!("Config: {path}");
    println!("Server: {}:{}", cfg.server.host, cfg.server.port);
    println!(
        "Webhook token: {}",
        if cfg.server.webhook_token.is_empty() { "not set" } else { "set" }
    );
    println!();

    let client = http_client(cfg.http.timeout())?;
    let mut names = vec![cfg.provider.default.as_str()];
    if cfg.vision.provider != cfg.provider.default {
        names.push(cfg.vision.provider.as_str());
    }
    for name in names {
        let state = match build_provider(name, &cfg.provider, client.clone()) {
            Ok(p) if p.is_available().await => "available".to_string(),
            Ok(_) => "not available".to_string(),
            Err(e) => e.to_string(),
        };
        println!("  {name}: {state}");
    }
    println!(
        "  whisper: {}",
        if whisper_key(cfg).is_empty() { "missing api key" } else { "configured" }
    );
    println!(
        "  gateway: {}",
        if cfg.gateway.instance.is_empty() || cfg.gateway.api_key.is_empty() {
            "missing instance or api key"
        } else {
            "configured"
        }
    );
    println!();

    let stats = Store::new(&cfg.ledger).await?.stats().await?;
    println!("Ledger: {}", shellexpand(&cfg.ledger.db_path));
    println!("  messages: {} ({} failed)", stats.messages, stats.failed_messages);
    println!("  transactions: {}", stats.transactions);
    println!("  verified links: {}", stats.verified_links);
    Ok(())
}

/// Classify `text` the same way the webhook would.
async fn classify(cfg: &Config, text: &str) -> anyhow::Result<FinancialIntent> {
    if let Some(kind) = gateway::fast_path(text) {
        return Ok(FinancialIntent::query(kind));
    }
    let prompts = Prompts::load(&cfg.tally.data_dir);
    let client = http_client(cfg.http.timeout())?;
    let provider = build_provider(&cfg.provider.default, &cfg.provider, client)?;
    let completion = provider
        .complete(&Context::new(&prompts.classifier, text))
        .await?;
    Ok(gateway::parse_intent(&completion.text)?)
}
