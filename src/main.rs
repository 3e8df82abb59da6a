//! Chatroom Server
//!
//! Run with: cargo run -- [--config <path>] [--host <host>] [--port <port>]
//!
//! # Configuration
//!
//! Settings are read from the config file (or the default locations), then
//! `CHATROOM_*` environment variables, then command-line flags.
//! `RUST_LOG` takes precedence over the configured log level.

use anyhow::Context;
use chatroom::api::{serve, AppState};
use chatroom::config::{generate_default_config, Config, LogFormat, LoggingConfig};
use chatroom::hub::ChatHub;
use clap::Parser;
use std::path::PathBuf;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

/// Real-time chat room server
#[derive(Debug, Parser)]
#[command(name = "chatroom", version, about)]
struct Args {
    /// Path to a TOML config file
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Host to bind to
    #[arg(long)]
    host: Option<String>,

    /// Port to listen on
    #[arg(short, long)]
    port: Option<u16>,

    /// Directory holding the client application
    #[arg(long)]
    static_dir: Option<String>,

    /// Print the default configuration and exit
    #[arg(long)]
    print_config: bool,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();

    if args.print_config {
        print!("{}", generate_default_config());
        return Ok(());
    }

    let mut config = match &args.config {
        Some(path) => Config::load_with_env(path)
            .with_context(|| format!("loading config from {}", path.display()))?,
        None => Config::load_default(),
    };

    if let Some(host) = args.host {
        config.server.host = host;
    }
    if let Some(port) = args.port {
        config.server.port = port;
    }
    if let Some(dir) = args.static_dir {
        config.server.static_dir = dir;
    }

    init_tracing(&config.logging);

    tracing::info!("Starting chatroom v{}", env!("CARGO_PKG_VERSION"));
    tracing::info!("Serving client files from {:?}", config.server.static_dir);

    let (hub, broadcaster) = ChatHub::spawn(config.hub.clone());
    let state = AppState::new(hub, config.server.clone());

    serve(state).await.context("chat server failed")?;

    // Sessions still holding the hub keep the broadcaster alive; don't wait on them.
    broadcaster.abort();
    tracing::info!("Chatroom stopped");

    Ok(())
}

fn init_tracing(logging: &LoggingConfig) {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(format!("chatroom={},tower_http=info", logging.level)));

    let registry = tracing_subscriber::registry().with(filter);
    match logging.format {
        LogFormat::Json => registry.with(tracing_subscriber::fmt::layer().json()).init(),
        LogFormat::Pretty => registry.with(tracing_subscriber::fmt::layer()).init(),
    }
}
