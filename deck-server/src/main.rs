//! deck-server - Serve the Postdeck publish API over HTTP

use anyhow::{Context, Result};
use clap::Parser;
use deck_server::{build_app, AppState};
use libpostdeck::logging::{LogFormat, LoggingConfig};
use libpostdeck::{Config, PostdeckService};
use std::path::PathBuf;
use tracing::{info, warn};

#[derive(Parser, Debug)]
#[command(name = "deck-server")]
#[command(version)]
#[command(about = "Serve the Postdeck publish API over HTTP")]
#[command(long_about = "\
deck-server - Serve the Postdeck publish API over HTTP

ENDPOINTS:
    POST /posts/{id}/publish          Publish a post to its selected accounts
    GET  /accounts/{id}/youtube/stats Cached YouTube channel statistics
    GET  /health                      Liveness and database check

    Requests are attributed to the user named in the x-user-id header.

SIGNALS:
    SIGTERM, SIGINT - Graceful shutdown (in-flight requests complete)

CONFIGURATION:
    Configuration file: ~/.config/postdeck/config.toml (or POSTDECK_CONFIG)

    [server]
    bind = \"127.0.0.1:8080\"

EXIT CODES:
    0 - Clean shutdown
    1 - Runtime or configuration error
")]
struct Cli {
    /// Configuration file (defaults to POSTDECK_CONFIG or the XDG location)
    #[arg(short, long, value_name = "PATH")]
    config: Option<PathBuf>,

    /// Listen address (overrides config)
    #[arg(short, long, value_name = "ADDR")]
    bind: Option<String>,

    /// Log format on stderr: text, json or pretty
    #[arg(long, value_name = "FORMAT")]
    log_format: Option<LogFormat>,

    /// Enable verbose logging
    #[arg(short, long)]
    verbose: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    LoggingConfig::from_env()
        .with_format(cli.log_format)
        .verbose(cli.verbose)
        .init();

    let config = match &cli.config {
        Some(path) => Config::load_from_path(path)
            .with_context(|| format!("Failed to load configuration from {}", path.display()))?,
        None => Config::load().context("Failed to load configuration")?,
    };
    let bind = cli.bind.clone().unwrap_or_else(|| config.server.bind.clone());

    let service = PostdeckService::from_config(config)
        .await
        .context("Failed to initialize service")?;
    let app = build_app(AppState::new(service));

    let listener = tokio::net::TcpListener::bind(&bind)
        .await
        .with_context(|| format!("Failed to bind to {}", bind))?;

    info!("deck-server listening on http://{}", bind);

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("Server failed")?;

    info!("deck-server stopped");
    Ok(())
}

/// Resolve once SIGINT or SIGTERM arrives
#[cfg(unix)]
async fn shutdown_signal() {
    use futures::stream::StreamExt;
    use signal_hook::consts::{SIGINT, SIGTERM};
    use signal_hook_tokio::Signals;

    let mut signals = match Signals::new([SIGINT, SIGTERM]) {
        Ok(signals) => signals,
        Err(e) => {
            warn!("Failed to register signal handlers, falling back to Ctrl-C: {}", e);
            ctrl_c().await;
            return;
        }
    };

    if let Some(signal) = signals.next().await {
        info!("Received signal {}, shutting down gracefully...", signal);
    }
}

#[cfg(not(unix))]
async fn shutdown_signal() {
    ctrl_c().await;
    info!("Received Ctrl-C, shutting down gracefully...");
}

async fn ctrl_c() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        warn!("Failed to listen for Ctrl-C: {}", e);
        std::future::pending::<()>().await;
    }
}
