//! deck-publish - Publish a stored post to its selected social accounts

use anyhow::{Context, Result};
use clap::Parser;
use libpostdeck::logging::{LogFormat, LoggingConfig};
use libpostdeck::{Config, PostdeckError, PostdeckService, PublishOutcome};
use serde_json::json;
use std::path::PathBuf;
use tracing::debug;

const EXIT_FAILED: i32 = 1;
const EXIT_RECONNECT: i32 = 2;

#[derive(Parser, Debug)]
#[command(name = "deck-publish")]
#[command(version, about = "Publish a stored post to its selected social accounts")]
#[command(long_about = r#"Publish a stored post to every active social account selected for it.

Accounts are attempted one after another. A failure on one account is
reported and the remaining accounts are still attempted.

EXAMPLES:
    # Publish a post as user-1
    deck-publish 6f1c0d2e-... --user user-1

    # Machine-readable output
    deck-publish 6f1c0d2e-... --user user-1 --format json | jq '.data.publishResults'

    # User from the environment
    POSTDECK_USER=user-1 deck-publish 6f1c0d2e-...

OUTPUT:
    text - one line per account on stdout: status, platform, account, post id or error
    json - {"success": bool, "data": {...}} envelope, same as the HTTP API

EXIT CODES:
    0 - Published to at least one account
    1 - Published nowhere, or a runtime/configuration error
    2 - Published nowhere and at least one account needs reconnection
    3 - Invalid input, unknown post, or post not publishable
"#)]
struct Cli {
    /// Id of the post to publish
    post_id: String,

    /// Owner of the post
    #[arg(short, long, env = "POSTDECK_USER", value_name = "USER_ID")]
    user: String,

    /// Output format
    #[arg(short, long, default_value = "text", value_name = "FORMAT")]
    #[arg(value_parser = ["text", "json"])]
    format: String,

    /// Configuration file (defaults to POSTDECK_CONFIG or the XDG location)
    #[arg(short, long, value_name = "PATH")]
    config: Option<PathBuf>,

    /// Log format on stderr: text, json or pretty
    #[arg(long, value_name = "FORMAT")]
    log_format: Option<LogFormat>,

    /// Enable verbose logging
    #[arg(short, long)]
    verbose: bool,
}

impl Cli {
    fn json(&self) -> bool {
        self.format == "json"
    }
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();

    LoggingConfig::from_env()
        .with_format(cli.log_format)
        .verbose(cli.verbose)
        .init();

    debug!("deck-publish started with args: {:?}", cli);

    let code = match run(&cli).await {
        Ok(code) => code,
        Err(e) => {
            if cli.json() {
                println!("{}", json!({ "success": false, "error": format!("{:#}", e) }));
            } else {
                eprintln!("Error: {:#}", e);
            }
            exit_code_for(&e)
        }
    };

    std::process::exit(code);
}

async fn run(cli: &Cli) -> Result<i32> {
    let config = match &cli.config {
        Some(path) => Config::load_from_path(path)
            .with_context(|| format!("Failed to load configuration from {}", path.display()))?,
        None => Config::load().context("Failed to load configuration")?,
    };

    let service = PostdeckService::from_config(config).await?;
    let outcome = service.publishing().publish(&cli.user, &cli.post_id).await?;

    if cli.json() {
        print_json(&outcome)?;
    } else {
        print_text(&outcome);
    }

    Ok(outcome_exit_code(&outcome))
}

fn print_json(outcome: &PublishOutcome) -> Result<()> {
    println!("{}", serde_json::to_string_pretty(&outcome.envelope())?);
    Ok(())
}

fn print_text(outcome: &PublishOutcome) {
    for result in &outcome.results {
        match (&result.platform_post_id, &result.error) {
            (Some(id), _) if result.success => {
                println!("ok\t{}\t{}\t{}", result.platform, result.account_name, id)
            }
            (_, error) => println!(
                "failed\t{}\t{}\t{}",
                result.platform,
                result.account_name,
                error.as_deref().unwrap_or("Unknown error")
            ),
        }
    }

    eprintln!("{}", outcome.summary.message);
    if outcome.summary.needs_reconnection {
        eprintln!(
            "Reconnect required: {}",
            outcome.summary.reconnection_platforms.join(", ")
        );
    }
}

fn outcome_exit_code(outcome: &PublishOutcome) -> i32 {
    if outcome.summary.any_succeeded() {
        0
    } else if outcome.summary.needs_reconnection {
        EXIT_RECONNECT
    } else {
        EXIT_FAILED
    }
}

fn exit_code_for(error: &anyhow::Error) -> i32 {
    error
        .downcast_ref::<PostdeckError>()
        .map(PostdeckError::exit_code)
        .unwrap_or(EXIT_FAILED)
}
