//! mimir: fact-check claims from the command line.

use std::io::{self, IsTerminal, Read};
use std::path::PathBuf;
use std::sync::Arc;

use clap::{Parser, Subcommand};
use futures_util::future::join_all;
use mimir::{Config, FactCheck, FactChecker, JsonFileStore, Secrets};
use serde_json::json;

/// Mimir CLI
#[derive(Parser)]
#[command(name = mimir::PKG_NAME)]
#[command(version = mimir::PKG_VERSION)]
#[command(about = "Cached, rate-limited fact checking over free-tier LLM APIs")]
struct Args {
    /// Config file (default: ~/.mimir/config.toml, then /etc/mimir/config.toml)
    #[arg(short, long, env = "MIMIR_CONFIG")]
    config: Option<PathBuf>,

    /// JSON cache snapshot to load before and save after the command
    #[arg(short, long, env = "MIMIR_SNAPSHOT")]
    snapshot: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Verify one or more claims (or one claim per line on stdin)
    Check {
        claims: Vec<String>,
    },

    /// Suggest related facts for a topic
    Research {
        /// Topic (or omit to read from stdin)
        topic: Option<String>,
    },

    /// Show cache and provider budget state
    Stats,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Initialise tracing (default: warn for CLI; override with RUST_LOG).
    tracing_subscriber::fmt()
        .with_writer(io::stderr)
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("warn")),
        )
        .init();

    let args = Args::parse();

    let config = Config::load(args.config.as_deref())?;
    let secrets = Secrets::load()?;
    let gateway = Arc::new(config.builder::<FactCheck>(&secrets)?.build()?);

    let store = args.snapshot.map(JsonFileStore::new);
    if let Some(store) = &store {
        let entries = store.load_all::<FactCheck>().await?;
        let warmed = gateway.warm(entries);
        tracing::info!(warmed, path = %store.path().display(), "loaded cache snapshot");
    }

    let checker = FactChecker::new(Arc::clone(&gateway));

    match args.command {
        Command::Check { claims } => {
            let claims = if claims.is_empty() {
                read_stdin()?
                    .map(|text| text.lines().map(str::to_string).collect())
                    .unwrap_or_default()
            } else {
                claims
            };
            let claims: Vec<String> = claims
                .into_iter()
                .filter(|c| !c.trim().is_empty())
                .collect();
            if claims.is_empty() {
                return Err("no claims given".into());
            }

            let results = join_all(claims.iter().map(|c| checker.check_claim(c))).await;
            for resolved in results {
                let line = json!({ "result": resolved.value, "origin": resolved.origin });
                println!("{line}");
            }
        }
        Command::Research { topic } => {
            let topic = match topic {
                Some(t) => t,
                None => read_stdin()?.ok_or("no topic given")?,
            };
            let leads = checker.proactive_research(&topic).await;
            println!("{}", serde_json::to_string_pretty(&leads)?);
        }
        Command::Stats => {
            println!("{}", serde_json::to_string_pretty(&gateway.stats())?);
        }
    }

    if let Some(store) = &store {
        let saved = gateway.persist(store).await?;
        tracing::info!(saved, path = %store.path().display(), "saved cache snapshot");
    }

    Ok(())
}

/// Trimmed stdin contents when input is piped, `None` on a terminal or empty input.
fn read_stdin() -> io::Result<Option<String>> {
    if io::stdin().is_terminal() {
        return Ok(None);
    }
    let mut buf = String::new();
    io::stdin().read_to_string(&mut buf)?;
    let trimmed = buf.trim();
    Ok((!trimmed.is_empty()).then(|| trimmed.to_string()))
}
