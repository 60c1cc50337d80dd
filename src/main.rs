use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use csv_playback::config::{PlaybackConfig, RawConfig};
use csv_playback::driver;
use csv_playback::sink::{IngestSink, JsonLinesSink};
use std::path::PathBuf;
use std::sync::Arc;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

/// Replay CSV sensor logs as timestamped JSON readings
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Play back files as described by a JSON configuration
    Run {
        /// Configuration file path
        #[arg(short, long)]
        config: PathBuf,
    },
    /// Print the default configuration
    DefaultConfig,
}

fn main() -> Result<()> {
    // stdout carries the readings
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .with_writer(std::io::stderr)
        .init();

    match Cli::parse().command {
        Command::DefaultConfig => {
            let json = serde_json::to_string_pretty(&RawConfig::default())?;
            println!("{}", json);
            Ok(())
        }
        Command::Run { config } => {
            let config = PlaybackConfig::load(&config)
                .with_context(|| format!("failed to load configuration {}", config.display()))?;
            let rt = tokio::runtime::Runtime::new().context("failed to create tokio runtime")?;
            rt.block_on(run(config))
        }
    }
}

async fn run(config: PlaybackConfig) -> Result<()> {
    let sink: Arc<dyn IngestSink> = Arc::new(JsonLinesSink::stdout());
    let shutdown = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            warn!(error = %e, "cannot listen for ctrl-c");
            std::future::pending::<()>().await;
        }
    };

    info!(asset = %config.asset_name, "starting playback");
    #[cfg(feature = "poll-mode")]
    let result = driver::run_poll(config, sink, shutdown).await;
    #[cfg(not(feature = "poll-mode"))]
    let result = driver::run_push(config, sink, shutdown).await;

    result.context("playback failed")
}
