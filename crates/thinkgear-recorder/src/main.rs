//! # thinkgear-recorder
//!
//! Terminal front-end for the ThinkGear Connector: record labelled raw EEG
//! to CSV, or watch the live packet stream.

use std::path::PathBuf;

use clap::{Parser, Subcommand};
use colored::Colorize;
use tokio_util::sync::CancellationToken;
use tracing_subscriber::EnvFilter;

mod commands;
mod terminal;

use thinkgear_bridge::{BridgeConfig, BridgeError};
use thinkgear_bridge::recording::DEFAULT_RECORDING_CONFIG_FILE;

/// Record labelled MindWave EEG through the ThinkGear Connector.
#[derive(Parser)]
#[command(name = "thinkgear-recorder", version, about)]
struct Cli {
    /// Path to thinkgear.toml config file
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Connector host override
    #[arg(long)]
    host: Option<String>,

    /// Connector port override
    #[arg(long)]
    port: Option<u16>,

    /// Do not request raw EEG samples (monitor only)
    #[arg(long)]
    no_raw: bool,

    /// Enable verbose logging (set RUST_LOG for fine-grained control)
    #[arg(short, long)]
    verbose: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Run a cued recording session and write raw samples to CSV
    Record {
        /// Directory the raw-<timestamp>.csv file is written to
        #[arg(long, default_value = ".")]
        output_dir: PathBuf,

        /// Recording settings (created with defaults if missing)
        #[arg(long, default_value = DEFAULT_RECORDING_CONFIG_FILE)]
        recording_config: PathBuf,
    },
    /// Print decoded packets until Ctrl+C or the connector goes away
    Monitor {
        /// Also print every raw sample
        #[arg(long)]
        raw: bool,
    },
}

/// `RUST_LOG` wins when it parses; otherwise `-v` picks debug or warn.
fn log_filter(verbose: bool, rust_log: Option<&str>) -> EnvFilter {
    let default = if verbose {
        "thinkgear_bridge=debug,thinkgear_recorder=debug"
    } else {
        "thinkgear_bridge=warn,thinkgear_recorder=warn"
    };
    rust_log
        .and_then(|directives| EnvFilter::try_new(directives).ok())
        .unwrap_or_else(|| EnvFilter::new(default))
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();

    tracing_subscriber::fmt()
        .with_env_filter(log_filter(
            cli.verbose,
            std::env::var("RUST_LOG").ok().as_deref(),
        ))
        .init();

    let mut config = match BridgeConfig::discover(cli.config.as_deref()) {
        Ok(c) => c,
        Err(e) => {
            tracing::debug!(error = %e, "No usable config file");
            println!("{} {e}. Using defaults.", "Note:".yellow());
            BridgeConfig::default()
        }
    };
    if let Some(host) = cli.host {
        config.host = host;
    }
    if let Some(port) = cli.port {
        config.port = port;
    }
    if cli.no_raw {
        config.enable_raw_output = false;
    }

    let cancel = CancellationToken::new();
    {
        let cancel = cancel.clone();
        tokio::spawn(async move {
            if tokio::signal::ctrl_c().await.is_ok() {
                tracing::info!("Interrupt received, cancelling");
                println!("\n{}", "Stopping...".yellow());
                cancel.cancel();
            }
        });
    }

    println!("Connecting to {}...", config.addr().cyan());

    let result = match cli.command {
        Command::Record {
            output_dir,
            recording_config,
        } => commands::record(config, &output_dir, &recording_config, &cancel).await,
        Command::Monitor { raw } => commands::monitor(config, raw, &cancel).await,
    };

    match result {
        Ok(()) | Err(BridgeError::Cancelled) => Ok(()),
        Err(e) => Err(e.into()),
    }
}
