mod cli;
mod config;
mod session;
mod wire;

use a2ui_runtime::RuntimeConfig;
use anyhow::Result;
use clap::{Parser, Subcommand};
use std::path::PathBuf;
use std::process;
use tracing_subscriber::{EnvFilter, fmt, layer::SubscriberExt, util::SubscriberInitExt};

use crate::config::{HostConfig, ServeArgs};

#[derive(Parser)]
#[command(name = "a2ui-host")]
#[command(about = "Headless A2UI protocol host", long_about = None)]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Enable verbose logging
    #[arg(short, long, global = true)]
    verbose: bool,
}

#[derive(Subcommand)]
enum Commands {
    /// Check a message file against the protocol rules
    Validate {
        /// JSON document or JSON lines
        file: PathBuf,
    },
    /// Apply a message file and print the resulting surface snapshots
    Apply {
        file: PathBuf,

        /// Only print this surface
        #[arg(long)]
        surface: Option<String>,
    },
    /// Run an interactive session over stdin/stdout
    Serve {
        #[command(flatten)]
        args: ServeArgs,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // stdout carries protocol envelopes, so logs go to stderr
    let filter = if cli.verbose {
        "a2ui_host=debug,a2ui_runtime=debug"
    } else {
        "info"
    };
    tracing_subscriber::registry()
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| filter.into()))
        .with(fmt::layer().with_writer(std::io::stderr))
        .init();

    match cli.command {
        Commands::Validate { file } => {
            if !cli::run_validate(&file)? {
                process::exit(1);
            }
        }
        Commands::Apply { file, surface } => {
            cli::run_apply(&file, surface.as_deref(), RuntimeConfig::from_env())?;
        }
        Commands::Serve { args } => {
            let config = HostConfig::from_env().with_args(&args);
            tracing::info!(surface = %config.surface_id, "starting a2ui host");
            session::serve(config, RuntimeConfig::from_env()).await?;
        }
    }

    Ok(())
}
