//! Chainflow CLI.
//!
//! # Commands
//! ```text
//! chainflow info
//! chainflow check  --config <chainflow.yaml>
//! chainflow replay --config <chainflow.yaml> --cache <fixture.json>
//! ```

use anyhow::Result;
use clap::{Parser, Subcommand};
use std::path::PathBuf;

mod app_config;
mod cmd_check;
mod cmd_replay;

#[derive(Parser)]
#[command(
    name = "chainflow",
    about = "Cache-driven, replayable blockchain indexing engine",
    version
)]
struct Cli {
    /// Enable debug logging
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Show build and default settings
    Info,

    /// Load and validate a config file, then list its sources
    Check {
        /// Path to the YAML or JSON config
        #[arg(short, long)]
        config: PathBuf,
    },

    /// Run every cached event in a fixture through a recording handler
    Replay {
        /// Path to the YAML or JSON config
        #[arg(short, long)]
        config: PathBuf,
        /// Path to a JSON cache fixture
        #[arg(long)]
        cache: PathBuf,
        /// Print every recorded event as JSON
        #[arg(long)]
        json: bool,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    match cli.command {
        Commands::Info => {
            cmd_info();
            Ok(())
        }
        Commands::Check { config } => cmd_check::run(&config, cli.verbose),
        Commands::Replay { config, cache, json } => cmd_replay::run(&config, &cache, json, cli.verbose).await,
    }
}

fn cmd_info() {
    let engine = chainflow_core::config::EngineConfig::default();
    println!("Chainflow v{}", env!("CARGO_PKG_VERSION"));
    println!(
        "  Decode workers: {} (one per CPU core)",
        chainflow_evm::pool::default_size()
    );
    println!("  Progress channel capacity: {}", engine.progress_capacity);
    println!("  Source kinds: block, log, callTrace");
    println!("  Cache backends: memory (JSON fixtures)");
    println!("  Chains: EVM (Ethereum, Arbitrum, Base, Polygon, Optimism, ...)");
}
