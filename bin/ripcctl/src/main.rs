//! ---
//! ripc_section: "05-networking-external-interfaces"
//! ripc_subsection: "binary"
//! ripc_type: "source"
//! ripc_scope: "code"
//! ripc_description: "Control CLI for operators talking to ripc components."
//! ripc_version: "v0.1.0"
//! ripc_owner: "tbd"
//! ---
use std::path::PathBuf;

use anyhow::{bail, Result};
use clap::{Parser, Subcommand};
use ripc_common::config::AppConfig;
use ripc_common::logging::init_tracing;
use tracing::debug;

mod ops;

#[derive(Debug, Parser)]
#[command(author, version, about = "ripc request/reply control utility", long_about = None)]
struct Cli {
    #[arg(long, global = true, value_name = "FILE", help = "Path to configuration file")]
    config: Option<PathBuf>,
    #[command(subcommand)]
    command: Commands,
}

#[derive(Debug, Subcommand)]
enum Commands {
    #[command(about = "Send a command and print the matching reply")]
    Send(ops::SendArgs),
    #[command(about = "Echo every received command back to its sender")]
    Serve(ops::ServeArgs),
    #[command(about = "Discard replies left on a reply queue")]
    Drain(ops::DrainArgs),
    #[command(about = "Print the queue keys used by a component")]
    Queues(ops::QueuesArgs),
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    let mut candidates = Vec::new();
    if let Some(path) = &cli.config {
        if !path.exists() {
            bail!("configuration file {} does not exist", path.display());
        }
        candidates.push(path.clone());
    }
    candidates.push(PathBuf::from("configs/ripc.toml"));
    let loaded = AppConfig::load_with_source(&candidates)?;
    init_tracing("ripcctl", &loaded.config.logging)?;
    debug!(source = ?loaded.source, "configuration loaded");

    let config = loaded.config;
    match cli.command {
        Commands::Send(args) => ops::send(&config, args),
        Commands::Serve(args) => ops::serve(&config, args),
        Commands::Drain(args) => ops::drain(&config, args),
        Commands::Queues(args) => ops::queues(args),
    }
}
