use std::path::PathBuf;

use anyhow::Result;
use clap::{Parser, Subcommand};

mod commands;
mod config;
mod state;

#[derive(Parser)]
#[command(name = "pulse", about = "Health insight loop and experiment evaluation")]
#[command(version, propagate_version = true)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Engine configuration file (default: user config dir)
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    /// Verbose output
    #[arg(short, long, global = true)]
    verbose: bool,
}

#[derive(Subcommand)]
enum Commands {
    /// Manage engine configuration
    Config(commands::config::ConfigArgs),
    /// Evaluate an intervention experiment
    Evaluate(commands::evaluate::EvaluateArgs),
    /// Run the daily insight loop
    Loop(commands::run_loop::LoopArgs),
    /// Inspect causal memories
    Memory(commands::memory::MemoryArgs),
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let filter = if cli.verbose { "debug" } else { "info" };
    tracing_subscriber::fmt().with_env_filter(filter).init();

    let config_path = cli.config.as_deref();
    match cli.command {
        Commands::Config(args) => commands::config::run(args, config_path),
        Commands::Evaluate(args) => commands::evaluate::run(args, config_path).await,
        Commands::Loop(args) => commands::run_loop::run(args, config_path).await,
        Commands::Memory(args) => commands::memory::run(args).await,
    }
}
