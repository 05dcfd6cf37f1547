// ABOUTME: CLI entry point for asset-change-poller
// ABOUTME: Parses commands, sets up logging and routes to handlers

use asset_change_poller::commands;
use clap::{Parser, Subcommand};

#[derive(Parser)]
#[command(name = "asset-change-poller")]
#[command(about = "Watch a media asset change feed for changes the local cache does not know about", long_about = None)]
#[command(version)]
struct Cli {
    /// Set the log level (error, warn, info, debug, trace)
    #[arg(long, global = true, default_value = "info")]
    log: String,
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Poll the change feed and print unknown asset changes
    Watch {
        #[command(flatten)]
        args: commands::watch::WatchArgs,
    },
    /// Manage the persisted change feed checkpoint
    Checkpoint(commands::checkpoint::CheckpointArgs),
}

#[tokio::main(flavor = "current_thread")]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    // Initialize logging
    // 1. RUST_LOG environment variable has highest precedence
    // 2. --log flag is used if RUST_LOG is not set
    // 3. Default to "info" if neither are provided
    let env_filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(cli.log.clone()));

    tracing_subscriber::fmt()
        .with_env_filter(env_filter)
        .with_writer(std::io::stderr)
        .init();

    match cli.command {
        Commands::Watch { args } => commands::watch(args).await,
        Commands::Checkpoint(args) => commands::checkpoint::command(args).await,
    }
}
