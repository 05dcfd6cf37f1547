// ABOUTME: checkpoint command - inspect or move the persisted change feed position
// ABOUTME: Show, set or reset the checkpoint the next watch resumes from

use anyhow::{Context, Result};
use clap::{Args, Subcommand};
use std::path::PathBuf;

use crate::changes::{Checkpoint, CheckpointState};
use crate::config::validate_endpoint;

#[derive(Args)]
pub struct CheckpointArgs {
    /// Checkpoint state file (defaults to ~/.asset-change-poller/checkpoint.json)
    #[arg(long = "state", global = true)]
    state_path: Option<PathBuf>,
    #[command(subcommand)]
    command: CheckpointCommands,
}

#[derive(Subcommand)]
enum CheckpointCommands {
    /// Show the stored checkpoint
    Show,
    /// Store a checkpoint to resume from
    Set {
        /// Change feed position (lastModified value)
        value: u64,
        /// GraphQL endpoint the checkpoint belongs to
        #[arg(long, env = "ASSET_FEED_ENDPOINT")]
        endpoint: String,
    },
    /// Forget the stored checkpoint so the next watch starts from the baseline
    Reset,
}

pub async fn command(args: CheckpointArgs) -> Result<()> {
    let path = args
        .state_path
        .unwrap_or_else(CheckpointState::default_path);

    match args.command {
        CheckpointCommands::Show => {
            if !path.exists() {
                println!("Checkpoint is not set.");
                return Ok(());
            }
            let state = CheckpointState::load(&path)
                .await
                .context("Failed to load checkpoint state")?;
            if state.checkpoint.is_set() {
                println!(
                    "Current checkpoint: {} (endpoint: {}, updated {})",
                    state.checkpoint,
                    state.endpoint,
                    state.updated_at.to_rfc3339()
                );
            } else {
                println!("Checkpoint is not set.");
            }
        }
        CheckpointCommands::Set { value, endpoint } => {
            validate_endpoint(&endpoint)?;
            let mut state = CheckpointState::new(&endpoint);
            state.update(Checkpoint::at(value));
            state
                .save(&path)
                .await
                .context("Failed to save checkpoint state")?;
            println!("Checkpoint set to: {}", value);
        }
        CheckpointCommands::Reset => {
            if path.exists() {
                let mut state = CheckpointState::load(&path)
                    .await
                    .context("Failed to load checkpoint state")?;
                state.update(Checkpoint::UNSET);
                state
                    .save(&path)
                    .await
                    .context("Failed to save checkpoint state")?;
            }
            println!("Checkpoint reset.");
        }
    }
    Ok(())
}
