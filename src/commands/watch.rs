// ABOUTME: watch command - runs the change poller against a media API endpoint
// ABOUTME: Prints newly published changes and keeps a local fingerprint cache current

use anyhow::{Context, Result};
use clap::Args;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use crate::changes::{
    ChangePoller, ChangeRecord, ChangeType, CheckpointState, CycleOutcome, FingerprintCache,
    PollerState,
};
use crate::config::{
    validate_endpoint, validate_interval_ms, FeedConfig, FileConfig, PollerConfig,
    DEFAULT_POLL_INTERVAL, DEFAULT_REQUEST_TIMEOUT, MAX_POLL_INTERVAL_MS, MIN_POLL_INTERVAL_MS,
};
use crate::remote::GraphQlChangeFeed;

#[derive(Args, Clone, Debug, Default)]
pub struct WatchArgs {
    /// GraphQL endpoint of the media API
    #[arg(long, env = "ASSET_FEED_ENDPOINT")]
    pub endpoint: Option<String>,
    /// API key sent as x-api-key (falls back to ASSET_FEED_API_KEY env)
    #[arg(long = "api-key", env = "ASSET_FEED_API_KEY")]
    pub api_key: Option<String>,
    /// Path to asset-change-poller.toml
    #[arg(long = "config")]
    pub config_path: Option<PathBuf>,
    /// Poll interval in milliseconds (default: 5000)
    #[arg(
        long = "interval-ms",
        value_parser = clap::value_parser!(u64).range(MIN_POLL_INTERVAL_MS..=MAX_POLL_INTERVAL_MS)
    )]
    pub interval_ms: Option<u64>,
    /// Checkpoint state file (defaults to ~/.asset-change-poller/checkpoint.json)
    #[arg(long = "state")]
    pub state_path: Option<PathBuf>,
    /// Keep the checkpoint in memory only
    #[arg(long)]
    pub no_persist: bool,
    /// JSON map of assetId -> lastModified to seed the local cache with
    #[arg(long)]
    pub fingerprints: Option<PathBuf>,
    /// Run a single poll cycle and exit
    #[arg(long)]
    pub once: bool,
}

impl WatchArgs {
    /// Merge flags, config file and defaults. Flags win over the file.
    pub fn resolve(&self) -> Result<(FeedConfig, PollerConfig)> {
        let file = match &self.config_path {
            Some(path) => FileConfig::load(path)?,
            None => FileConfig::default(),
        };

        let endpoint = self
            .endpoint
            .clone()
            .or(file.feed.endpoint)
            .ok_or_else(|| {
                anyhow::anyhow!(
                    "Change feed endpoint not provided. Use `--endpoint`, ASSET_FEED_ENDPOINT or [feed] endpoint in the config file."
                )
            })?;
        validate_endpoint(&endpoint)?;

        let feed = FeedConfig {
            endpoint,
            api_key: self.api_key.clone().or(file.feed.api_key),
            timeout: file
                .feed
                .timeout_secs
                .map(Duration::from_secs)
                .unwrap_or(DEFAULT_REQUEST_TIMEOUT),
        };

        let persist = !self.no_persist && file.poller.persist_checkpoint.unwrap_or(true);
        let state_path = if persist {
            Some(
                self.state_path
                    .clone()
                    .or(file.poller.state_path)
                    .unwrap_or_else(CheckpointState::default_path),
            )
        } else {
            None
        };

        let interval_ms = self.interval_ms.or(file.poller.interval_ms);
        if let Some(interval_ms) = interval_ms {
            validate_interval_ms(interval_ms).context("Invalid poller interval_ms")?;
        }

        let poller = PollerConfig {
            poll_interval: interval_ms
                .map(Duration::from_millis)
                .unwrap_or(DEFAULT_POLL_INTERVAL),
            state_path,
        };

        Ok((feed, poller))
    }
}

pub async fn watch(args: WatchArgs) -> Result<()> {
    let (feed_config, poller_config) = args.resolve()?;

    let cache = match &args.fingerprints {
        Some(path) => FingerprintCache::load_snapshot(path)?,
        None => FingerprintCache::new(),
    };
    let cache = Arc::new(cache);
    tracing::info!("Local fingerprint cache holds {} assets", cache.len());

    let endpoint = feed_config.endpoint.clone();
    let feed = GraphQlChangeFeed::new(feed_config)?;
    let mut poller =
        ChangePoller::resume(feed, Arc::clone(&cache), poller_config, &endpoint).await;

    if args.once {
        return match poller.poll_once().await {
            CycleOutcome::Failed(e) => Err(e).context("Change poll failed"),
            _ => {
                let changes = poller.published();
                print_changes(&changes);
                apply_to_cache(&cache, &changes);
                println!("Checkpoint: {}", poller.checkpoint());
                Ok(())
            }
        };
    }

    println!("Watching {} for asset changes (Ctrl-C to stop)", endpoint);
    let handle = poller.spawn();
    let mut changes = handle.subscribe();
    let mut status = handle.subscribe();

    loop {
        tokio::select! {
            _ = tokio::signal::ctrl_c() => {
                tracing::info!("Received Ctrl-C, stopping watcher");
                break;
            }
            published = changes.changed() => match published {
                Some(published) => {
                    print_changes(&published);
                    apply_to_cache(&cache, &published);
                }
                None => break,
            },
            update = status.status_changed() => match update {
                Some(update) if update.state == PollerState::Failed => {
                    eprintln!(
                        "Change poll failed ({} in a row): {}",
                        update.consecutive_failures,
                        update.last_error.unwrap_or_default()
                    );
                }
                Some(_) => {}
                None => break,
            },
        }
    }

    handle.stop().await
}

/// React to published changes the way a UI would: refresh what changed, drop
/// what was removed.
pub fn apply_to_cache(cache: &FingerprintCache, changes: &[ChangeRecord]) {
    for change in changes {
        match change.change_type {
            ChangeType::Removed => {
                cache.evict(&change.asset_id);
            }
            ChangeType::Created | ChangeType::Updated | ChangeType::Replaced => {
                cache.record(&change.asset_id, change.last_modified);
            }
        }
    }
}

fn print_changes(changes: &[ChangeRecord]) {
    if changes.is_empty() {
        println!("No unknown changes.");
        return;
    }
    println!("{:<40} {:<16} {:>16}", "ASSET ID", "TYPE", "LAST MODIFIED");
    for change in changes {
        println!(
            "{:<40} {:<16} {:>16}",
            change.asset_id,
            change.change_type.as_str(),
            change.last_modified
        );
    }
}
