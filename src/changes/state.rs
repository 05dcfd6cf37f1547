// ABOUTME: CheckpointState - persisted change feed position of a poller
// ABOUTME: Lets a restarted watcher resume from its last checkpoint instead of the baseline

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use tokio::fs;

use super::record::Checkpoint;

const STATE_VERSION: u32 = 1;

/// Persisted checkpoint for one change feed endpoint.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CheckpointState {
    /// Feed endpoint (sanitized - no password)
    pub endpoint: String,
    /// Last checkpoint received from the feed
    pub checkpoint: Checkpoint,
    /// Version of the state format for future migrations
    pub version: u32,
    /// When this state was created
    pub created_at: chrono::DateTime<chrono::Utc>,
    /// When the checkpoint last moved
    pub updated_at: chrono::DateTime<chrono::Utc>,
}

impl CheckpointState {
    /// Create state for an endpoint with an unset checkpoint
    pub fn new(endpoint: &str) -> Self {
        let now = chrono::Utc::now();
        Self {
            endpoint: sanitize_url(endpoint),
            checkpoint: Checkpoint::UNSET,
            version: STATE_VERSION,
            created_at: now,
            updated_at: now,
        }
    }

    /// Record a new checkpoint
    pub fn update(&mut self, checkpoint: Checkpoint) {
        self.checkpoint = checkpoint;
        self.updated_at = chrono::Utc::now();
    }

    /// Check whether this state was written for `endpoint`
    pub fn matches_endpoint(&self, endpoint: &str) -> bool {
        self.endpoint == sanitize_url(endpoint)
    }

    /// Load state from a JSON file
    pub async fn load(path: &Path) -> Result<Self> {
        let contents = fs::read_to_string(path)
            .await
            .with_context(|| format!("Failed to read checkpoint state from {:?}", path))?;
        let state: CheckpointState = serde_json::from_str(&contents)
            .with_context(|| format!("Failed to parse checkpoint state from {:?}", path))?;

        if state.version > STATE_VERSION {
            anyhow::bail!(
                "Checkpoint state {:?} was written by a newer asset-change-poller version",
                path
            );
        }
        Ok(state)
    }

    /// Save state to a JSON file
    pub async fn save(&self, path: &Path) -> Result<()> {
        // Ensure parent directory exists
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)
                .await
                .with_context(|| format!("Failed to create directory {:?}", parent))?;
        }

        let contents =
            serde_json::to_string_pretty(self).context("Failed to serialize checkpoint state")?;
        fs::write(path, contents)
            .await
            .with_context(|| format!("Failed to write checkpoint state to {:?}", path))?;
        Ok(())
    }

    /// Load the checkpoint to resume from, falling back to an unset one.
    ///
    /// A missing, unreadable or foreign state file is never fatal.
    pub async fn resume_point(path: &Path, endpoint: &str) -> Checkpoint {
        if !path.exists() {
            return Checkpoint::UNSET;
        }
        match Self::load(path).await {
            Ok(state) if state.matches_endpoint(endpoint) => {
                tracing::info!(
                    "Resuming from checkpoint {} stored in {:?}",
                    state.checkpoint,
                    path
                );
                state.checkpoint
            }
            Ok(state) => {
                tracing::warn!(
                    "Checkpoint state in {:?} belongs to {}, starting from the baseline",
                    path,
                    state.endpoint
                );
                Checkpoint::UNSET
            }
            Err(e) => {
                tracing::warn!(
                    "Failed to load checkpoint state from {:?}: {}. Starting from the baseline.",
                    path,
                    e
                );
                Checkpoint::UNSET
            }
        }
    }

    /// Default state file path (~/.asset-change-poller/checkpoint.json)
    pub fn default_path() -> PathBuf {
        match dirs::home_dir() {
            Some(home) => home.join(".asset-change-poller").join("checkpoint.json"),
            None => PathBuf::from(".asset-change-poller/checkpoint.json"),
        }
    }
}

/// Checkpoint file bound to one endpoint; writes only when the checkpoint moves.
#[derive(Debug)]
pub struct CheckpointStore {
    path: PathBuf,
    state: CheckpointState,
}

impl CheckpointStore {
    /// Open the store at `path`, resuming its checkpoint when it belongs to `endpoint`.
    pub async fn open(path: PathBuf, endpoint: &str) -> Self {
        let mut state = CheckpointState::new(endpoint);
        state.checkpoint = CheckpointState::resume_point(&path, endpoint).await;
        Self { path, state }
    }

    pub fn checkpoint(&self) -> Checkpoint {
        self.state.checkpoint
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Persist `checkpoint` if it differs from the stored one.
    pub async fn record(&mut self, checkpoint: Checkpoint) -> Result<bool> {
        if checkpoint == self.state.checkpoint {
            return Ok(false);
        }
        self.state.update(checkpoint);
        self.state.save(&self.path).await?;
        Ok(true)
    }
}

/// Sanitize an endpoint URL by masking the password component
pub(crate) fn sanitize_url(url: &str) -> String {
    if let Ok(mut parsed) = url::Url::parse(url) {
        if parsed.password().is_some() {
            let _ = parsed.set_password(Some("***"));
        }
        parsed.to_string()
    } else {
        url.to_string()
    }
}
