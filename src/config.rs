// ABOUTME: Configuration for the change feed client and the poller
// ABOUTME: Defaults, optional TOML config file, and endpoint validation

use anyhow::{bail, Context, Result};
use serde::Deserialize;
use std::path::{Path, PathBuf};
use std::time::Duration;
use url::Url;

use crate::changes::CheckpointState;

/// Fixed polling cadence of the change feed.
pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_millis(5000);

/// Per-request timeout of the change feed client.
pub const DEFAULT_REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

/// Accepted poll interval bounds in milliseconds, for flags and config files alike.
pub const MIN_POLL_INTERVAL_MS: u64 = 100;
pub const MAX_POLL_INTERVAL_MS: u64 = 3_600_000;

/// Connection settings for the GraphQL change feed.
#[derive(Debug, Clone)]
pub struct FeedConfig {
    /// GraphQL endpoint of the media API
    pub endpoint: String,
    /// Sent as `x-api-key` when present
    pub api_key: Option<String>,
    pub timeout: Duration,
}

impl FeedConfig {
    pub fn new(endpoint: impl Into<String>) -> Self {
        Self {
            endpoint: endpoint.into(),
            api_key: None,
            timeout: DEFAULT_REQUEST_TIMEOUT,
        }
    }
}

/// Configuration for the ChangePoller.
#[derive(Debug, Clone)]
pub struct PollerConfig {
    /// Interval between poll cycles
    pub poll_interval: Duration,
    /// Where to persist the checkpoint. `None` keeps it in memory only.
    pub state_path: Option<PathBuf>,
}

impl Default for PollerConfig {
    fn default() -> Self {
        Self {
            poll_interval: DEFAULT_POLL_INTERVAL,
            state_path: Some(CheckpointState::default_path()),
        }
    }
}

/// Contents of an optional `asset-change-poller.toml`.
///
/// ```toml
/// [feed]
/// endpoint = "https://cms.example.com/neos/graphql/media-assets"
/// api_key = "..."
/// timeout_secs = 30
///
/// [poller]
/// interval_ms = 5000
/// state_path = "/var/lib/asset-change-poller/checkpoint.json"
/// persist_checkpoint = true
/// ```
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct FileConfig {
    #[serde(default)]
    pub feed: FeedSection,
    #[serde(default)]
    pub poller: PollerSection,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct FeedSection {
    pub endpoint: Option<String>,
    pub api_key: Option<String>,
    pub timeout_secs: Option<u64>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct PollerSection {
    pub interval_ms: Option<u64>,
    pub state_path: Option<PathBuf>,
    pub persist_checkpoint: Option<bool>,
}

impl FileConfig {
    /// Load a TOML config file
    pub fn load(path: &Path) -> Result<Self> {
        let contents = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file {:?}", path))?;
        Self::parse(&contents).with_context(|| format!("Failed to parse config file {:?}", path))
    }

    pub fn parse(contents: &str) -> Result<Self> {
        let config: FileConfig = toml::from_str(contents)?;
        Ok(config)
    }
}

/// Validate a poll interval given in milliseconds
pub fn validate_interval_ms(interval_ms: u64) -> Result<()> {
    if !(MIN_POLL_INTERVAL_MS..=MAX_POLL_INTERVAL_MS).contains(&interval_ms) {
        bail!(
            "Poll interval must be between {} and {} ms, got {}",
            MIN_POLL_INTERVAL_MS,
            MAX_POLL_INTERVAL_MS,
            interval_ms
        );
    }
    Ok(())
}

/// Validate a change feed endpoint
///
/// The endpoint must be an absolute http(s) URL with a host.
pub fn validate_endpoint(endpoint: &str) -> Result<()> {
    if endpoint.trim().is_empty() {
        bail!("Change feed endpoint cannot be empty");
    }

    let parsed = Url::parse(endpoint).with_context(|| {
        format!(
            "Invalid change feed endpoint.\n\
             Expected format: https://host/path/to/graphql\n\
             Got: {}",
            endpoint
        )
    })?;

    if parsed.scheme() != "http" && parsed.scheme() != "https" {
        bail!(
            "Change feed endpoint must use http or https, got {}",
            parsed.scheme()
        );
    }

    if parsed.host_str().is_none() {
        bail!("Change feed endpoint is missing a host");
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_poller_config_default() {
        let config = PollerConfig::default();
        assert_eq!(config.poll_interval, Duration::from_millis(5000));
        assert!(config
            .state_path
            .unwrap()
            .to_string_lossy()
            .ends_with("checkpoint.json"));
    }

    #[test]
    fn test_validate_interval_ms() {
        assert!(validate_interval_ms(100).is_ok());
        assert!(validate_interval_ms(3_600_000).is_ok());
        assert!(validate_interval_ms(0).is_err());
        assert!(validate_interval_ms(99).is_err());
        assert!(validate_interval_ms(3_600_001).is_err());
    }

    #[test]
    fn test_feed_config_new() {
        let config = FeedConfig::new("https://cms.example.com/graphql");
        assert_eq!(config.timeout, Duration::from_secs(30));
        assert!(config.api_key.is_none());
    }

    #[test]
    fn test_parse_full_file_config() {
        let config = FileConfig::parse(
            r#"
            [feed]
            endpoint = "https://cms.example.com/graphql"
            api_key = "k"
            timeout_secs = 10

            [poller]
            interval_ms = 2500
            persist_checkpoint = false
            "#,
        )
        .unwrap();
        assert_eq!(
            config.feed.endpoint.as_deref(),
            Some("https://cms.example.com/graphql")
        );
        assert_eq!(config.feed.api_key.as_deref(), Some("k"));
        assert_eq!(config.feed.timeout_secs, Some(10));
        assert_eq!(config.poller.interval_ms, Some(2500));
        assert_eq!(config.poller.persist_checkpoint, Some(false));
        assert!(config.poller.state_path.is_none());
    }

    #[test]
    fn test_parse_empty_file_config() {
        let config = FileConfig::parse("").unwrap();
        assert!(config.feed.endpoint.is_none());
        assert!(config.poller.interval_ms.is_none());
    }

    #[test]
    fn test_parse_rejects_unknown_keys() {
        assert!(FileConfig::parse("[poller]\nintervall_ms = 5\n").is_err());
    }

    #[test]
    fn test_validate_endpoint() {
        assert!(validate_endpoint("https://cms.example.com/graphql").is_ok());
        assert!(validate_endpoint("http://localhost:8081/graphql").is_ok());
        assert!(validate_endpoint("").is_err());
        assert!(validate_endpoint("cms.example.com/graphql").is_err());
        assert!(validate_endpoint("ftp://cms.example.com/graphql").is_err());
    }
}
