// ABOUTME: Change feed data model - change records, batches and the checkpoint
// ABOUTME: Mirrors the changedAssets payload returned by the media API

use serde::{Deserialize, Deserializer, Serialize};
use std::fmt;

/// Kind of mutation the server reports for an asset.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ChangeType {
    #[serde(rename = "ASSET_CREATED")]
    Created,
    #[serde(rename = "ASSET_UPDATED")]
    Updated,
    #[serde(rename = "ASSET_REPLACED")]
    Replaced,
    #[serde(rename = "ASSET_REMOVED")]
    Removed,
}

impl ChangeType {
    pub fn as_str(&self) -> &'static str {
        match self {
            ChangeType::Created => "ASSET_CREATED",
            ChangeType::Updated => "ASSET_UPDATED",
            ChangeType::Replaced => "ASSET_REPLACED",
            ChangeType::Removed => "ASSET_REMOVED",
        }
    }
}

impl fmt::Display for ChangeType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One mutation of an asset as reported by the change feed.
///
/// Records are immutable once received; `last_modified` is the server-side
/// modification version of the asset after this change.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChangeRecord {
    pub asset_id: String,
    pub last_modified: u64,
    #[serde(rename = "type")]
    pub change_type: ChangeType,
}

impl ChangeRecord {
    pub fn new(asset_id: impl Into<String>, last_modified: u64, change_type: ChangeType) -> Self {
        Self {
            asset_id: asset_id.into(),
            last_modified,
            change_type,
        }
    }
}

/// Result of a single change feed query.
///
/// Both keys must be present in the payload. `last_modified` may be `null`,
/// in which case the checkpoint is left where it was.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChangeBatch {
    #[serde(deserialize_with = "present_or_null")]
    pub last_modified: Option<u64>,
    pub changes: Vec<ChangeRecord>,
}

impl ChangeBatch {
    pub fn new(last_modified: Option<u64>, changes: Vec<ChangeRecord>) -> Self {
        Self {
            last_modified,
            changes,
        }
    }

    pub fn empty(last_modified: Option<u64>) -> Self {
        Self::new(last_modified, Vec::new())
    }

    pub fn is_empty(&self) -> bool {
        self.changes.is_empty()
    }
}

// A plain `Option` field would silently default to `None` when the key is
// missing; with `deserialize_with` serde reports the missing key instead.
fn present_or_null<'de, D>(deserializer: D) -> Result<Option<u64>, D::Error>
where
    D: Deserializer<'de>,
{
    Option::<u64>::deserialize(deserializer)
}

/// Position in the change feed up to which changes have been received.
///
/// `Checkpoint::UNSET` means "beginning of time" and orders before every set
/// checkpoint, so `max` keeps it monotonic.
#[derive(
    Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
#[serde(transparent)]
pub struct Checkpoint(Option<u64>);

impl Checkpoint {
    pub const UNSET: Checkpoint = Checkpoint(None);

    pub fn at(value: u64) -> Self {
        Checkpoint(Some(value))
    }

    pub fn value(&self) -> Option<u64> {
        self.0
    }

    pub fn is_set(&self) -> bool {
        self.0.is_some()
    }
}

impl From<Option<u64>> for Checkpoint {
    fn from(value: Option<u64>) -> Self {
        Checkpoint(value)
    }
}

impl fmt::Display for Checkpoint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.0 {
            Some(value) => write!(f, "{}", value),
            None => f.write_str("unset"),
        }
    }
}
