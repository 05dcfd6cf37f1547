// ABOUTME: Read-only view into the local asset cache used to spot already-known changes
// ABOUTME: Provides the FingerprintLookup capability and an in-memory cache implementation

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::Path;
use std::sync::{Arc, PoisonError, RwLock};

/// Type name the cache uses to build normalized entity keys.
const ASSET_TYPENAME: &str = "Asset";

/// Normalized key of an asset entry inside the local cache (`Asset:<id>`).
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct CacheKey(String);

impl CacheKey {
    pub fn for_asset(asset_id: &str) -> Self {
        CacheKey(format!("{}:{}", ASSET_TYPENAME, asset_id))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

/// The `lastModified` fragment of a cached asset.
///
/// A fragment without a value is treated exactly like a missing entry.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AssetFingerprint {
    pub last_modified: Option<u64>,
}

impl AssetFingerprint {
    pub fn new(last_modified: u64) -> Self {
        Self {
            last_modified: Some(last_modified),
        }
    }
}

/// Cache-only access to locally held asset versions.
///
/// Implementations must answer synchronously from memory and must never go to
/// the network, otherwise filtering a poll result could itself cause more
/// change traffic. Anything that cannot be answered is reported as absent.
pub trait FingerprintLookup {
    /// Resolve the cache key of an asset, `None` if it cannot be identified.
    fn identify(&self, asset_id: &str) -> Option<CacheKey>;

    /// Read the `lastModified` fragment stored under `key`.
    fn read_fragment(&self, key: &CacheKey) -> Option<AssetFingerprint>;

    /// Locally cached `lastModified` of an asset, if the cache holds one.
    fn fingerprint(&self, asset_id: &str) -> Option<u64> {
        let key = self.identify(asset_id)?;
        self.read_fragment(&key)?.last_modified
    }
}

impl<T: FingerprintLookup + ?Sized> FingerprintLookup for Arc<T> {
    fn identify(&self, asset_id: &str) -> Option<CacheKey> {
        (**self).identify(asset_id)
    }

    fn read_fragment(&self, key: &CacheKey) -> Option<AssetFingerprint> {
        (**self).read_fragment(key)
    }
}

impl<T: FingerprintLookup + ?Sized> FingerprintLookup for &T {
    fn identify(&self, asset_id: &str) -> Option<CacheKey> {
        (**self).identify(asset_id)
    }

    fn read_fragment(&self, key: &CacheKey) -> Option<AssetFingerprint> {
        (**self).read_fragment(key)
    }
}

/// In-memory asset cache keyed the same way the UI cache normalizes assets.
///
/// The poller only ever reads from it. Writes (`record`, `evict`) belong to
/// whichever consumer refreshes assets after a change was published.
#[derive(Debug, Default)]
pub struct FingerprintCache {
    entries: RwLock<HashMap<CacheKey, AssetFingerprint>>,
}

impl FingerprintCache {
    pub fn new() -> Self {
        Self::default()
    }

    /// Build a cache from a `{assetId: lastModified}` map.
    pub fn from_snapshot(snapshot: HashMap<String, u64>) -> Self {
        let entries = snapshot
            .into_iter()
            .map(|(asset_id, last_modified)| {
                (
                    CacheKey::for_asset(&asset_id),
                    AssetFingerprint::new(last_modified),
                )
            })
            .collect();
        Self {
            entries: RwLock::new(entries),
        }
    }

    /// Load a `{assetId: lastModified}` JSON snapshot from disk.
    pub fn load_snapshot(path: &Path) -> Result<Self> {
        let contents = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read fingerprint snapshot {:?}", path))?;
        let snapshot: HashMap<String, u64> = serde_json::from_str(&contents)
            .with_context(|| format!("Failed to parse fingerprint snapshot {:?}", path))?;
        Ok(Self::from_snapshot(snapshot))
    }

    /// Store the version the local cache now holds for an asset.
    pub fn record(&self, asset_id: &str, last_modified: u64) {
        let mut entries = self.entries.write().unwrap_or_else(PoisonError::into_inner);
        entries.insert(
            CacheKey::for_asset(asset_id),
            AssetFingerprint::new(last_modified),
        );
    }

    /// Drop an asset from the cache. Returns whether an entry existed.
    pub fn evict(&self, asset_id: &str) -> bool {
        let mut entries = self.entries.write().unwrap_or_else(PoisonError::into_inner);
        entries.remove(&CacheKey::for_asset(asset_id)).is_some()
    }

    pub fn len(&self) -> usize {
        self.entries
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl FingerprintLookup for FingerprintCache {
    fn identify(&self, asset_id: &str) -> Option<CacheKey> {
        if asset_id.is_empty() {
            return None;
        }
        Some(CacheKey::for_asset(asset_id))
    }

    fn read_fragment(&self, key: &CacheKey) -> Option<AssetFingerprint> {
        // A poisoned lock reads as "absent": the change gets forwarded.
        self.entries.read().ok()?.get(key).copied()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cache_key_format() {
        assert_eq!(CacheKey::for_asset("a1").as_str(), "Asset:a1");
    }

    #[test]
    fn test_record_and_lookup() {
        let cache = FingerprintCache::new();
        assert!(cache.is_empty());
        assert_eq!(cache.fingerprint("a1"), None);

        cache.record("a1", 100);
        assert_eq!(cache.fingerprint("a1"), Some(100));
        assert_eq!(cache.len(), 1);

        cache.record("a1", 120);
        assert_eq!(cache.fingerprint("a1"), Some(120));
        assert_eq!(cache.len(), 1);
    }

    #[test]
    fn test_evict() {
        let cache = FingerprintCache::new();
        cache.record("a1", 100);
        assert!(cache.evict("a1"));
        assert!(!cache.evict("a1"));
        assert_eq!(cache.fingerprint("a1"), None);
    }

    #[test]
    fn test_empty_asset_id_is_not_identifiable() {
        let cache = FingerprintCache::new();
        cache.record("", 5);
        assert_eq!(cache.identify(""), None);
        assert_eq!(cache.fingerprint(""), None);
    }

    #[test]
    fn test_fragment_without_value_reads_as_absent() {
        struct HalfCache;
        impl FingerprintLookup for HalfCache {
            fn identify(&self, asset_id: &str) -> Option<CacheKey> {
                Some(CacheKey::for_asset(asset_id))
            }
            fn read_fragment(&self, _key: &CacheKey) -> Option<AssetFingerprint> {
                Some(AssetFingerprint::default())
            }
        }
        assert_eq!(HalfCache.fingerprint("a1"), None);
    }

    #[test]
    fn test_load_snapshot() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("fingerprints.json");
        std::fs::write(&path, r#"{"a1": 100, "a2": 7}"#).unwrap();

        let cache = FingerprintCache::load_snapshot(&path).unwrap();
        assert_eq!(cache.fingerprint("a1"), Some(100));
        assert_eq!(cache.fingerprint("a2"), Some(7));
        assert_eq!(cache.fingerprint("a3"), None);
    }

    #[test]
    fn test_load_snapshot_rejects_garbage() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("fingerprints.json");
        std::fs::write(&path, "not json").unwrap();
        assert!(FingerprintCache::load_snapshot(&path).is_err());
    }

    #[test]
    fn test_len_survives_poisoned_lock() {
        let cache = Arc::new(FingerprintCache::new());
        cache.record("a1", 1);
        cache.record("a2", 2);

        let poisoner = Arc::clone(&cache);
        let _ = std::thread::spawn(move || {
            let _guard = poisoner.entries.write().unwrap();
            panic!("poison the cache lock");
        })
        .join();

        assert!(cache.entries.is_poisoned());
        assert_eq!(cache.len(), 2);
        assert!(!cache.is_empty());
        cache.record("a3", 3);
        assert_eq!(cache.len(), 3);
    }
}
