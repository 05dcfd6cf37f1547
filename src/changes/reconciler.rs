// ABOUTME: Reconciliation of change batches against the local asset cache
// ABOUTME: Pure reconcile/advance/publish steps applied after every successful poll

use std::sync::Arc;

use super::fingerprint::FingerprintLookup;
use super::record::{ChangeBatch, ChangeRecord, Checkpoint};

/// Keep only the changes the local cache does not already reflect.
///
/// A change is forwarded when the cache has no fingerprint for the asset or
/// holds an older one. A fingerprint equal to the change's `last_modified` is
/// taken to mean this client caused the change itself, so it is suppressed.
/// That heuristic cannot tell an echo of our own write from a different
/// change that shares the same timestamp; with coarse server timestamps such
/// changes are missed.
///
/// Batch order is preserved.
pub fn reconcile<L>(batch: &ChangeBatch, lookup: &L) -> Vec<ChangeRecord>
where
    L: FingerprintLookup + ?Sized,
{
    batch
        .changes
        .iter()
        .filter(|change| is_unknown(change, lookup))
        .cloned()
        .collect()
}

/// Whether `change` is newer than what the local cache holds.
pub fn is_unknown<L>(change: &ChangeRecord, lookup: &L) -> bool
where
    L: FingerprintLookup + ?Sized,
{
    match lookup.fingerprint(&change.asset_id) {
        None => true,
        Some(cached) => cached < change.last_modified,
    }
}

/// Next checkpoint after `batch`. Never moves backwards; a batch without a
/// checkpoint leaves it unchanged.
pub fn advance(current: Checkpoint, batch: &ChangeBatch) -> Checkpoint {
    match batch.last_modified {
        Some(value) => current.max(Checkpoint::at(value)),
        None => current,
    }
}

/// List to expose to subscribers after a cycle.
///
/// An empty result keeps the previous list (the same allocation), so
/// subscribers are not woken up by cycles that found nothing new.
pub fn publish(
    filtered: Vec<ChangeRecord>,
    previously_published: &Arc<Vec<ChangeRecord>>,
) -> Arc<Vec<ChangeRecord>> {
    if filtered.is_empty() {
        Arc::clone(previously_published)
    } else {
        Arc::new(filtered)
    }
}
