// ABOUTME: Change polling module - keeps the local asset cache in step with server-side changes
// ABOUTME: Polls the change feed, drops self-caused changes, and publishes the rest

pub mod feed;
pub mod fingerprint;
pub mod poller;
pub mod reconciler;
pub mod record;
pub mod state;
pub mod tracker;

pub use feed::{ChangeFeed, FeedError};
pub use fingerprint::{AssetFingerprint, CacheKey, FingerprintCache, FingerprintLookup};
pub use poller::{ChangePoller, ChangeSubscription, PollerHandle};
pub use reconciler::{advance, is_unknown, publish, reconcile};
pub use record::{ChangeBatch, ChangeRecord, ChangeType, Checkpoint};
pub use state::{CheckpointState, CheckpointStore};
pub use tracker::{ChangeTracker, CycleOutcome, PollStatus, PollTicket, PollerState};
