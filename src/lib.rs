// ABOUTME: Library root for asset-change-poller
// ABOUTME: Exports the change poller, feed client, configuration and CLI commands

pub mod changes;
pub mod commands;
pub mod config;
pub mod remote;

pub use changes::{
    ChangeBatch, ChangeFeed, ChangePoller, ChangeRecord, ChangeType, Checkpoint, FeedError,
    FingerprintCache, FingerprintLookup,
};
