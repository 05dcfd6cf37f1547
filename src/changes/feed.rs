// ABOUTME: ChangeFeed capability - "assets changed since checkpoint" queries
// ABOUTME: Defines the async trait the poller polls and its typed error

use async_trait::async_trait;
use std::sync::Arc;

use super::record::{ChangeBatch, Checkpoint};

/// Errors a single change feed query can end with.
///
/// All of them are transient from the poller's point of view: the cycle is
/// discarded and the query is retried on the next interval.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum FeedError {
    #[error("change feed request failed: {0}")]
    Transport(String),
    #[error("change feed returned status {status}: {body}")]
    Status { status: u16, body: String },
    #[error("change feed rejected the API key")]
    Unauthorized,
    #[error("malformed change feed payload: {0}")]
    Malformed(String),
    #[error("change feed query failed: {}", .0.join("; "))]
    Query(Vec<String>),
}

/// Source of change batches.
///
/// Querying twice with the same checkpoint and no server-side change in
/// between must return an empty change list the second time. An unset
/// checkpoint asks for a recent baseline and is never an error.
#[async_trait]
pub trait ChangeFeed: Send + Sync {
    async fn poll(&self, since: Checkpoint) -> Result<ChangeBatch, FeedError>;
}

#[async_trait]
impl<T: ChangeFeed + ?Sized> ChangeFeed for Arc<T> {
    async fn poll(&self, since: Checkpoint) -> Result<ChangeBatch, FeedError> {
        (**self).poll(since).await
    }
}
