// ABOUTME: ChangePoller - drives the change feed on a fixed interval
// ABOUTME: Publishes net-new asset changes and poll status to subscribers

use anyhow::{bail, Context, Result};
use futures::future::BoxFuture;
use std::sync::Arc;
use tokio::sync::{broadcast, watch};
use tokio::task::JoinHandle;
use tokio::time::{interval, MissedTickBehavior};

use super::feed::{ChangeFeed, FeedError};
use super::fingerprint::FingerprintLookup;
use super::record::{ChangeBatch, ChangeRecord, Checkpoint};
use super::state::CheckpointStore;
use super::tracker::{ChangeTracker, CycleOutcome, PollStatus, PollTicket};
use crate::config::PollerConfig;

type PendingPoll<'a> = Option<(PollTicket, BoxFuture<'a, Result<ChangeBatch, FeedError>>)>;

/// Receiving side of a poller.
///
/// `changes` only ticks when a cycle found something new; `status` ticks on
/// every state change, including failures.
#[derive(Debug, Clone)]
pub struct ChangeSubscription {
    changes: watch::Receiver<Arc<Vec<ChangeRecord>>>,
    status: watch::Receiver<PollStatus>,
}

impl ChangeSubscription {
    /// Most recently published changes.
    pub fn latest(&self) -> Arc<Vec<ChangeRecord>> {
        Arc::clone(&self.changes.borrow())
    }

    pub fn status(&self) -> PollStatus {
        self.status.borrow().clone()
    }

    /// Wait for the next published change list. `None` once the poller is gone.
    pub async fn changed(&mut self) -> Option<Arc<Vec<ChangeRecord>>> {
        self.changes.changed().await.ok()?;
        Some(Arc::clone(&self.changes.borrow_and_update()))
    }

    /// Wait for the next status update. `None` once the poller is gone.
    pub async fn status_changed(&mut self) -> Option<PollStatus> {
        self.status.changed().await.ok()?;
        Some(self.status.borrow_and_update().clone())
    }
}

struct Channels {
    changes: watch::Sender<Arc<Vec<ChangeRecord>>>,
    status: watch::Sender<PollStatus>,
}

impl Channels {
    fn new(tracker: &ChangeTracker) -> Self {
        let (changes, _) = watch::channel(Arc::clone(tracker.published()));
        let (status, _) = watch::channel(tracker.status());
        Self { changes, status }
    }

    fn subscribe(&self) -> ChangeSubscription {
        ChangeSubscription {
            changes: self.changes.subscribe(),
            status: self.status.subscribe(),
        }
    }

    fn announce(&self, tracker: &ChangeTracker, outcome: &CycleOutcome) {
        if let CycleOutcome::Published { .. } = outcome {
            self.changes.send_replace(Arc::clone(tracker.published()));
        }
        self.publish_status(tracker);
    }

    fn publish_status(&self, tracker: &ChangeTracker) {
        self.status.send_replace(tracker.status());
    }
}

/// Polls a [`ChangeFeed`] and publishes the changes the local cache does not
/// know about yet.
///
/// Each cycle:
/// 1. Queries changes since the current checkpoint
/// 2. Drops changes whose fingerprint is already in the local cache
/// 3. Advances the checkpoint
/// 4. Publishes the remaining changes, if any
///
/// Tests can drive cycles with [`ChangePoller::poll_once`]; production code
/// uses [`ChangePoller::spawn`] or [`ChangePoller::run`].
pub struct ChangePoller<F, L> {
    feed: F,
    lookup: L,
    config: PollerConfig,
    tracker: ChangeTracker,
    channels: Channels,
    store: Option<CheckpointStore>,
}

impl<F, L> ChangePoller<F, L>
where
    F: ChangeFeed,
    L: FingerprintLookup,
{
    /// Create a poller starting from an unset checkpoint, without persistence.
    pub fn new(feed: F, lookup: L, config: PollerConfig) -> Self {
        let tracker = ChangeTracker::new(Checkpoint::UNSET);
        let channels = Channels::new(&tracker);
        Self {
            feed,
            lookup,
            config,
            tracker,
            channels,
            store: None,
        }
    }

    /// Create a poller that resumes from and persists to `config.state_path`.
    pub async fn resume(feed: F, lookup: L, config: PollerConfig, endpoint: &str) -> Self {
        let store = match config.state_path.clone() {
            Some(path) => Some(CheckpointStore::open(path, endpoint).await),
            None => None,
        };
        let mut poller = Self::new(feed, lookup, config);
        if let Some(store) = store {
            poller = poller.with_checkpoint(store.checkpoint());
            poller.store = Some(store);
        }
        poller
    }

    /// Start from `checkpoint` instead of the beginning of time.
    pub fn with_checkpoint(mut self, checkpoint: Checkpoint) -> Self {
        self.tracker = ChangeTracker::new(checkpoint);
        self.channels.publish_status(&self.tracker);
        self
    }

    pub fn subscribe(&self) -> ChangeSubscription {
        self.channels.subscribe()
    }

    pub fn checkpoint(&self) -> Checkpoint {
        self.tracker.checkpoint()
    }

    pub fn published(&self) -> Arc<Vec<ChangeRecord>> {
        Arc::clone(self.tracker.published())
    }

    pub fn status(&self) -> PollStatus {
        self.tracker.status()
    }

    pub fn config(&self) -> &PollerConfig {
        &self.config
    }

    /// Run a single poll cycle to completion.
    pub async fn poll_once(&mut self) -> CycleOutcome {
        let Some(ticket) = self.tracker.begin_poll() else {
            tracing::debug!("Poll already in flight or poller stopped, skipping cycle");
            return CycleOutcome::Skipped;
        };
        self.channels.publish_status(&self.tracker);

        let result = self.feed.poll(ticket.since).await;
        let outcome = self.tracker.complete_poll(ticket, result, &self.lookup);
        finish_cycle(&self.tracker, &self.channels, &mut self.store, &outcome).await;
        outcome
    }

    /// Stop polling; a result still on its way will be ignored.
    pub fn cancel(&mut self) {
        self.tracker.cancel();
        self.channels.publish_status(&self.tracker);
    }

    /// Run the poller continuously until a shutdown signal arrives.
    ///
    /// Ticks that fire while a query is still outstanding are dropped, so at
    /// most one request is in flight. On shutdown the outstanding request is
    /// abandoned and its result never applied.
    pub async fn run(self, mut shutdown: broadcast::Receiver<()>) -> Result<()> {
        let ChangePoller {
            feed,
            lookup,
            config,
            mut tracker,
            channels,
            mut store,
        } = self;

        if config.poll_interval.is_zero() {
            bail!("Poll interval must be greater than zero");
        }

        let mut ticker = interval(config.poll_interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
        let mut pending: PendingPoll<'_> = None;

        tracing::info!(
            "Starting ChangePoller with poll_interval={:?}, checkpoint={}",
            config.poll_interval,
            tracker.checkpoint()
        );

        loop {
            tokio::select! {
                biased; // Check shutdown first

                _ = shutdown.recv() => {
                    tracing::info!("Shutdown signal received, stopping ChangePoller");
                    break;
                }
                (ticket, result) = wait_for(&mut pending) => {
                    pending = None;
                    let outcome = tracker.complete_poll(ticket, result, &lookup);
                    finish_cycle(&tracker, &channels, &mut store, &outcome).await;
                }
                _ = ticker.tick() => {
                    match tracker.begin_poll() {
                        Some(ticket) => {
                            channels.publish_status(&tracker);
                            pending = Some((ticket, feed.poll(ticket.since)));
                        }
                        None => {
                            tracing::debug!("Previous poll still in flight, dropping tick");
                        }
                    }
                }
            }
        }

        drop(pending);
        tracker.cancel();
        channels.publish_status(&tracker);
        Ok(())
    }
}

impl<F, L> ChangePoller<F, L>
where
    F: ChangeFeed + 'static,
    L: FingerprintLookup + Send + Sync + 'static,
{
    /// Run the poller on its own task.
    pub fn spawn(self) -> PollerHandle {
        let (shutdown_tx, shutdown_rx) = broadcast::channel(1);
        let subscription = self.subscribe();
        let task = tokio::spawn(self.run(shutdown_rx));
        PollerHandle {
            shutdown: shutdown_tx,
            task: Some(task),
            subscription,
        }
    }
}

/// Owns a spawned poller. Dropping the handle stops the poller.
pub struct PollerHandle {
    shutdown: broadcast::Sender<()>,
    task: Option<JoinHandle<Result<()>>>,
    subscription: ChangeSubscription,
}

impl PollerHandle {
    pub fn subscribe(&self) -> ChangeSubscription {
        self.subscription.clone()
    }

    /// Signal shutdown and wait for the poller task to finish.
    pub async fn stop(mut self) -> Result<()> {
        let _ = self.shutdown.send(());
        match self.task.take() {
            Some(task) => task.await.context("Poller task failed")?,
            None => Ok(()),
        }
    }
}

impl Drop for PollerHandle {
    fn drop(&mut self) {
        let _ = self.shutdown.send(());
    }
}

async fn wait_for(pending: &mut PendingPoll<'_>) -> (PollTicket, Result<ChangeBatch, FeedError>) {
    match pending {
        Some((ticket, request)) => {
            let result = request.await;
            (*ticket, result)
        }
        None => std::future::pending().await,
    }
}

async fn finish_cycle(
    tracker: &ChangeTracker,
    channels: &Channels,
    store: &mut Option<CheckpointStore>,
    outcome: &CycleOutcome,
) {
    match outcome {
        CycleOutcome::Published {
            received,
            forwarded,
        } => {
            tracing::info!(
                "{} of {} changes are new (checkpoint {})",
                forwarded,
                received,
                tracker.checkpoint()
            );
            for change in tracker.published().iter() {
                tracing::debug!(
                    "  {} {} lastModified={}",
                    change.change_type,
                    change.asset_id,
                    change.last_modified
                );
            }
        }
        CycleOutcome::Unchanged { received } => {
            tracing::debug!(
                "No unknown changes ({} received, checkpoint {})",
                received,
                tracker.checkpoint()
            );
        }
        CycleOutcome::Failed(e) => {
            tracing::warn!("Change poll failed, retrying next interval: {}", e);
        }
        CycleOutcome::Skipped | CycleOutcome::Stale => {}
    }

    channels.announce(tracker, outcome);

    if let Some(store) = store.as_mut() {
        if let Err(e) = store.record(tracker.checkpoint()).await {
            tracing::warn!("Failed to persist checkpoint: {:?}", e);
        }
    }
}
