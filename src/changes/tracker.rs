// ABOUTME: ChangeTracker - the poller's state machine without any I/O
// ABOUTME: Owns checkpoint, published list, in-flight guard and stale-response guard

use chrono::{DateTime, Utc};
use std::fmt;
use std::sync::Arc;

use super::feed::FeedError;
use super::fingerprint::FingerprintLookup;
use super::reconciler::{advance, publish, reconcile};
use super::record::{ChangeBatch, ChangeRecord, Checkpoint};

/// Lifecycle of a poller.
///
/// `Idle -> Polling -> Reconciling -> Publishing -> Idle`, or
/// `Polling -> Failed` when the query fails. `Failed` behaves like `Idle`
/// for the next tick. `Stopped` is reached only through cancellation.
///
/// `Reconciling` and `Publishing` only exist inside
/// [`ChangeTracker::complete_poll`]; status subscribers never observe them.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PollerState {
    Idle,
    Polling,
    Reconciling,
    Publishing,
    Failed,
    Stopped,
}

impl fmt::Display for PollerState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            PollerState::Idle => "idle",
            PollerState::Polling => "polling",
            PollerState::Reconciling => "reconciling",
            PollerState::Publishing => "publishing",
            PollerState::Failed => "failed",
            PollerState::Stopped => "stopped",
        };
        f.write_str(name)
    }
}

/// Handed out when a poll starts; the result must be returned with it.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PollTicket {
    pub sequence: u64,
    pub since: Checkpoint,
}

/// What a tick ended up doing.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CycleOutcome {
    /// New changes were published to subscribers.
    Published { received: usize, forwarded: usize },
    /// The poll succeeded but every change was already known (or there were none).
    Unchanged { received: usize },
    /// The query failed; nothing was applied.
    Failed(FeedError),
    /// A poll was already outstanding, so the tick was dropped.
    Skipped,
    /// The result belonged to an outdated cycle or arrived after cancellation.
    Stale,
}

/// Snapshot exposed to subscribers after every state change.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PollStatus {
    pub state: PollerState,
    pub checkpoint: Checkpoint,
    pub cycles: u64,
    pub consecutive_failures: u32,
    pub last_error: Option<String>,
    pub last_success_at: Option<DateTime<Utc>>,
}

/// Poller state machine.
///
/// Suspension only happens between [`ChangeTracker::begin_poll`] and
/// [`ChangeTracker::complete_poll`]; everything in between those calls is the
/// caller's network fetch. At most one ticket is outstanding at a time.
#[derive(Debug)]
pub struct ChangeTracker {
    state: PollerState,
    checkpoint: Checkpoint,
    published: Arc<Vec<ChangeRecord>>,
    sequence: u64,
    in_flight: Option<u64>,
    cancelled: bool,
    cycles: u64,
    consecutive_failures: u32,
    last_error: Option<String>,
    last_success_at: Option<DateTime<Utc>>,
}

impl Default for ChangeTracker {
    fn default() -> Self {
        Self::new(Checkpoint::UNSET)
    }
}

impl ChangeTracker {
    pub fn new(checkpoint: Checkpoint) -> Self {
        Self {
            state: PollerState::Idle,
            checkpoint,
            published: Arc::new(Vec::new()),
            sequence: 0,
            in_flight: None,
            cancelled: false,
            cycles: 0,
            consecutive_failures: 0,
            last_error: None,
            last_success_at: None,
        }
    }

    /// Start a poll cycle.
    ///
    /// Returns `None` when a poll is still outstanding or the tracker was
    /// cancelled; the tick should then be dropped.
    pub fn begin_poll(&mut self) -> Option<PollTicket> {
        if self.cancelled || self.in_flight.is_some() {
            return None;
        }

        self.sequence += 1;
        self.in_flight = Some(self.sequence);
        self.transition(PollerState::Polling);

        Some(PollTicket {
            sequence: self.sequence,
            since: self.checkpoint,
        })
    }

    /// Apply the result of the poll started with `ticket`.
    ///
    /// On failure the checkpoint and published list stay untouched. Results
    /// for outdated tickets or arriving after [`ChangeTracker::cancel`] are
    /// discarded without side effects.
    pub fn complete_poll<L>(
        &mut self,
        ticket: PollTicket,
        result: Result<ChangeBatch, FeedError>,
        lookup: &L,
    ) -> CycleOutcome
    where
        L: FingerprintLookup + ?Sized,
    {
        if self.cancelled || self.in_flight != Some(ticket.sequence) {
            tracing::debug!(
                "Discarding stale poll result (cycle {}, current {})",
                ticket.sequence,
                self.sequence
            );
            return CycleOutcome::Stale;
        }

        self.in_flight = None;
        self.cycles += 1;

        let batch = match result {
            Ok(batch) => batch,
            Err(e) => {
                self.consecutive_failures += 1;
                self.last_error = Some(e.to_string());
                self.transition(PollerState::Failed);
                return CycleOutcome::Failed(e);
            }
        };

        self.transition(PollerState::Reconciling);
        let received = batch.changes.len();
        let filtered = reconcile(&batch, lookup);
        let forwarded = filtered.len();
        let next = advance(self.checkpoint, &batch);
        if next != self.checkpoint {
            tracing::debug!("Checkpoint advanced {} -> {}", self.checkpoint, next);
            self.checkpoint = next;
        }

        self.transition(PollerState::Publishing);
        self.published = publish(filtered, &self.published);

        self.consecutive_failures = 0;
        self.last_error = None;
        self.last_success_at = Some(Utc::now());
        self.transition(PollerState::Idle);

        if forwarded == 0 {
            CycleOutcome::Unchanged { received }
        } else {
            CycleOutcome::Published {
                received,
                forwarded,
            }
        }
    }

    /// Stop the tracker. Any outstanding ticket becomes stale and no further
    /// poll can begin.
    pub fn cancel(&mut self) {
        self.cancelled = true;
        self.in_flight = None;
        self.sequence += 1;
        self.transition(PollerState::Stopped);
    }

    pub fn state(&self) -> PollerState {
        self.state
    }

    pub fn checkpoint(&self) -> Checkpoint {
        self.checkpoint
    }

    pub fn published(&self) -> &Arc<Vec<ChangeRecord>> {
        &self.published
    }

    pub fn is_in_flight(&self) -> bool {
        self.in_flight.is_some()
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancelled
    }

    pub fn status(&self) -> PollStatus {
        PollStatus {
            state: self.state,
            checkpoint: self.checkpoint,
            cycles: self.cycles,
            consecutive_failures: self.consecutive_failures,
            last_error: self.last_error.clone(),
            last_success_at: self.last_success_at,
        }
    }

    fn transition(&mut self, next: PollerState) {
        tracing::trace!("Poller state {} -> {}", self.state, next);
        self.state = next;
    }
}
