// src/monitor/registry.rs

//! Registry of running polls.
//!
//! Removal from the registry is the single point deciding a poll's outcome:
//! whoever removes the entry first (the poll loop, the watchdog, an explicit
//! cancel, or shutdown) owns the result sender. Everyone else finds nothing
//! to remove and does nothing.

use std::fmt;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::time::Duration;

use dashmap::DashMap;
use parking_lot::Mutex;
use tokio::sync::oneshot;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::trace;

use crate::errors::MonitorError;

/// Final result of one registration.
pub type Outcome = Result<(), MonitorError>;

/// Identifier of one registration with a [`super::CompletionMonitor`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct PollId(pub u64);

impl fmt::Display for PollId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "poll#{}", self.0)
    }
}

/// One registered condition.
pub(crate) struct RunningPoll {
    pub(crate) id: PollId,
    pub(crate) poll_interval: Duration,
    pub(crate) timeout: Duration,
    pub(crate) deadline: Instant,
    /// Stops the poll loop. Cancelled as soon as the entry leaves the registry.
    pub(crate) cancel: CancellationToken,
    sender: Mutex<Option<oneshot::Sender<Outcome>>>,
    polls: AtomicUsize,
}

impl RunningPoll {
    pub(crate) fn poll_count(&self) -> usize {
        self.polls.load(Ordering::Acquire)
    }

    /// Count one condition invocation and return the new total.
    pub(crate) fn record_poll(&self) -> usize {
        self.polls.fetch_add(1, Ordering::AcqRel) + 1
    }

    pub(crate) fn timeout_error(&self) -> MonitorError {
        MonitorError::Timeout {
            timeout: self.timeout,
            polls: self.poll_count(),
        }
    }

    pub(crate) fn timeout_error_outcome(&self) -> Outcome {
        Err(self.timeout_error())
    }

    pub(crate) fn is_expired(&self, now: Instant) -> bool {
        now >= self.deadline
    }
}

impl fmt::Debug for RunningPoll {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RunningPoll")
            .field("id", &self.id)
            .field("poll_interval", &self.poll_interval)
            .field("timeout", &self.timeout)
            .field("polls", &self.poll_count())
            .finish_non_exhaustive()
    }
}

#[derive(Debug)]
pub(crate) struct PollRegistry {
    polls: DashMap<PollId, Arc<RunningPoll>>,
    next_id: AtomicU64,
}

impl PollRegistry {
    pub(crate) fn new() -> Self {
        Self {
            polls: DashMap::new(),
            next_id: AtomicU64::new(1),
        }
    }

    pub(crate) fn register(
        &self,
        poll_interval: Duration,
        timeout: Duration,
        cancel: CancellationToken,
    ) -> (Arc<RunningPoll>, oneshot::Receiver<Outcome>) {
        let id = PollId(self.next_id.fetch_add(1, Ordering::Relaxed));
        let (tx, rx) = oneshot::channel();

        let poll = Arc::new(RunningPoll {
            id,
            poll_interval,
            timeout,
            deadline: Instant::now() + timeout,
            cancel,
            sender: Mutex::new(Some(tx)),
            polls: AtomicUsize::new(0),
        });

        self.polls.insert(id, Arc::clone(&poll));
        trace!(poll_id = %id, ?poll_interval, ?timeout, "poll registered");
        (poll, rx)
    }

    /// Remove `id` and deliver the outcome produced by `outcome`.
    ///
    /// Returns `false` if the poll was already resolved or cancelled.
    pub(crate) fn resolve_with<F>(&self, id: PollId, outcome: F) -> bool
    where
        F: FnOnce(&RunningPoll) -> Outcome,
    {
        let Some((_, poll)) = self.polls.remove(&id) else {
            return false;
        };
        poll.cancel.cancel();

        let outcome = outcome(&poll);
        if let Some(tx) = poll.sender.lock().take() {
            // The receiver may already be gone; nobody is waiting then.
            let _ = tx.send(outcome);
        }
        true
    }

    /// Remove `id` without delivering anything.
    ///
    /// Dropping the sender resolves any waiting handle as cancelled.
    pub(crate) fn discard(&self, id: PollId) -> bool {
        let Some((_, poll)) = self.polls.remove(&id) else {
            return false;
        };
        poll.cancel.cancel();
        poll.sender.lock().take();
        true
    }

    /// Ids of polls whose deadline is at or before `now`.
    pub(crate) fn expired(&self, now: Instant) -> Vec<PollId> {
        self.polls
            .iter()
            .filter(|entry| entry.value().is_expired(now))
            .map(|entry| *entry.key())
            .collect()
    }

    /// Discard every registered poll and return how many there were.
    pub(crate) fn drain(&self) -> usize {
        let ids: Vec<PollId> = self.polls.iter().map(|entry| *entry.key()).collect();
        ids.into_iter().filter(|id| self.discard(*id)).count()
    }

    pub(crate) fn contains(&self, id: PollId) -> bool {
        self.polls.contains_key(&id)
    }

    pub(crate) fn len(&self) -> usize {
        self.polls.len()
    }
}
