// src/monitor/handle.rs

use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;
use std::task::{Context, Poll};

use tokio::sync::oneshot;

use crate::errors::MonitorError;
use crate::monitor::registry::{Outcome, PollId, PollRegistry, RunningPoll};

/// Cancels one registration. Cheap to clone; every clone cancels the same
/// registration.
#[derive(Debug, Clone)]
pub struct MonitorCanceller {
    id: PollId,
    registry: Arc<PollRegistry>,
}

impl MonitorCanceller {
    pub(crate) fn new(id: PollId, registry: Arc<PollRegistry>) -> Self {
        Self { id, registry }
    }

    pub fn id(&self) -> PollId {
        self.id
    }

    /// Remove the registration and suppress its outcome.
    ///
    /// Returns `true` only for the call that actually cancelled it. Calling
    /// it again, or after the poll already finished, does nothing.
    pub fn cancel(&self) -> bool {
        self.registry.discard(self.id)
    }

    /// Whether the registration is still waiting for an outcome.
    pub fn is_pending(&self) -> bool {
        self.registry.contains(self.id)
    }
}

/// Future resolving to the outcome of one registration.
///
/// Resolves exactly once to `Ok(())` when the condition returned `true`, or
/// to the [`MonitorError`] that ended it. Cancellation, through this handle,
/// a [`MonitorCanceller`] or monitor shutdown, resolves to
/// [`MonitorError::Cancelled`]. Dropping the handle does not cancel the
/// registration.
#[derive(Debug)]
pub struct MonitorHandle {
    canceller: MonitorCanceller,
    poll: Arc<RunningPoll>,
    rx: oneshot::Receiver<Outcome>,
}

impl MonitorHandle {
    pub(crate) fn new(
        canceller: MonitorCanceller,
        poll: Arc<RunningPoll>,
        rx: oneshot::Receiver<Outcome>,
    ) -> Self {
        Self {
            canceller,
            poll,
            rx,
        }
    }

    pub fn id(&self) -> PollId {
        self.canceller.id()
    }

    pub fn cancel(&self) -> bool {
        self.canceller.cancel()
    }

    pub fn canceller(&self) -> MonitorCanceller {
        self.canceller.clone()
    }

    /// Number of times the condition has been invoked so far.
    pub fn poll_count(&self) -> usize {
        self.poll.poll_count()
    }

    /// Block the current thread until the outcome is known.
    ///
    /// Must not be called from within an async runtime.
    pub fn wait_blocking(self) -> Outcome {
        self.rx
            .blocking_recv()
            .unwrap_or(Err(MonitorError::Cancelled))
    }
}

impl Future for MonitorHandle {
    type Output = Outcome;

    fn poll(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        let this = self.get_mut();
        Pin::new(&mut this.rx)
            .poll(cx)
            .map(|received| received.unwrap_or(Err(MonitorError::Cancelled)))
    }
}
