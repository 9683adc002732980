// src/monitor/watchdog.rs

//! Timeout sweeps independent of the poll schedule.

use std::sync::Arc;
use std::time::Duration;

use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use crate::monitor::registry::{PollRegistry, RunningPoll};

/// Periodically times out every registered poll past its deadline.
///
/// A poll loop whose condition call hangs still notices its own deadline,
/// but the watchdog does not depend on any poll loop being scheduled at all.
#[derive(Debug)]
pub(crate) struct Watchdog {
    registry: Arc<PollRegistry>,
    interval: Duration,
}

impl Watchdog {
    pub(crate) fn new(registry: Arc<PollRegistry>, interval: Duration) -> Self {
        Self { registry, interval }
    }

    /// Runs until `shutdown` is cancelled.
    pub(crate) async fn run(self, shutdown: CancellationToken) {
        debug!(interval_ms = self.interval.as_millis() as u64, "watchdog starting");

        let mut interval = tokio::time::interval(self.interval);
        // Skip the first immediate tick
        interval.tick().await;

        loop {
            tokio::select! {
                biased;

                _ = shutdown.cancelled() => {
                    debug!("watchdog shutting down");
                    break;
                }

                _ = interval.tick() => {
                    self.sweep(Instant::now());
                }
            }
        }
    }

    /// Time out every poll expired at `now`. Returns how many it resolved.
    pub(crate) fn sweep(&self, now: Instant) -> usize {
        let mut resolved = 0;
        for id in self.registry.expired(now) {
            if self
                .registry
                .resolve_with(id, RunningPoll::timeout_error_outcome)
            {
                warn!(poll_id = %id, "watchdog timed out poll past its deadline");
                resolved += 1;
            }
        }
        resolved
    }
}
