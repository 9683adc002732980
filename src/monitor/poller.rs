// src/monitor/poller.rs

//! Per-registration poll loop.

use std::any::Any;
use std::sync::Arc;

use tokio::task::JoinError;
use tokio::time::{MissedTickBehavior, sleep_until};
use tracing::{debug, trace};

use crate::errors::MonitorError;
use crate::monitor::registry::{Outcome, PollRegistry, RunningPoll};

enum Step {
    Again,
    Resolve(Outcome),
    Timeout,
}

/// Invoke `condition` every `poll_interval` until it settles, the deadline
/// passes, or the poll is cancelled.
///
/// The first invocation happens immediately. Invocations run on the blocking
/// pool, one at a time, and are counted only once they actually start; a slow invocation delays the next tick rather than
/// overlapping it. While an invocation is in flight the loop still reacts to
/// cancellation and to its deadline, leaving the blocked call behind.
pub(crate) async fn run_poll<F>(registry: Arc<PollRegistry>, poll: Arc<RunningPoll>, condition: Arc<F>)
where
    F: Fn() -> anyhow::Result<bool> + Send + Sync + 'static,
{
    let mut ticker = tokio::time::interval(poll.poll_interval);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

    loop {
        tokio::select! {
            biased;

            _ = poll.cancel.cancelled() => {
                trace!(poll_id = %poll.id, "poll cancelled while idle");
                return;
            }

            _ = sleep_until(poll.deadline) => {
                resolve_timeout(&registry, &poll);
                return;
            }

            _ = ticker.tick() => {}
        }

        let cond = Arc::clone(&condition);
        let counted = Arc::clone(&poll);
        let attempt = tokio::task::spawn_blocking(move || {
            // Queued behind other blocking work past the poll's end.
            if counted.cancel.is_cancelled() {
                return Ok(false);
            }
            let count = counted.record_poll();
            trace!(poll_id = %counted.id, count, "invoking condition");
            cond()
        });

        let step = tokio::select! {
            biased;

            _ = poll.cancel.cancelled() => {
                trace!(poll_id = %poll.id, "poll cancelled during condition call");
                return;
            }

            _ = sleep_until(poll.deadline) => Step::Timeout,

            joined = attempt => classify(joined),
        };

        match step {
            Step::Again => {}
            Step::Timeout => {
                resolve_timeout(&registry, &poll);
                return;
            }
            Step::Resolve(outcome) => {
                let succeeded = outcome.is_ok();
                if registry.resolve_with(poll.id, |_| outcome) {
                    debug!(
                        poll_id = %poll.id,
                        polls = poll.poll_count(),
                        succeeded,
                        "poll resolved"
                    );
                }
                return;
            }
        }
    }
}

fn resolve_timeout(registry: &PollRegistry, poll: &RunningPoll) {
    if registry.resolve_with(poll.id, RunningPoll::timeout_error_outcome) {
        debug!(
            poll_id = %poll.id,
            polls = poll.poll_count(),
            timeout = ?poll.timeout,
            "poll timed out"
        );
    }
}

fn classify(joined: Result<anyhow::Result<bool>, JoinError>) -> Step {
    match joined {
        Ok(Ok(true)) => Step::Resolve(Ok(())),
        Ok(Ok(false)) => Step::Again,
        Ok(Err(err)) => Step::Resolve(Err(MonitorError::Condition(err))),
        Err(err) if err.is_panic() => Step::Resolve(Err(MonitorError::ConditionPanicked(
            panic_message(err.into_panic()),
        ))),
        // The runtime is shutting down underneath us.
        Err(_) => Step::Resolve(Err(MonitorError::Cancelled)),
    }
}

fn panic_message(payload: Box<dyn Any + Send>) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "non-string panic payload".to_string()
    }
}
