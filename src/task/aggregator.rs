// src/task/aggregator.rs

//! Aggregate status rollup for build sets.

use std::sync::Arc;

use chrono::Utc;
use parking_lot::Mutex;
use tracing::{debug, warn};

use crate::notify::{BuildSetStatusChangedEvent, StatusChangeEvent};
use crate::task::{BuildSetStatus, BuildSetTask, BuildStatus};

/// Compute a set's aggregate from its members' statuses.
///
/// - `Done` iff every member is terminal (an empty set is `Done`).
/// - `Building` if any member is enqueued or building.
/// - `WaitingForDependencies` if any member waits on a dependency.
/// - `New` otherwise.
pub fn compute_aggregate<I>(statuses: I) -> BuildSetStatus
where
    I: IntoIterator<Item = BuildStatus>,
{
    let mut all_terminal = true;
    let mut building = false;
    let mut waiting = false;

    for status in statuses {
        match status {
            s if s.is_terminal() => {}
            BuildStatus::Enqueued | BuildStatus::Building => {
                all_terminal = false;
                building = true;
            }
            BuildStatus::WaitingForDependencies => {
                all_terminal = false;
                waiting = true;
            }
            _ => all_terminal = false,
        }
    }

    if all_terminal {
        BuildSetStatus::Done
    } else if building {
        BuildSetStatus::Building
    } else if waiting {
        BuildSetStatus::WaitingForDependencies
    } else {
        BuildSetStatus::New
    }
}

/// Observes one set and re-evaluates its aggregate on every member
/// transition.
///
/// The aggregate is always recomputed from a fresh snapshot of all member
/// statuses, never from the triggering event, so arbitrary interleavings of
/// member transitions converge on the same value. An event is returned only
/// when the value differs from the last one emitted.
#[derive(Debug)]
pub struct SetAggregator {
    set: Arc<BuildSetTask>,
    last_emitted: Mutex<BuildSetStatus>,
}

impl SetAggregator {
    pub fn new(set: Arc<BuildSetTask>) -> Self {
        let initial = set.aggregate_status();
        Self {
            set,
            last_emitted: Mutex::new(initial),
        }
    }

    pub fn set(&self) -> &Arc<BuildSetTask> {
        &self.set
    }

    pub fn status(&self) -> BuildSetStatus {
        *self.last_emitted.lock()
    }

    pub fn on_member_transition(
        &self,
        event: &StatusChangeEvent,
    ) -> Option<BuildSetStatusChangedEvent> {
        if event.set_id != Some(self.set.id()) || !self.set.contains(event.task_id) {
            warn!(
                set_id = %self.set.id(),
                task_id = %event.task_id,
                "transition of a task outside this set; aggregate left unchanged"
            );
            return None;
        }

        let mut last = self.last_emitted.lock();
        let computed = compute_aggregate(self.set.members().iter().map(|t| t.status()));

        if computed == *last {
            return None;
        }

        let old = *last;
        *last = computed;
        self.set.store_aggregate(computed);

        debug!(
            set_id = %self.set.id(),
            from = %old,
            to = %computed,
            trigger = %event.task_id,
            "build set aggregate changed"
        );

        Some(BuildSetStatusChangedEvent {
            set_id: self.set.id(),
            old_status: old,
            new_status: computed,
            timestamp: Utc::now(),
        })
    }
}
