// src/task/state_machine.rs

//! The single write path for task statuses.

use std::fmt;
use std::sync::Arc;

use chrono::Utc;
use dashmap::DashMap;
use tracing::{debug, trace};

use crate::errors::InvalidTransition;
use crate::notify::{BuildEvent, NotificationDispatcher, StatusChangeEvent};
use crate::task::{BuildStatus, BuildTask, SetAggregator};
use crate::types::SetId;

/// Governs task transitions and forwards every accepted one.
///
/// `set_status` reads the current status once, checks the transition table,
/// and performs one compare-and-set. Only the caller whose CAS succeeds gets
/// a [`StatusChangeEvent`]; everyone else gets [`InvalidTransition`] and no
/// event exists. The winner then, on its own thread:
///
/// 1. feeds the event to the owning set's [`SetAggregator`],
/// 2. publishes the task event,
/// 3. publishes the aggregate event, if the aggregate changed.
///
/// The CAS and those steps run under the task's transition lock, so
/// listeners see one task's transitions in the order they were accepted.
pub struct TaskStateMachine {
    aggregators: DashMap<SetId, Arc<SetAggregator>>,
    dispatcher: Arc<NotificationDispatcher>,
}

impl fmt::Debug for TaskStateMachine {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TaskStateMachine")
            .field("sets", &self.aggregators.len())
            .finish_non_exhaustive()
    }
}

impl TaskStateMachine {
    pub fn new(dispatcher: Arc<NotificationDispatcher>) -> Self {
        Self {
            aggregators: DashMap::new(),
            dispatcher,
        }
    }

    pub fn dispatcher(&self) -> &Arc<NotificationDispatcher> {
        &self.dispatcher
    }

    pub fn register_set(&self, aggregator: Arc<SetAggregator>) {
        let id = aggregator.set().id();
        self.aggregators.insert(id, aggregator);
    }

    /// Returns the aggregator only for the first caller.
    pub fn unregister_set(&self, id: SetId) -> Option<Arc<SetAggregator>> {
        self.aggregators.remove(&id).map(|(_, agg)| agg)
    }

    pub fn aggregator(&self, id: SetId) -> Option<Arc<SetAggregator>> {
        self.aggregators.get(&id).map(|entry| Arc::clone(entry.value()))
    }

    pub fn set_ids(&self) -> Vec<SetId> {
        self.aggregators.iter().map(|entry| *entry.key()).collect()
    }

    pub fn set_status(
        &self,
        task: &BuildTask,
        to: BuildStatus,
    ) -> Result<StatusChangeEvent, InvalidTransition> {
        self.set_status_with_message(task, to, None)
    }

    /// Like [`Self::set_status`], recording `message` on the task if the
    /// transition is accepted.
    pub fn set_status_with_message(
        &self,
        task: &BuildTask,
        to: BuildStatus,
        message: Option<String>,
    ) -> Result<StatusChangeEvent, InvalidTransition> {
        let from = task.status();
        self.compare_and_set(task, from, to, message)
    }

    /// Transition only if the task is currently in `expected`.
    pub fn compare_and_set(
        &self,
        task: &BuildTask,
        expected: BuildStatus,
        to: BuildStatus,
        message: Option<String>,
    ) -> Result<StatusChangeEvent, InvalidTransition> {
        let rejected = |from| InvalidTransition {
            task: task.id(),
            from,
            to,
        };

        if !expected.can_transition_to(to) {
            trace!(task_id = %task.id(), from = %expected, to = %to, "transition not allowed");
            return Err(rejected(expected));
        }

        let _ordered = task.transition_guard();
        if !task.compare_and_set_status(expected, to) {
            let actual = task.status();
            trace!(
                task_id = %task.id(),
                expected = %expected,
                actual = %actual,
                to = %to,
                "lost transition race"
            );
            return Err(rejected(actual));
        }

        let timestamp = Utc::now();
        task.record_transition(to, timestamp, message.clone());

        let event = StatusChangeEvent {
            task_id: task.id(),
            config_id: task.config_id().to_string(),
            set_id: task.set_id(),
            old_status: expected,
            new_status: to,
            timestamp,
            message,
        };

        debug!(
            task_id = %task.id(),
            config = task.config_id(),
            from = %expected,
            to = %to,
            "task status changed"
        );

        self.forward(&event);
        Ok(event)
    }

    fn forward(&self, event: &StatusChangeEvent) {
        let set_event = event
            .set_id
            .and_then(|id| self.aggregator(id))
            .and_then(|agg| agg.on_member_transition(event));

        self.dispatcher
            .publish(&BuildEvent::TaskStatusChanged(event.clone()));

        if let Some(set_event) = set_event {
            self.dispatcher
                .publish(&BuildEvent::SetStatusChanged(set_event));
        }
    }
}
