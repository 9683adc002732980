// src/task/build_task.rs

//! The schedulable unit: one execution of one build configuration.

use std::collections::BTreeMap;
use std::sync::atomic::{AtomicU8, Ordering};

use chrono::{DateTime, Utc};
use parking_lot::{Mutex, ReentrantMutex, ReentrantMutexGuard};

use crate::task::BuildStatus;
use crate::types::{ConfigId, SetId, TaskId};

/// Wall-clock milestones of a task.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TaskTimes {
    pub submit_time: DateTime<Utc>,
    pub start_time: Option<DateTime<Utc>>,
    pub end_time: Option<DateTime<Utc>>,
}

/// A build task.
///
/// Everything except the status, the times and the failure message is fixed
/// at construction. The status is only written through
/// [`crate::task::TaskStateMachine`]; tasks refer to each other by [`TaskId`]
/// and the dependent edges live in [`crate::dag::TaskGraph`].
#[derive(Debug)]
pub struct BuildTask {
    id: TaskId,
    config_id: ConfigId,
    name: String,
    set_id: Option<SetId>,
    forced: bool,
    /// Direct dependencies, with the configuration each one builds.
    dependencies: BTreeMap<TaskId, ConfigId>,
    /// Dependency outside the batch that is known to have failed.
    blocked_by: Option<ConfigId>,
    status: AtomicU8,
    /// Held from a status CAS until its events are published.
    transition_lock: ReentrantMutex<()>,
    times: Mutex<TaskTimes>,
    message: Mutex<Option<String>>,
}

impl BuildTask {
    pub fn new(
        id: TaskId,
        config_id: ConfigId,
        name: String,
        set_id: Option<SetId>,
        forced: bool,
        dependencies: BTreeMap<TaskId, ConfigId>,
        blocked_by: Option<ConfigId>,
    ) -> Self {
        Self {
            id,
            config_id,
            name,
            set_id,
            forced,
            dependencies,
            blocked_by,
            status: AtomicU8::new(BuildStatus::New as u8),
            transition_lock: ReentrantMutex::new(()),
            times: Mutex::new(TaskTimes {
                submit_time: Utc::now(),
                start_time: None,
                end_time: None,
            }),
            message: Mutex::new(None),
        }
    }

    pub fn id(&self) -> TaskId {
        self.id
    }

    pub fn config_id(&self) -> &str {
        &self.config_id
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn set_id(&self) -> Option<SetId> {
        self.set_id
    }

    pub fn is_forced(&self) -> bool {
        self.forced
    }

    pub fn blocked_by(&self) -> Option<&str> {
        self.blocked_by.as_deref()
    }

    /// Ids of the direct dependencies.
    pub fn dependencies(&self) -> impl Iterator<Item = TaskId> + '_ {
        self.dependencies.keys().copied()
    }

    /// Direct dependencies together with their configuration ids.
    pub fn dependency_configs(&self) -> impl Iterator<Item = (TaskId, &str)> + '_ {
        self.dependencies.iter().map(|(id, cfg)| (*id, cfg.as_str()))
    }

    #[inline]
    pub fn status(&self) -> BuildStatus {
        BuildStatus::from_u8(self.status.load(Ordering::Acquire)).unwrap_or(BuildStatus::New)
    }

    pub fn is_terminal(&self) -> bool {
        self.status().is_terminal()
    }

    pub fn times(&self) -> TaskTimes {
        *self.times.lock()
    }

    pub fn message(&self) -> Option<String> {
        self.message.lock().clone()
    }

    /// Serialises transitions of this task. Re-entrant so a listener may
    /// transition the task again from inside a publish on the same thread.
    pub(crate) fn transition_guard(&self) -> ReentrantMutexGuard<'_, ()> {
        self.transition_lock.lock()
    }

    /// Single compare-and-set on the status cell.
    pub(crate) fn compare_and_set_status(&self, from: BuildStatus, to: BuildStatus) -> bool {
        self.status
            .compare_exchange(from as u8, to as u8, Ordering::AcqRel, Ordering::Acquire)
            .is_ok()
    }

    /// Stamp milestones for a transition this caller won.
    pub(crate) fn record_transition(
        &self,
        to: BuildStatus,
        at: DateTime<Utc>,
        message: Option<String>,
    ) {
        {
            let mut times = self.times.lock();
            if to == BuildStatus::Building {
                times.start_time = Some(at);
            }
            if to.is_terminal() {
                times.end_time = Some(at);
            }
        }
        if message.is_some() {
            *self.message.lock() = message;
        }
    }
}
