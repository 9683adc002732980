// src/task/set.rs

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU8, Ordering};

use chrono::{DateTime, Utc};

use crate::task::{BuildSetStatus, BuildTask};
use crate::types::{SetId, TaskId};

/// A batch of tasks submitted together, with a rolled-up status.
///
/// The aggregate is written only by [`crate::task::SetAggregator`].
#[derive(Debug)]
pub struct BuildSetTask {
    id: SetId,
    members: Vec<Arc<BuildTask>>,
    aggregate: AtomicU8,
    started: AtomicBool,
    created_at: DateTime<Utc>,
}

impl BuildSetTask {
    pub fn new(id: SetId, members: Vec<Arc<BuildTask>>) -> Self {
        Self {
            id,
            members,
            aggregate: AtomicU8::new(BuildSetStatus::New as u8),
            started: AtomicBool::new(false),
            created_at: Utc::now(),
        }
    }

    pub fn id(&self) -> SetId {
        self.id
    }

    pub fn members(&self) -> &[Arc<BuildTask>] {
        &self.members
    }

    pub fn member_task_ids(&self) -> Vec<TaskId> {
        self.members.iter().map(|t| t.id()).collect()
    }

    pub fn contains(&self, task: TaskId) -> bool {
        self.members.iter().any(|t| t.id() == task)
    }

    pub fn aggregate_status(&self) -> BuildSetStatus {
        BuildSetStatus::from_u8(self.aggregate.load(Ordering::Acquire))
            .unwrap_or(BuildSetStatus::New)
    }

    pub fn created_at(&self) -> DateTime<Utc> {
        self.created_at
    }

    /// Whether the scheduler has started resolving this set's members.
    pub fn is_started(&self) -> bool {
        self.started.load(Ordering::Acquire)
    }

    /// Returns `true` for the first caller only.
    pub(crate) fn mark_started(&self) -> bool {
        !self.started.swap(true, Ordering::AcqRel)
    }

    pub(crate) fn store_aggregate(&self, status: BuildSetStatus) {
        self.aggregate.store(status as u8, Ordering::Release);
    }
}
