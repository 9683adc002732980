// src/engine/datastore.rs

//! Persistence boundary for finished builds and build sets.

use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use serde::Serialize;

use crate::errors::DatastoreError;
use crate::task::{BuildSetStatus, BuildSetTask, BuildStatus, BuildTask};
use crate::types::{ConfigId, SetId, TaskId};

/// Final record of one task.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct BuildRecord {
    pub task_id: TaskId,
    pub config_id: ConfigId,
    pub name: String,
    pub set_id: Option<SetId>,
    pub status: BuildStatus,
    pub forced: bool,
    pub submit_time: DateTime<Utc>,
    pub start_time: Option<DateTime<Utc>>,
    pub end_time: Option<DateTime<Utc>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
}

impl BuildRecord {
    pub fn from_task(task: &BuildTask) -> Self {
        let times = task.times();
        Self {
            task_id: task.id(),
            config_id: task.config_id().to_string(),
            name: task.name().to_string(),
            set_id: task.set_id(),
            status: task.status(),
            forced: task.is_forced(),
            submit_time: times.submit_time,
            start_time: times.start_time,
            end_time: times.end_time,
            message: task.message(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SetMemberRecord {
    pub task_id: TaskId,
    pub config_id: ConfigId,
    pub status: BuildStatus,
}

/// Final record of one build set.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct BuildSetRecord {
    pub set_id: SetId,
    pub status: BuildSetStatus,
    pub created_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
    pub members: Vec<SetMemberRecord>,
}

impl BuildSetRecord {
    pub fn from_set(set: &BuildSetTask) -> Self {
        Self {
            set_id: set.id(),
            status: set.aggregate_status(),
            created_at: set.created_at(),
            finished_at: Utc::now(),
            members: set
                .members()
                .iter()
                .map(|t| SetMemberRecord {
                    task_id: t.id(),
                    config_id: t.config_id().to_string(),
                    status: t.status(),
                })
                .collect(),
        }
    }

    /// Members that finished in `status`.
    pub fn count(&self, status: BuildStatus) -> usize {
        self.members.iter().filter(|m| m.status == status).count()
    }
}

/// Acknowledgement returned by the datastore.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PersistedRecord {
    pub record_id: u64,
    pub stored_at: DateTime<Utc>,
}

/// Accepts finished records. Called from whichever thread finished the task.
pub trait Datastore: Send + Sync + 'static {
    fn store_completed_build(&self, record: &BuildRecord)
    -> Result<PersistedRecord, DatastoreError>;

    fn store_completed_set(&self, record: &BuildSetRecord)
    -> Result<PersistedRecord, DatastoreError>;
}

impl<S: Datastore + ?Sized> Datastore for Arc<S> {
    fn store_completed_build(
        &self,
        record: &BuildRecord,
    ) -> Result<PersistedRecord, DatastoreError> {
        (**self).store_completed_build(record)
    }

    fn store_completed_set(
        &self,
        record: &BuildSetRecord,
    ) -> Result<PersistedRecord, DatastoreError> {
        (**self).store_completed_set(record)
    }
}

/// Datastore keeping every record in memory.
#[derive(Debug)]
pub struct InMemoryDatastore {
    builds: Mutex<Vec<BuildRecord>>,
    sets: Mutex<Vec<BuildSetRecord>>,
    next_id: AtomicU64,
}

impl InMemoryDatastore {
    pub fn new() -> Self {
        Self {
            builds: Mutex::new(Vec::new()),
            sets: Mutex::new(Vec::new()),
            next_id: AtomicU64::new(1),
        }
    }

    pub fn builds(&self) -> Vec<BuildRecord> {
        self.builds.lock().clone()
    }

    pub fn sets(&self) -> Vec<BuildSetRecord> {
        self.sets.lock().clone()
    }

    /// Stored record of a task, if any.
    pub fn build(&self, task: TaskId) -> Option<BuildRecord> {
        self.builds.lock().iter().find(|r| r.task_id == task).cloned()
    }

    pub fn set(&self, set: SetId) -> Option<BuildSetRecord> {
        self.sets.lock().iter().find(|r| r.set_id == set).cloned()
    }

    fn ack(&self) -> PersistedRecord {
        PersistedRecord {
            record_id: self.next_id.fetch_add(1, Ordering::Relaxed),
            stored_at: Utc::now(),
        }
    }
}

impl Default for InMemoryDatastore {
    fn default() -> Self {
        Self::new()
    }
}

impl Datastore for InMemoryDatastore {
    fn store_completed_build(
        &self,
        record: &BuildRecord,
    ) -> Result<PersistedRecord, DatastoreError> {
        self.builds.lock().push(record.clone());
        Ok(self.ack())
    }

    fn store_completed_set(
        &self,
        record: &BuildSetRecord,
    ) -> Result<PersistedRecord, DatastoreError> {
        self.sets.lock().push(record.clone());
        Ok(self.ack())
    }
}
