// src/types.rs

//! Identifier types shared across the engine.

use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};

use serde::Serialize;

/// Identifier of a build configuration, as written in the build file.
pub type ConfigId = String;

/// Identifier of a [`crate::task::BuildTask`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
#[serde(transparent)]
pub struct TaskId(pub u64);

/// Identifier of a [`crate::task::BuildSetTask`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
#[serde(transparent)]
pub struct SetId(pub u64);

impl fmt::Display for TaskId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

impl fmt::Display for SetId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "set#{}", self.0)
    }
}

/// Monotonic id allocator shared by the graph builder and the coordinator.
///
/// Task and set ids come from separate counters and are never reused.
#[derive(Debug)]
pub struct IdSource {
    next_task: AtomicU64,
    next_set: AtomicU64,
}

impl IdSource {
    pub fn new() -> Self {
        Self {
            next_task: AtomicU64::new(1),
            next_set: AtomicU64::new(1),
        }
    }

    pub fn next_task_id(&self) -> TaskId {
        TaskId(self.next_task.fetch_add(1, Ordering::Relaxed))
    }

    pub fn next_set_id(&self) -> SetId {
        SetId(self.next_set.fetch_add(1, Ordering::Relaxed))
    }
}

impl Default for IdSource {
    fn default() -> Self {
        Self::new()
    }
}
