// src/errors.rs

//! Crate-wide error types.
//!
//! Each concern owns a small `thiserror` enum; [`BuildcoordError`] collects
//! them for the coordinator and the binary.

use std::time::Duration;

use thiserror::Error;

use crate::task::BuildStatus;
use crate::types::{ConfigId, SetId, TaskId};

/// Errors raised while turning configuration nodes into a task graph.
///
/// Any of these rejects the whole batch; no task is created.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum GraphError {
    #[error("cycle detected between build configurations: {}", members.join(" -> "))]
    CycleDetected { members: Vec<ConfigId> },

    #[error("build configuration '{config}' depends on unknown configuration '{dependency}'")]
    UnsatisfiableDependency {
        config: ConfigId,
        dependency: ConfigId,
    },

    #[error("build configuration '{0}' appears more than once in the batch")]
    DuplicateConfig(ConfigId),

    #[error("build configuration '{config}' is already building as task {task}")]
    AlreadyBuilding { config: ConfigId, task: TaskId },

    #[error("no build configurations were submitted")]
    EmptyBatch,
}

/// A status change the state machine refused.
#[derive(Error, Debug, Clone, Copy, PartialEq, Eq)]
#[error("invalid transition for task {task}: {from} -> {to}")]
pub struct InvalidTransition {
    pub task: TaskId,
    pub from: BuildStatus,
    pub to: BuildStatus,
}

/// Outcome errors of a [`crate::monitor::CompletionMonitor`] registration.
#[derive(Error, Debug)]
pub enum MonitorError {
    #[error("condition not met within {timeout:?} ({polls} polls)")]
    Timeout { timeout: Duration, polls: usize },

    #[error("condition failed: {0}")]
    Condition(anyhow::Error),

    #[error("condition panicked: {0}")]
    ConditionPanicked(String),

    #[error("monitor registration was cancelled")]
    Cancelled,

    #[error("completion monitor is not running")]
    NotRunning,

    #[error("poll interval must be greater than zero")]
    InvalidInterval,

    #[error("failed to start monitor runtime: {0}")]
    Runtime(#[from] std::io::Error),
}

impl MonitorError {
    pub fn is_timeout(&self) -> bool {
        matches!(self, MonitorError::Timeout { .. })
    }
}

/// Failure reported by a build driver instead of a build outcome.
#[derive(Error, Debug)]
pub enum DriverError {
    #[error("driver failed: {0}")]
    Failed(String),

    #[error("driver unavailable: {0}")]
    Unavailable(String),

    #[error("driver dropped the completion for task {0} without reporting")]
    Abandoned(TaskId),

    #[error(transparent)]
    Monitor(#[from] MonitorError),
}

/// Failure of the external datastore collaborator.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("datastore error: {0}")]
pub struct DatastoreError(pub String);

/// A subscriber failed while handling an event.
#[derive(Error, Debug)]
pub enum ListenerError {
    #[error("listener rejected event: {0}")]
    Rejected(String),

    #[error("transport write failed: {0}")]
    Io(#[from] std::io::Error),

    #[error("event serialization failed: {0}")]
    Serialize(#[from] serde_json::Error),
}

#[derive(Error, Debug)]
pub enum BuildcoordError {
    #[error("Configuration error: {0}")]
    ConfigError(String),

    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),

    #[error("TOML parsing error: {0}")]
    TomlError(#[from] toml::de::Error),

    #[error(transparent)]
    Graph(#[from] GraphError),

    #[error(transparent)]
    Transition(#[from] InvalidTransition),

    #[error(transparent)]
    Monitor(#[from] MonitorError),

    #[error("Task not found: {0}")]
    TaskNotFound(TaskId),

    #[error("Build set not found: {0}")]
    SetNotFound(SetId),

    #[error("No build slot free for task {0}")]
    NoBuildSlot(TaskId),

    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

pub use anyhow::Error;
pub type Result<T> = std::result::Result<T, BuildcoordError>;
