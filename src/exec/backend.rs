// src/exec/backend.rs

//! Pluggable build driver abstraction.
//!
//! The coordinator never runs builds itself. It hands each task that reaches
//! `BUILDING` to a [`BuildDriver`] together with a [`BuildCompletion`], and
//! the driver reports the outcome through that completion whenever the build
//! finishes, on any thread.
//!
//! - Production drivers wrap a remote executor or a workflow engine.
//! - [`super::SimulatedDriver`] fakes builds with timers on a
//!   [`crate::monitor::CompletionMonitor`].
//! - Tests provide drivers that record requests and finish them by hand.

use std::fmt;
use std::sync::Arc;

use crate::errors::DriverError;
use crate::types::{ConfigId, SetId, TaskId};

/// What a driver needs to know to start one build.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BuildRequest {
    pub task_id: TaskId,
    pub config_id: ConfigId,
    pub name: String,
    pub set_id: Option<SetId>,
    pub forced: bool,
}

/// How a build ended, as far as the driver is concerned.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BuildOutcome {
    Success,
    Failed { reason: String },
    Rejected { reason: String },
}

impl BuildOutcome {
    pub fn failed(reason: impl Into<String>) -> Self {
        BuildOutcome::Failed {
            reason: reason.into(),
        }
    }

    pub fn rejected(reason: impl Into<String>) -> Self {
        BuildOutcome::Rejected {
            reason: reason.into(),
        }
    }
}

/// Receiver of build completions; implemented by the coordinator.
pub trait CompletionSink: Send + Sync {
    fn complete(&self, task: TaskId, result: Result<BuildOutcome, DriverError>);
}

/// One-shot completion callback for a single build.
///
/// Consumed by [`BuildCompletion::finish`]. Dropping it unfinished reports
/// [`DriverError::Abandoned`], so a task can never stay `BUILDING` because a
/// driver lost track of it.
pub struct BuildCompletion {
    task_id: TaskId,
    sink: Option<Arc<dyn CompletionSink>>,
}

impl BuildCompletion {
    pub fn new(task_id: TaskId, sink: Arc<dyn CompletionSink>) -> Self {
        Self {
            task_id,
            sink: Some(sink),
        }
    }

    pub fn task_id(&self) -> TaskId {
        self.task_id
    }

    pub fn finish(mut self, result: Result<BuildOutcome, DriverError>) {
        if let Some(sink) = self.sink.take() {
            sink.complete(self.task_id, result);
        }
    }

    pub fn success(self) {
        self.finish(Ok(BuildOutcome::Success));
    }
}

impl fmt::Debug for BuildCompletion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("BuildCompletion")
            .field("task_id", &self.task_id)
            .field("pending", &self.sink.is_some())
            .finish()
    }
}

impl Drop for BuildCompletion {
    fn drop(&mut self) {
        if let Some(sink) = self.sink.take() {
            sink.complete(self.task_id, Err(DriverError::Abandoned(self.task_id)));
        }
    }
}

/// Starts builds.
///
/// `start_build` must not block: start the work and return, then call
/// `completion.finish(..)` later. Calling `finish` synchronously from inside
/// `start_build` is allowed.
pub trait BuildDriver: Send + Sync + 'static {
    fn start_build(&self, request: BuildRequest, completion: BuildCompletion);

    /// Name used in logs.
    fn name(&self) -> &str {
        "driver"
    }
}

impl<D: BuildDriver + ?Sized> BuildDriver for Arc<D> {
    fn start_build(&self, request: BuildRequest, completion: BuildCompletion) {
        (**self).start_build(request, completion)
    }

    fn name(&self) -> &str {
        (**self).name()
    }
}
