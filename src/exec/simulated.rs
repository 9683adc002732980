// src/exec/simulated.rs

//! Timer-driven fake builds for dry runs and demos.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};

use parking_lot::Mutex;
use serde::Deserialize;
use tracing::{debug, info, warn};

use crate::errors::DriverError;
use crate::exec::{BuildCompletion, BuildDriver, BuildOutcome, BuildRequest};
use crate::monitor::CompletionMonitor;
use crate::types::ConfigId;

/// How often a simulated build checks whether its time is up.
pub const SIMULATED_POLL_INTERVAL_MS: u64 = 20;

/// Extra time on top of the simulated duration before the monitor gives up.
pub const SIMULATED_TIMEOUT_GRACE_MS: u64 = 1_000;

/// Outcome a simulated build reports once its duration has elapsed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SimulatedOutcome {
    #[default]
    Success,
    Failure,
    /// The driver itself fails.
    Error,
    Reject,
}

/// Duration and outcome of one simulated build.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SimulatedBuild {
    pub duration: Duration,
    pub outcome: SimulatedOutcome,
}

impl Default for SimulatedBuild {
    fn default() -> Self {
        Self {
            duration: Duration::from_millis(100),
            outcome: SimulatedOutcome::Success,
        }
    }
}

/// Driver that "builds" by waiting on a [`CompletionMonitor`] until a
/// per-configuration duration has elapsed.
#[derive(Debug)]
pub struct SimulatedDriver {
    monitor: Arc<CompletionMonitor>,
    builds: HashMap<ConfigId, SimulatedBuild>,
    fallback: SimulatedBuild,
}

impl SimulatedDriver {
    pub fn new(monitor: Arc<CompletionMonitor>) -> Self {
        Self {
            monitor,
            builds: HashMap::new(),
            fallback: SimulatedBuild::default(),
        }
    }

    pub fn with_build(mut self, config: impl Into<ConfigId>, build: SimulatedBuild) -> Self {
        self.builds.insert(config.into(), build);
        self
    }

    pub fn with_builds(mut self, builds: HashMap<ConfigId, SimulatedBuild>) -> Self {
        self.builds.extend(builds);
        self
    }

    /// Used for configurations without an explicit entry.
    pub fn with_fallback(mut self, build: SimulatedBuild) -> Self {
        self.fallback = build;
        self
    }

    fn plan_for(&self, config: &str) -> SimulatedBuild {
        self.builds.get(config).copied().unwrap_or(self.fallback)
    }
}

fn outcome_result(outcome: SimulatedOutcome, config: &str) -> Result<BuildOutcome, DriverError> {
    match outcome {
        SimulatedOutcome::Success => Ok(BuildOutcome::Success),
        SimulatedOutcome::Failure => Ok(BuildOutcome::failed(format!(
            "simulated build of '{config}' failed"
        ))),
        SimulatedOutcome::Reject => Ok(BuildOutcome::rejected(format!(
            "simulated build of '{config}' rejected"
        ))),
        SimulatedOutcome::Error => Err(DriverError::Failed(format!(
            "simulated driver error while building '{config}'"
        ))),
    }
}

impl BuildDriver for SimulatedDriver {
    fn start_build(&self, request: BuildRequest, completion: BuildCompletion) {
        let plan = self.plan_for(&request.config_id);
        info!(
            task_id = %request.task_id,
            config = %request.config_id,
            duration_ms = plan.duration.as_millis() as u64,
            outcome = ?plan.outcome,
            "starting simulated build"
        );

        // Shared so a refused registration can still report its own error.
        let slot = Arc::new(Mutex::new(Some(completion)));
        let callback_slot = Arc::clone(&slot);
        let config = request.config_id.clone();

        let started = Instant::now();
        let duration = plan.duration;
        let condition = move || Ok(started.elapsed() >= duration);

        let registered = self.monitor.monitor_with_callback(
            condition,
            Duration::from_millis(SIMULATED_POLL_INTERVAL_MS),
            plan.duration + Duration::from_millis(SIMULATED_TIMEOUT_GRACE_MS),
            move |outcome| {
                let Some(completion) = callback_slot.lock().take() else {
                    return;
                };
                debug!(task_id = %completion.task_id(), config = %config, "simulated build finished");
                match outcome {
                    Ok(()) => completion.finish(outcome_result(plan.outcome, &config)),
                    Err(err) => completion.finish(Err(DriverError::Monitor(err))),
                }
            },
        );

        if let Err(err) = registered {
            warn!(task_id = %request.task_id, error = %err, "could not schedule simulated build");
            let pending = slot.lock().take();
            if let Some(completion) = pending {
                completion.finish(Err(DriverError::Monitor(err)));
            }
        }
    }

    fn name(&self) -> &str {
        "simulated"
    }
}
