use std::collections::HashMap;
use std::sync::Arc;

use parking_lot::Mutex;

use buildcoord::errors::DriverError;
use buildcoord::exec::{BuildCompletion, BuildDriver, BuildOutcome, BuildRequest};
use buildcoord::types::TaskId;

/// Driver that finishes every build synchronously inside `start_build`.
///
/// Outcomes default to success; individual configurations can be scripted.
#[derive(Debug, Default)]
pub struct InstantDriver {
    outcomes: Mutex<HashMap<String, Result<BuildOutcome, String>>>,
    started: Mutex<Vec<BuildRequest>>,
}

impl InstantDriver {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn fail(&self, config: &str) {
        self.outcomes
            .lock()
            .insert(config.to_string(), Ok(BuildOutcome::failed("scripted failure")));
    }

    pub fn reject(&self, config: &str) {
        self.outcomes
            .lock()
            .insert(config.to_string(), Ok(BuildOutcome::rejected("scripted rejection")));
    }

    /// Report a driver error instead of an outcome.
    pub fn error(&self, config: &str, message: &str) {
        self.outcomes
            .lock()
            .insert(config.to_string(), Err(message.to_string()));
    }

    /// Configurations started so far, in start order.
    pub fn started(&self) -> Vec<String> {
        self.started
            .lock()
            .iter()
            .map(|r| r.config_id.clone())
            .collect()
    }

    pub fn requests(&self) -> Vec<BuildRequest> {
        self.started.lock().clone()
    }
}

impl BuildDriver for InstantDriver {
    fn start_build(&self, request: BuildRequest, completion: BuildCompletion) {
        let outcome = self
            .outcomes
            .lock()
            .get(&request.config_id)
            .cloned()
            .unwrap_or(Ok(BuildOutcome::Success));
        self.started.lock().push(request);

        completion.finish(outcome.map_err(DriverError::Failed));
    }

    fn name(&self) -> &str {
        "instant"
    }
}

/// Driver that only records builds; the test finishes them explicitly.
#[derive(Debug, Default)]
pub struct ManualDriver {
    pending: Mutex<Vec<(BuildRequest, BuildCompletion)>>,
    started: Mutex<Vec<BuildRequest>>,
}

impl ManualDriver {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    /// Configurations started so far, in start order.
    pub fn started(&self) -> Vec<String> {
        self.started
            .lock()
            .iter()
            .map(|r| r.config_id.clone())
            .collect()
    }

    /// Configurations currently building.
    pub fn pending(&self) -> Vec<String> {
        self.pending
            .lock()
            .iter()
            .map(|(r, _)| r.config_id.clone())
            .collect()
    }

    pub fn pending_task(&self, config: &str) -> Option<TaskId> {
        self.pending
            .lock()
            .iter()
            .find(|(r, _)| r.config_id == config)
            .map(|(r, _)| r.task_id)
    }

    /// Take the completion of a pending build without finishing it.
    pub fn take(&self, config: &str) -> Option<BuildCompletion> {
        let mut pending = self.pending.lock();
        let idx = pending.iter().position(|(r, _)| r.config_id == config)?;
        Some(pending.remove(idx).1)
    }

    /// Finish a pending build. Returns `false` if it was not pending.
    pub fn release(&self, config: &str, result: Result<BuildOutcome, DriverError>) -> bool {
        // The lock must be released before finishing: completion may start
        // further builds on this driver.
        let completion = self.take(config);
        match completion {
            Some(completion) => {
                completion.finish(result);
                true
            }
            None => false,
        }
    }

    pub fn succeed(&self, config: &str) -> bool {
        self.release(config, Ok(BuildOutcome::Success))
    }

    pub fn fail(&self, config: &str) -> bool {
        self.release(config, Ok(BuildOutcome::failed("manual failure")))
    }
}

impl BuildDriver for ManualDriver {
    fn start_build(&self, request: BuildRequest, completion: BuildCompletion) {
        self.started.lock().push(request.clone());
        self.pending.lock().push((request, completion));
    }

    fn name(&self) -> &str {
        "manual"
    }
}
