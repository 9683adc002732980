// src/monitor/mod.rs

//! Generic completion monitor.
//!
//! [`CompletionMonitor`] polls an arbitrary condition until it returns
//! `true`, returns an error, or runs out of time, and reports the outcome
//! exactly once. It knows nothing about builds; drivers use it to wait on
//! external systems.
//!
//! - [`config`] holds pool and watchdog settings.
//! - [`registry`] decides each poll's single outcome.
//! - [`handle`] exposes that outcome as a future plus a canceller.
//! - `poller` and `watchdog` are the two loops feeding the registry.

pub mod config;
pub mod handle;
pub mod registry;

mod poller;
mod watchdog;

use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;
use tokio::runtime::Runtime;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

use crate::errors::MonitorError;

pub use config::{DEFAULT_POOL_SIZE, DEFAULT_WATCHDOG_INTERVAL_MS, MonitorConfig};
pub use handle::{MonitorCanceller, MonitorHandle};
pub use registry::PollId;

use registry::PollRegistry;
use watchdog::Watchdog;

struct ActiveRuntime {
    runtime: Runtime,
    shutdown: CancellationToken,
}

/// Polls conditions on a dedicated, bounded runtime.
///
/// The monitor owns a multi-threaded tokio runtime sized by
/// [`MonitorConfig::pool_size`]: poll loops and the watchdog run on its
/// workers, condition calls run on its blocking pool. [`start`] creates that
/// runtime and [`stop`] releases it; registrations are refused while the
/// monitor is stopped.
///
/// [`start`]: CompletionMonitor::start
/// [`stop`]: CompletionMonitor::stop
pub struct CompletionMonitor {
    config: MonitorConfig,
    registry: Arc<PollRegistry>,
    state: Mutex<Option<ActiveRuntime>>,
}

impl fmt::Debug for CompletionMonitor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CompletionMonitor")
            .field("config", &self.config)
            .field("running", &self.is_running())
            .field("active_polls", &self.active_polls())
            .finish()
    }
}

impl CompletionMonitor {
    pub fn new(config: MonitorConfig) -> Self {
        Self {
            config,
            registry: Arc::new(PollRegistry::new()),
            state: Mutex::new(None),
        }
    }

    /// Create and start a monitor in one go.
    pub fn started(config: MonitorConfig) -> Result<Self, MonitorError> {
        let monitor = Self::new(config);
        monitor.start()?;
        Ok(monitor)
    }

    pub fn config(&self) -> MonitorConfig {
        self.config
    }

    /// Start the worker pool and the watchdog. Calling it on a running
    /// monitor does nothing.
    pub fn start(&self) -> Result<(), MonitorError> {
        let mut state = self.state.lock();
        if state.is_some() {
            debug!("completion monitor already running");
            return Ok(());
        }

        let runtime = tokio::runtime::Builder::new_multi_thread()
            .worker_threads(self.config.pool_size.max(1))
            .max_blocking_threads(self.config.pool_size.max(1))
            .thread_name("buildcoord-monitor")
            .enable_time()
            .build()?;

        let shutdown = CancellationToken::new();
        let watchdog = Watchdog::new(Arc::clone(&self.registry), self.config.watchdog_interval);
        runtime.spawn(watchdog.run(shutdown.clone()));

        info!(
            pool_size = self.config.pool_size,
            watchdog_interval_ms = self.config.watchdog_interval.as_millis() as u64,
            "completion monitor started"
        );

        *state = Some(ActiveRuntime { runtime, shutdown });
        Ok(())
    }

    /// Stop the watchdog, discard every pending registration and release the
    /// worker pool.
    ///
    /// Pending handles resolve to [`MonitorError::Cancelled`]; callbacks of
    /// pending registrations never fire. Condition calls already blocked on
    /// the pool are abandoned. Safe to call from async code and more than
    /// once.
    pub fn stop(&self) {
        let Some(active) = self.state.lock().take() else {
            return;
        };

        active.shutdown.cancel();
        let discarded = self.registry.drain();
        active.runtime.shutdown_background();

        info!(discarded, "completion monitor stopped");
    }

    pub fn is_running(&self) -> bool {
        self.state.lock().is_some()
    }

    /// Number of registrations still waiting for an outcome.
    pub fn active_polls(&self) -> usize {
        self.registry.len()
    }

    /// Register `condition` and return a future of its outcome.
    ///
    /// The condition is invoked right away and then every `poll_interval`
    /// until it returns `true` (`Ok(())`), returns an error
    /// ([`MonitorError::Condition`]) or panics, or `timeout` elapses
    /// ([`MonitorError::Timeout`]). Returns immediately; never blocks on the
    /// condition.
    pub fn monitor<F>(
        &self,
        condition: F,
        poll_interval: Duration,
        timeout: Duration,
    ) -> Result<MonitorHandle, MonitorError>
    where
        F: Fn() -> anyhow::Result<bool> + Send + Sync + 'static,
    {
        if poll_interval.is_zero() {
            return Err(MonitorError::InvalidInterval);
        }

        let state = self.state.lock();
        let Some(active) = state.as_ref() else {
            return Err(MonitorError::NotRunning);
        };

        let (poll, rx) =
            self.registry
                .register(poll_interval, timeout, active.shutdown.child_token());

        active.runtime.spawn(poller::run_poll(
            Arc::clone(&self.registry),
            Arc::clone(&poll),
            Arc::new(condition),
        ));

        let canceller = MonitorCanceller::new(poll.id, Arc::clone(&self.registry));
        Ok(MonitorHandle::new(canceller, poll, rx))
    }

    /// Callback form of [`Self::monitor`].
    ///
    /// `on_outcome` runs exactly once on a monitor thread with the outcome,
    /// unless the registration is cancelled or the monitor stops first, in
    /// which case it never runs.
    pub fn monitor_with_callback<F, C>(
        &self,
        condition: F,
        poll_interval: Duration,
        timeout: Duration,
        on_outcome: C,
    ) -> Result<MonitorCanceller, MonitorError>
    where
        F: Fn() -> anyhow::Result<bool> + Send + Sync + 'static,
        C: FnOnce(Result<(), MonitorError>) + Send + 'static,
    {
        let state = self.state.lock();
        let Some(active) = state.as_ref() else {
            return Err(MonitorError::NotRunning);
        };
        let runtime = active.runtime.handle().clone();
        drop(state);

        let handle = self.monitor(condition, poll_interval, timeout)?;
        let canceller = handle.canceller();
        let id = handle.id();

        runtime.spawn(async move {
            match handle.await {
                Err(MonitorError::Cancelled) => {
                    debug!(poll_id = %id, "registration cancelled; callback suppressed");
                }
                outcome => on_outcome(outcome),
            }
        });

        Ok(canceller)
    }

    /// Like [`Self::monitor_with_callback`] with separate success and error
    /// callbacks. At most one of them runs.
    pub fn monitor_with_callbacks<F, S, E>(
        &self,
        condition: F,
        poll_interval: Duration,
        timeout: Duration,
        on_complete: S,
        on_error: E,
    ) -> Result<MonitorCanceller, MonitorError>
    where
        F: Fn() -> anyhow::Result<bool> + Send + Sync + 'static,
        S: FnOnce() + Send + 'static,
        E: FnOnce(MonitorError) + Send + 'static,
    {
        self.monitor_with_callback(condition, poll_interval, timeout, move |outcome| {
            match outcome {
                Ok(()) => on_complete(),
                Err(err) => on_error(err),
            }
        })
    }
}

impl Default for CompletionMonitor {
    fn default() -> Self {
        Self::new(MonitorConfig::default())
    }
}

impl Drop for CompletionMonitor {
    fn drop(&mut self) {
        self.stop();
    }
}
