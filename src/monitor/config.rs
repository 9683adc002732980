// src/monitor/config.rs

use std::time::Duration;

/// Default number of worker and blocking threads polling conditions.
pub const DEFAULT_POOL_SIZE: usize = 4;

/// Default interval between watchdog timeout sweeps (250 ms).
pub const DEFAULT_WATCHDOG_INTERVAL_MS: u64 = 250;

/// Settings for a [`super::CompletionMonitor`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MonitorConfig {
    /// Threads available to run condition functions in parallel.
    pub pool_size: usize,
    /// How often the watchdog scans for polls past their deadline.
    pub watchdog_interval: Duration,
}

impl MonitorConfig {
    pub fn new() -> Self {
        Self {
            pool_size: DEFAULT_POOL_SIZE,
            watchdog_interval: Duration::from_millis(DEFAULT_WATCHDOG_INTERVAL_MS),
        }
    }

    /// Sets the pool size. Zero is raised to one.
    pub fn with_pool_size(mut self, pool_size: usize) -> Self {
        self.pool_size = pool_size.max(1);
        self
    }

    /// Sets the watchdog interval. Zero is raised to one millisecond.
    pub fn with_watchdog_interval(mut self, interval: Duration) -> Self {
        self.watchdog_interval = interval.max(Duration::from_millis(1));
        self
    }
}

impl Default for MonitorConfig {
    fn default() -> Self {
        Self::new()
    }
}
