// src/engine/history.rs

use dashmap::DashMap;

use crate::task::BuildStatus;
use crate::types::ConfigId;

/// Last terminal status per build configuration.
///
/// Consulted when a batch depends on a configuration it does not contain and
/// no live task for it exists.
#[derive(Debug, Default)]
pub struct ConfigHistory {
    last: DashMap<ConfigId, BuildStatus>,
}

impl ConfigHistory {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record(&self, config: &str, status: BuildStatus) {
        self.last.insert(config.to_string(), status);
    }

    pub fn last(&self, config: &str) -> Option<BuildStatus> {
        self.last.get(config).map(|entry| *entry.value())
    }

    pub fn len(&self) -> usize {
        self.last.len()
    }

    pub fn is_empty(&self) -> bool {
        self.last.is_empty()
    }
}
