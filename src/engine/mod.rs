// src/engine/mod.rs

//! Scheduling engine.
//!
//! This module ties together:
//! - the live task graph and the build sets submitted into it
//! - the task state machine (every status write goes through it)
//! - a [`crate::exec::BuildDriver`] that runs builds
//! - a [`Datastore`] that receives finished records
//!
//! [`BuildCoordinator`] is the entry point; [`ConfigHistory`] remembers how
//! each configuration last ended so later batches can depend on it.

pub mod coordinator;
pub mod datastore;
pub mod history;

pub use coordinator::BuildCoordinator;
pub use datastore::{
    BuildRecord, BuildSetRecord, Datastore, InMemoryDatastore, PersistedRecord, SetMemberRecord,
};
pub use history::ConfigHistory;

/// Scheduling options shared by the coordinator and the CLI.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct EngineOptions {
    /// Upper bound on tasks in `BUILDING` at once; `0` means unlimited.
    pub max_concurrent_builds: usize,
}

impl EngineOptions {
    pub fn unlimited() -> Self {
        Self::default()
    }

    pub fn with_max_concurrent_builds(mut self, limit: usize) -> Self {
        self.max_concurrent_builds = limit;
        self
    }
}
