// src/config/model.rs

use std::collections::{BTreeMap, HashMap, HashSet};
use std::time::Duration;

use serde::Deserialize;

use crate::dag::BuildConfigNode;
use crate::engine::EngineOptions;
use crate::exec::{SimulatedBuild, SimulatedOutcome};
use crate::monitor::{DEFAULT_POOL_SIZE, DEFAULT_WATCHDOG_INTERVAL_MS, MonitorConfig};
use crate::types::ConfigId;

/// Build file exactly as deserialized from TOML, before validation.
///
/// ```toml
/// [engine]
/// monitor_pool_size = 4
/// watchdog_interval_ms = 250
/// max_concurrent_builds = 2
///
/// [build.core]
/// name = "core library"
///
/// [build.app]
/// after = ["core"]
///
/// [build.app.simulate]
/// duration_ms = 300
/// outcome = "failure"
/// ```
///
/// Every section is optional; [`BuildFile::try_from`] rejects files without
/// builds.
#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct RawBuildFile {
    #[serde(default)]
    pub engine: EngineSection,

    /// All builds from `[build.<id>]`, keyed by configuration id.
    #[serde(default)]
    pub build: BTreeMap<ConfigId, BuildSection>,
}

/// Validated build file.
///
/// Only obtainable through `TryFrom<RawBuildFile>` (or
/// [`BuildFile::new_unchecked`] for callers that validated themselves).
#[derive(Debug, Clone)]
pub struct BuildFile {
    engine: EngineSection,
    build: BTreeMap<ConfigId, BuildSection>,
}

impl BuildFile {
    pub fn new_unchecked(engine: EngineSection, build: BTreeMap<ConfigId, BuildSection>) -> Self {
        Self { engine, build }
    }

    pub fn engine(&self) -> &EngineSection {
        &self.engine
    }

    pub fn builds(&self) -> &BTreeMap<ConfigId, BuildSection> {
        &self.build
    }

    /// One node per `[build.<id>]` section.
    pub fn nodes(&self) -> Vec<BuildConfigNode> {
        self.build
            .iter()
            .map(|(id, section)| section.to_node(id))
            .collect()
    }

    /// Configurations marked `force = true`.
    pub fn force_set(&self) -> HashSet<ConfigId> {
        self.build
            .iter()
            .filter(|(_, section)| section.force)
            .map(|(id, _)| id.clone())
            .collect()
    }

    pub fn monitor_config(&self) -> MonitorConfig {
        MonitorConfig::new()
            .with_pool_size(self.engine.monitor_pool_size)
            .with_watchdog_interval(Duration::from_millis(self.engine.watchdog_interval_ms))
    }

    pub fn engine_options(&self) -> EngineOptions {
        EngineOptions::unlimited().with_max_concurrent_builds(self.engine.max_concurrent_builds)
    }

    /// Simulation settings of every build that declares them.
    pub fn simulated_builds(&self) -> HashMap<ConfigId, SimulatedBuild> {
        self.build
            .iter()
            .filter_map(|(id, section)| {
                section
                    .simulate
                    .as_ref()
                    .map(|sim| (id.clone(), sim.to_build()))
            })
            .collect()
    }
}

/// `[engine]` section.
#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct EngineSection {
    /// Threads polling completion conditions.
    #[serde(default = "default_monitor_pool_size")]
    pub monitor_pool_size: usize,

    /// Period of the monitor's timeout sweep.
    #[serde(default = "default_watchdog_interval_ms")]
    pub watchdog_interval_ms: u64,

    /// `0` means unlimited.
    #[serde(default)]
    pub max_concurrent_builds: usize,
}

fn default_monitor_pool_size() -> usize {
    DEFAULT_POOL_SIZE
}

fn default_watchdog_interval_ms() -> u64 {
    DEFAULT_WATCHDOG_INTERVAL_MS
}

impl Default for EngineSection {
    fn default() -> Self {
        Self {
            monitor_pool_size: default_monitor_pool_size(),
            watchdog_interval_ms: default_watchdog_interval_ms(),
            max_concurrent_builds: 0,
        }
    }
}

/// `[build.<id>]` section.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct BuildSection {
    /// Display name; defaults to the id.
    #[serde(default)]
    pub name: Option<String>,

    /// Configurations that must build successfully first.
    #[serde(default)]
    pub after: Vec<ConfigId>,

    /// Build even if a dependency outside the batch last failed.
    #[serde(default)]
    pub force: bool,

    /// Only read by the `simulate` command.
    #[serde(default)]
    pub simulate: Option<SimulateSection>,
}

impl BuildSection {
    pub fn to_node(&self, id: &str) -> BuildConfigNode {
        let mut node = BuildConfigNode::new(id);
        if let Some(name) = &self.name {
            node = node.with_name(name.clone());
        }
        self.after
            .iter()
            .fold(node, |node, dep| node.depends_on(dep.clone()))
    }
}

/// `[build.<id>.simulate]` section.
#[derive(Debug, Clone, Copy, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct SimulateSection {
    #[serde(default = "default_simulated_duration_ms")]
    pub duration_ms: u64,

    #[serde(default)]
    pub outcome: SimulatedOutcome,
}

fn default_simulated_duration_ms() -> u64 {
    100
}

impl SimulateSection {
    pub fn to_build(&self) -> SimulatedBuild {
        SimulatedBuild {
            duration: Duration::from_millis(self.duration_ms),
            outcome: self.outcome,
        }
    }
}
