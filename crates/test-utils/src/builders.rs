#![allow(dead_code)]

use std::collections::{BTreeMap, HashSet};

use buildcoord::config::{BuildFile, BuildSection, EngineSection, RawBuildFile, SimulateSection};
use buildcoord::dag::BuildConfigNode;
use buildcoord::exec::SimulatedOutcome;

/// Shorthand for a node with dependencies.
pub fn node(id: &str, after: &[&str]) -> BuildConfigNode {
    after
        .iter()
        .fold(BuildConfigNode::new(id), |n, dep| n.depends_on(*dep))
}

/// Linear chain: `ids[0]` first, every later id depends on its predecessor.
pub fn chain(ids: &[&str]) -> Vec<BuildConfigNode> {
    ids.iter()
        .enumerate()
        .map(|(i, id)| match i {
            0 => node(id, &[]),
            _ => node(id, &[ids[i - 1]]),
        })
        .collect()
}

pub fn no_force() -> HashSet<String> {
    HashSet::new()
}

pub fn force(ids: &[&str]) -> HashSet<String> {
    ids.iter().map(|s| s.to_string()).collect()
}

/// Builder for `BuildFile` to simplify test setup.
pub struct BuildFileBuilder {
    raw: RawBuildFile,
}

impl BuildFileBuilder {
    pub fn new() -> Self {
        Self {
            raw: RawBuildFile {
                engine: EngineSection::default(),
                build: BTreeMap::new(),
            },
        }
    }

    pub fn with_build(mut self, id: &str, build: BuildSection) -> Self {
        self.raw.build.insert(id.to_string(), build);
        self
    }

    pub fn with_max_concurrent_builds(mut self, limit: usize) -> Self {
        self.raw.engine.max_concurrent_builds = limit;
        self
    }

    pub fn with_monitor_pool_size(mut self, size: usize) -> Self {
        self.raw.engine.monitor_pool_size = size;
        self
    }

    pub fn raw(self) -> RawBuildFile {
        self.raw
    }

    pub fn build(self) -> BuildFile {
        BuildFile::try_from(self.raw).expect("Failed to build valid build file from builder")
    }
}

impl Default for BuildFileBuilder {
    fn default() -> Self {
        Self::new()
    }
}

/// Builder for `BuildSection`.
pub struct BuildSectionBuilder {
    section: BuildSection,
}

impl BuildSectionBuilder {
    pub fn new() -> Self {
        Self {
            section: BuildSection::default(),
        }
    }

    pub fn name(mut self, name: &str) -> Self {
        self.section.name = Some(name.to_string());
        self
    }

    pub fn after(mut self, dep: &str) -> Self {
        self.section.after.push(dep.to_string());
        self
    }

    pub fn force(mut self) -> Self {
        self.section.force = true;
        self
    }

    pub fn simulate(mut self, duration_ms: u64, outcome: SimulatedOutcome) -> Self {
        self.section.simulate = Some(SimulateSection {
            duration_ms,
            outcome,
        });
        self
    }

    pub fn build(self) -> BuildSection {
        self.section
    }
}

impl Default for BuildSectionBuilder {
    fn default() -> Self {
        Self::new()
    }
}
