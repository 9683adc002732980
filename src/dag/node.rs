// src/dag/node.rs

use std::collections::BTreeSet;

use crate::types::ConfigId;

/// Immutable description of one build configuration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BuildConfigNode {
    pub id: ConfigId,
    pub name: String,
    pub dependency_ids: BTreeSet<ConfigId>,
}

impl BuildConfigNode {
    /// Node whose display name equals its id.
    pub fn new(id: impl Into<ConfigId>) -> Self {
        let id = id.into();
        Self {
            name: id.clone(),
            id,
            dependency_ids: BTreeSet::new(),
        }
    }

    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = name.into();
        self
    }

    pub fn depends_on(mut self, dep: impl Into<ConfigId>) -> Self {
        self.dependency_ids.insert(dep.into());
        self
    }
}
