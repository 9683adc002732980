// src/dag/mod.rs

//! Build configuration graphs and the task graphs built from them.
//!
//! - [`node`] is the immutable input: one build configuration and the
//!   configurations it depends on.
//! - [`builder`] validates a batch of nodes (cycles, duplicates, unknown
//!   dependencies) and creates one task per node.
//! - [`graph`] holds the resulting tasks with a reverse-edge index.

pub mod builder;
pub mod graph;
pub mod node;

pub use builder::{BuildPlan, GraphBuilder, KnownConfig, KnownConfigs, NoHistory};
pub use graph::TaskGraph;
pub use node::BuildConfigNode;
