// src/task/mod.rs

//! Build tasks, build sets and their status state machines.
//!
//! - [`status`] defines task and set status values and the transition table.
//! - [`build_task`] is the schedulable unit.
//! - [`set`] groups tasks submitted together.
//! - [`state_machine`] is the only code path that writes task statuses.
//! - [`aggregator`] rolls member statuses up into a set status.

pub mod aggregator;
pub mod build_task;
pub mod set;
pub mod state_machine;
pub mod status;

pub use aggregator::{SetAggregator, compute_aggregate};
pub use build_task::{BuildTask, TaskTimes};
pub use set::BuildSetTask;
pub use state_machine::TaskStateMachine;
pub use status::{BuildSetStatus, BuildStatus};
