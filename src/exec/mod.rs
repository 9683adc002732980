// src/exec/mod.rs

//! Build execution layer.
//!
//! The engine does not execute builds; it talks to a [`BuildDriver`].
//!
//! - [`backend`] defines the driver contract: [`BuildRequest`] in,
//!   [`BuildOutcome`] back through a one-shot [`BuildCompletion`].
//! - [`simulated`] is a driver that fakes builds with timers on a
//!   [`crate::monitor::CompletionMonitor`], used by the `simulate` command.

pub mod backend;
pub mod simulated;

pub use backend::{BuildCompletion, BuildDriver, BuildOutcome, BuildRequest, CompletionSink};
pub use simulated::{SimulatedBuild, SimulatedDriver, SimulatedOutcome};
