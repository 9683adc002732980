// src/config/mod.rs

//! Build file loading and validation.
//!
//! - [`model`] defines the TOML-backed data model.
//! - [`loader`] reads a file from disk.
//! - [`validate`] turns a [`RawBuildFile`] into a validated [`BuildFile`].

pub mod loader;
pub mod model;
pub mod validate;

pub use loader::{load_and_validate, load_from_path, parse_str};
pub use model::{BuildFile, BuildSection, EngineSection, RawBuildFile, SimulateSection};

/// Build file looked up when `--config` is not given.
pub const DEFAULT_CONFIG_FILE: &str = "Buildcoord.toml";
