// src/config/loader.rs

use std::fs;
use std::path::Path;

use tracing::debug;

use crate::config::model::{BuildFile, RawBuildFile};
use crate::errors::Result;

/// Read and deserialize a build file without semantic validation.
///
/// Use [`load_and_validate`] unless you need the raw form.
pub fn load_from_path(path: impl AsRef<Path>) -> Result<RawBuildFile> {
    let path = path.as_ref();
    let contents = fs::read_to_string(path)?;
    let raw = parse_str(&contents)?;
    debug!(path = %path.display(), builds = raw.build.len(), "build file loaded");
    Ok(raw)
}

pub fn parse_str(contents: &str) -> Result<RawBuildFile> {
    Ok(toml::from_str(contents)?)
}

/// Load a build file and validate it.
///
/// - Reads TOML and applies defaults.
/// - Checks that there is at least one build.
/// - Checks engine settings.
/// - Checks that every `after` entry names another build in the file.
/// - Rejects dependency cycles.
pub fn load_and_validate(path: impl AsRef<Path>) -> Result<BuildFile> {
    let raw = load_from_path(&path)?;
    BuildFile::try_from(raw)
}
