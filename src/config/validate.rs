// src/config/validate.rs

use std::collections::HashSet;
use std::sync::Arc;

use crate::config::model::{BuildFile, RawBuildFile};
use crate::dag::{GraphBuilder, NoHistory};
use crate::errors::{BuildcoordError, Result};
use crate::types::IdSource;

impl TryFrom<RawBuildFile> for BuildFile {
    type Error = BuildcoordError;

    fn try_from(raw: RawBuildFile) -> std::result::Result<Self, Self::Error> {
        validate_raw_build_file(&raw)?;
        Ok(BuildFile::new_unchecked(raw.engine, raw.build))
    }
}

fn validate_raw_build_file(cfg: &RawBuildFile) -> Result<()> {
    ensure_has_builds(cfg)?;
    validate_engine_section(cfg)?;
    validate_build_dependencies(cfg)?;
    validate_graph(cfg)?;
    Ok(())
}

fn ensure_has_builds(cfg: &RawBuildFile) -> Result<()> {
    if cfg.build.is_empty() {
        return Err(BuildcoordError::ConfigError(
            "build file must contain at least one [build.<id>] section".to_string(),
        ));
    }
    Ok(())
}

fn validate_engine_section(cfg: &RawBuildFile) -> Result<()> {
    if cfg.engine.monitor_pool_size == 0 {
        return Err(BuildcoordError::ConfigError(
            "[engine].monitor_pool_size must be >= 1 (got 0)".to_string(),
        ));
    }
    if cfg.engine.watchdog_interval_ms == 0 {
        return Err(BuildcoordError::ConfigError(
            "[engine].watchdog_interval_ms must be >= 1 (got 0)".to_string(),
        ));
    }
    Ok(())
}

fn validate_build_dependencies(cfg: &RawBuildFile) -> Result<()> {
    for (id, build) in cfg.build.iter() {
        for dep in build.after.iter() {
            if dep == id {
                return Err(BuildcoordError::ConfigError(format!(
                    "build '{}' cannot depend on itself in `after`",
                    id
                )));
            }
            if !cfg.build.contains_key(dep) {
                return Err(BuildcoordError::ConfigError(format!(
                    "build '{}' has unknown dependency '{}' in `after`",
                    id, dep
                )));
            }
        }
    }
    Ok(())
}

/// Run the file through the same builder the engine uses, so a file that
/// validates is guaranteed to submit.
fn validate_graph(cfg: &RawBuildFile) -> Result<()> {
    let nodes: Vec<_> = cfg
        .build
        .iter()
        .map(|(id, section)| section.to_node(id))
        .collect();

    GraphBuilder::new(Arc::new(IdSource::new())).build(&nodes, &HashSet::new(), &NoHistory)?;
    Ok(())
}
