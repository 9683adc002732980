// src/logging.rs

//! Logging setup for `buildcoord` using `tracing` + `tracing-subscriber`.
//!
//! Priority for determining the filter:
//! 1. `--log-level` CLI flag (if provided)
//! 2. `BUILDCOORD_LOG` environment variable, either a bare level ("debug")
//!    or full `EnvFilter` directives ("info,buildcoord::monitor=trace")
//! 3. default to `info`
//!
//! Logs are sent to STDERR so that stdout carries only the build plan or
//! the JSON event stream.

use anyhow::Result;
use tracing_subscriber::{EnvFilter, fmt};

use crate::cli::LogLevel;

/// Environment variable read when no `--log-level` is given.
pub const LOG_ENV_VAR: &str = "BUILDCOORD_LOG";

/// Initialise global logging subscriber.
///
/// Safe to call once at startup.
pub fn init_logging(cli_level: Option<LogLevel>) -> Result<()> {
    let env_value = std::env::var(LOG_ENV_VAR).ok();
    let filter = resolve_filter(cli_level, env_value.as_deref());

    // Monitor threads are named, which helps when reading poll logs.
    fmt()
        .with_env_filter(filter)
        .with_target(true)
        .with_thread_names(true)
        .with_writer(std::io::stderr)
        .try_init()
        .map_err(|err| anyhow::anyhow!("failed to initialise logging: {err}"))?;

    Ok(())
}

/// Pick the filter from the CLI level and the environment value.
///
/// Unparseable environment values fall back to `info`.
pub fn resolve_filter(cli_level: Option<LogLevel>, env_value: Option<&str>) -> EnvFilter {
    if let Some(level) = cli_level {
        return EnvFilter::new(level_directive(level));
    }

    env_value
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .and_then(|s| EnvFilter::try_new(s.to_lowercase()).ok())
        .unwrap_or_else(|| EnvFilter::new("info"))
}

fn level_directive(level: LogLevel) -> &'static str {
    match level {
        LogLevel::Error => "error",
        LogLevel::Warn => "warn",
        LogLevel::Info => "info",
        LogLevel::Debug => "debug",
        LogLevel::Trace => "trace",
    }
}
