// src/cli.rs

//! CLI argument parsing using `clap`.

use clap::{Parser, Subcommand, ValueEnum};

use crate::config::DEFAULT_CONFIG_FILE;

/// Command-line arguments for `buildcoord`.
#[derive(Debug, Clone, Parser)]
#[command(
    name = "buildcoord",
    version,
    about = "Schedule dependent builds and report every status change.",
    long_about = None
)]
pub struct CliArgs {
    /// Path to the build file (TOML).
    #[arg(long, value_name = "PATH", default_value = DEFAULT_CONFIG_FILE)]
    pub config: String,

    /// Logging level (error, warn, info, debug, trace).
    ///
    /// If omitted, `BUILDCOORD_LOG` or a default level will be used.
    #[arg(long, value_enum, value_name = "LEVEL")]
    pub log_level: Option<LogLevel>,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Debug, Clone, Subcommand)]
pub enum Command {
    /// Validate the build file and print the build order without running.
    Plan,

    /// Run every build with simulated durations and outcomes, printing each
    /// event as a JSON line on stdout.
    Simulate {
        /// Build this configuration even if a dependency failed before.
        /// May be repeated.
        #[arg(long, value_name = "ID")]
        force: Vec<String>,
    },
}

/// Log level as exposed on the CLI.
#[derive(Debug, Copy, Clone, ValueEnum)]
pub enum LogLevel {
    Error,
    Warn,
    Info,
    Debug,
    Trace,
}

/// Convenience wrapper around `CliArgs::parse()`.
pub fn parse() -> CliArgs {
    CliArgs::parse()
}
