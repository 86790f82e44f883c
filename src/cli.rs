// src/cli.rs

//! CLI argument parsing using `clap`.

use clap::{Parser, ValueEnum};

/// Task run when no task name is given on the command line.
pub const DEFAULT_TASK: &str = "default";

/// Pseudo-task that starts the dev server and the file watcher.
pub const WATCH_TASK: &str = "watch";

/// Command-line arguments for `assetdag`.
#[derive(Debug, Clone, Parser)]
#[command(
    name = "assetdag",
    version,
    about = "Build front-end assets from a task graph, with watch mode and live reload.",
    long_about = None
)]
pub struct CliArgs {
    /// Task to run: `default`, `build`, `watch`, `run-dev-scripts`,
    /// `run-dev-styles`, `build-scripts`, `build-styles`, `compress-images`,
    /// `build-icon-sprite`, or any `[task.<name>]` from the config.
    #[arg(value_name = "TASK", default_value = DEFAULT_TASK)]
    pub task: String,

    /// Path to the config file (TOML).
    ///
    /// Its directory is the project root all configured paths are resolved
    /// against.
    #[arg(long, value_name = "PATH", default_value = "Assetdag.toml")]
    pub config: String,

    /// Logging level (error, warn, info, debug, trace).
    ///
    /// If omitted, `ASSETDAG_LOG` or a default level will be used.
    #[arg(long, value_enum, value_name = "LEVEL")]
    pub log_level: Option<LogLevel>,

    /// Parse + validate, print the task graph, but don't run anything.
    #[arg(long)]
    pub dry_run: bool,
}

impl CliArgs {
    pub fn is_watch(&self) -> bool {
        self.task == WATCH_TASK
    }
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
