// src/cli.rs

//! CLI argument parsing using `clap`.

use std::path::PathBuf;

use clap::{Parser, ValueEnum};

use crate::config::Overrides;

/// Command-line arguments for `devloop`.
///
/// Every flag except `--config`, `--open` and `--log-level` overrides the
/// matching value from the config file.
#[derive(Debug, Clone, Parser)]
#[command(
    name = "devloop",
    version,
    about = "Rebuild and restart a server on file changes, and live-reload the browser through a proxy.",
    long_about = None
)]
pub struct CliArgs {
    /// Path to the config file (TOML).
    ///
    /// Default: `devloop.toml`, then `.devloop.toml`, in the current directory.
    #[arg(long, value_name = "PATH")]
    pub config: Option<PathBuf>,

    /// Build command, e.g. "go build -o ./bin/app .".
    #[arg(long, value_name = "CMD")]
    pub build_cmd: Option<String>,

    /// Target executable (and arguments) started after each build.
    #[arg(long, value_name = "BIN")]
    pub build_bin: Option<String>,

    /// Poll interval, e.g. "300ms" or "1s".
    #[arg(long, value_name = "DURATION")]
    pub interval: Option<String>,

    /// Glob pattern to exclude from watching (repeatable).
    #[arg(long, value_name = "GLOB")]
    pub exclude: Vec<String>,

    /// Regular expression to exclude from watching (repeatable).
    #[arg(long, value_name = "REGEX")]
    pub exclude_regex: Vec<String>,

    /// Port the dev server listens on.
    #[arg(long)]
    pub port: Option<u16>,

    /// Port the target process serves on.
    #[arg(long)]
    pub target: Option<u16>,

    /// Wait for `host:port` to accept connections before starting (repeatable).
    #[arg(long, value_name = "ADDR")]
    pub wait_for: Vec<String>,

    /// Shorthand for `--log-level debug`.
    #[arg(long)]
    pub debug: bool,

    /// Open the browser once the target is up.
    #[arg(long)]
    pub open: bool,

    /// Logging level (error, warn, info, debug, trace).
    ///
    /// If omitted, `--debug`, then `DEVLOOP_LOG`, then `info` is used.
    #[arg(long, value_enum, value_name = "LEVEL")]
    pub log_level: Option<LogLevel>,
}

/// Log level as exposed on the CLI.
#[derive(Debug, Copy, Clone, PartialEq, Eq, ValueEnum)]
pub enum LogLevel {
    Error,
    Warn,
    Info,
    Debug,
    Trace,
}

impl CliArgs {
    pub fn overrides(&self) -> Overrides {
        Overrides {
            build_cmd: self.build_cmd.clone(),
            build_bin: self.build_bin.clone(),
            interval: self.interval.clone(),
            exclude: self.exclude.clone(),
            exclude_regex: self.exclude_regex.clone(),
            port: self.port,
            target: self.target,
            wait_for: self.wait_for.clone(),
            debug: self.debug,
            open: self.open,
        }
    }
}

/// Convenience wrapper around `CliArgs::parse()`.
pub fn parse() -> CliArgs {
    CliArgs::parse()
}
