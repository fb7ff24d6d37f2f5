// src/config/loader.rs

use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{bail, Context, Result};
use tracing::debug;

use crate::config::model::{BuildCommands, ConfigFile, Overrides, Settings};
use crate::config::validate::validate_config;

/// File names looked up in the working directory when `--config` is absent.
pub const DEFAULT_CONFIG_FILES: [&str; 2] = ["devloop.toml", ".devloop.toml"];

/// Load a configuration file from a given path and return the raw `ConfigFile`.
///
/// This only performs TOML deserialization; it does **not** perform semantic
/// validation. Use [`load_settings`] for that.
pub fn load_from_path(path: impl AsRef<Path>) -> Result<ConfigFile> {
    let path = path.as_ref();
    let contents = fs::read_to_string(path)
        .with_context(|| format!("reading config file at {:?}", path))?;

    let config: ConfigFile = toml::from_str(&contents)
        .with_context(|| format!("parsing TOML config from {:?}", path))?;

    Ok(config)
}

/// Resolve which config file to use, if any.
///
/// - An explicit path must exist.
/// - Otherwise the first existing entry of [`DEFAULT_CONFIG_FILES`] inside
///   `dir` wins.
/// - `None` means "run on defaults plus CLI flags".
pub fn discover(explicit: Option<&Path>, dir: &Path) -> Result<Option<PathBuf>> {
    if let Some(path) = explicit {
        if !path.is_file() {
            bail!("config file {:?} does not exist", path);
        }
        return Ok(Some(path.to_path_buf()));
    }

    Ok(DEFAULT_CONFIG_FILES
        .iter()
        .map(|name| dir.join(name))
        .find(|candidate| candidate.is_file()))
}

/// Apply command-line values on top of the file.
pub fn apply_overrides(cfg: &mut ConfigFile, overrides: &Overrides) {
    if let Some(cmd) = &overrides.build_cmd {
        cfg.build.cmd = Some(BuildCommands::One(cmd.clone()));
    }
    if let Some(bin) = &overrides.build_bin {
        cfg.build.bin = Some(bin.clone());
    }
    if let Some(interval) = &overrides.interval {
        cfg.watcher.interval = interval.clone();
    }
    if !overrides.exclude.is_empty() {
        cfg.watcher.exclude = Some(overrides.exclude.clone());
    }
    if !overrides.exclude_regex.is_empty() {
        cfg.watcher.exclude_regex = Some(overrides.exclude_regex.clone());
    }
    if let Some(port) = overrides.port {
        cfg.proxy.port = port;
    }
    if let Some(target) = overrides.target {
        cfg.proxy.target = target;
    }
    if !overrides.wait_for.is_empty() {
        cfg.wait.addresses = overrides.wait_for.clone();
    }
    cfg.debug |= overrides.debug;
}

/// Discover, load, merge with `overrides` and validate.
///
/// This is the recommended entry point for the rest of the application.
pub fn load_settings(explicit: Option<&Path>, overrides: &Overrides) -> Result<Settings> {
    let mut cfg = match discover(explicit, Path::new("."))? {
        Some(path) => {
            debug!(path = ?path, "loading config file");
            load_from_path(&path)?
        }
        None => {
            debug!("no config file found; using defaults");
            ConfigFile::default()
        }
    };

    apply_overrides(&mut cfg, overrides);
    let mut settings = validate_config(&cfg).context("invalid configuration")?;
    settings.open_browser = overrides.open;
    Ok(settings)
}
