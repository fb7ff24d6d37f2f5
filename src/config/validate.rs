// src/config/validate.rs

use std::net::{SocketAddr, ToSocketAddrs};
use std::path::PathBuf;
use std::time::Duration;

use crate::config::model::{ConfigFile, Settings};
use crate::errors::{DevloopError, Result};
use crate::exec::Command;
use crate::watch::{ExclusionRules, ExclusionSpec};

/// Regex exclusions used when the config names no exclusions at all:
/// the default `bin/` output directory and hidden files and directories.
pub const DEFAULT_EXCLUDE_REGEX: [&str; 3] = [r"^bin/", r"^\.", r"/\.\w+$"];

/// Turn a merged `ConfigFile` into runtime `Settings`.
///
/// This checks:
/// - `build.bin` is present and non-empty
/// - build commands are non-empty
/// - ports are non-zero and distinct
/// - durations parse and the poll interval is non-zero
/// - exclusion patterns compile
/// - the listen host resolves
pub fn validate_config(cfg: &ConfigFile) -> Result<Settings> {
    let bin = cfg
        .build
        .bin
        .as_deref()
        .ok_or_else(|| config_error("[build].bin (or --build-bin) is required"))?;
    let target = Command::parse(bin)?.with_args(cfg.build.args.iter().cloned());

    let build = match &cfg.build.cmd {
        Some(cmds) => cmds
            .lines()
            .into_iter()
            .map(Command::parse)
            .collect::<Result<Vec<_>>>()?,
        None => Vec::new(),
    };

    let artifact = artifact_path(&build, &target);

    validate_ports(cfg.proxy.port, cfg.proxy.target)?;

    let interval = parse_duration(&cfg.watcher.interval)
        .map_err(|e| config_error(format!("[watcher].interval: {e}")))?;
    if interval.is_zero() {
        return Err(config_error("[watcher].interval must be greater than zero"));
    }
    let wait_timeout = parse_duration(&cfg.wait.timeout)
        .map_err(|e| config_error(format!("[wait].timeout: {e}")))?;

    let exclusions = ExclusionRules::new(&exclusion_spec(cfg))?;
    let listen = resolve_listen(&cfg.proxy.host, cfg.proxy.port)?;

    Ok(Settings {
        debug: cfg.debug,
        build,
        target,
        artifact,
        watch_root: cfg.watcher.root.clone(),
        interval,
        exclusions,
        listen,
        host: cfg.proxy.host.clone(),
        target_port: cfg.proxy.target,
        wait_for: cfg.wait.addresses.clone(),
        wait_timeout,
        open_browser: false,
    })
}

fn config_error(msg: impl Into<String>) -> DevloopError {
    DevloopError::ConfigError(msg.into())
}

fn validate_ports(port: u16, target: u16) -> Result<()> {
    if port == 0 {
        return Err(config_error("[proxy].port must be non-zero"));
    }
    if target == 0 {
        return Err(config_error("[proxy].target must be non-zero"));
    }
    if port == target {
        return Err(config_error(format!(
            "[proxy].port and [proxy].target must differ (both are {port})"
        )));
    }
    Ok(())
}

/// The built binary is only ours to delete when we build it and it is named
/// by path rather than looked up on `PATH`.
fn artifact_path(build: &[Command], target: &Command) -> Option<PathBuf> {
    if build.is_empty() {
        return None;
    }
    let program = target.program();
    program
        .contains(std::path::is_separator)
        .then(|| PathBuf::from(program))
}

fn exclusion_spec(cfg: &ConfigFile) -> ExclusionSpec {
    match (&cfg.watcher.exclude, &cfg.watcher.exclude_regex) {
        (None, None) => ExclusionSpec {
            globs: Vec::new(),
            regexes: DEFAULT_EXCLUDE_REGEX.iter().map(|s| s.to_string()).collect(),
        },
        (globs, regexes) => ExclusionSpec {
            globs: globs.clone().unwrap_or_default(),
            regexes: regexes.clone().unwrap_or_default(),
        },
    }
}

fn resolve_listen(host: &str, port: u16) -> Result<SocketAddr> {
    (host, port)
        .to_socket_addrs()
        .map_err(|e| config_error(format!("[proxy].host {host:?}: {e}")))?
        .next()
        .ok_or_else(|| config_error(format!("[proxy].host {host:?} did not resolve")))
}

/// Parse a duration string like `"300ms"`, `"5s"`, `"2m"`, `"1h"`.
pub fn parse_duration(s: &str) -> std::result::Result<Duration, String> {
    let s = s.trim();
    if s.is_empty() {
        return Err("empty duration string".to_string());
    }

    // Find the boundary between digits and suffix.
    let idx = s
        .chars()
        .position(|c| !c.is_ascii_digit())
        .ok_or_else(|| "duration missing unit suffix".to_string())?;

    let (num_part, unit_part) = s.split_at(idx);
    let value: u64 = num_part
        .parse()
        .map_err(|e| format!("invalid duration number '{}': {}", num_part, e))?;
    let unit = unit_part.trim().to_lowercase();

    let seconds = |factor: u64| {
        value
            .checked_mul(factor)
            .map(Duration::from_secs)
            .ok_or_else(|| format!("invalid duration number '{}': too large", num_part))
    };

    match unit.as_str() {
        "ms" => Ok(Duration::from_millis(value)),
        "s" => Ok(Duration::from_secs(value)),
        "m" => seconds(60),
        "h" => seconds(60 * 60),
        _ => Err(format!(
            "unsupported duration unit '{}'; expected ms, s, m, or h",
            unit
        )),
    }
}
