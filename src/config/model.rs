// src/config/model.rs

use std::net::SocketAddr;
use std::path::PathBuf;
use std::time::Duration;

use serde::Deserialize;

use crate::exec::Command;
use crate::watch::ExclusionRules;

/// Top-level configuration as read from a TOML file.
///
/// ```toml
/// debug = false
///
/// [build]
/// cmd = "go build -o ./bin/app ."
/// bin = "./bin/app"
///
/// [watcher]
/// interval = "300ms"
/// exclude = ["node_modules/**"]
///
/// [proxy]
/// port = 42069
/// target = 8080
/// ```
///
/// All sections are optional; `build.bin` must come from the file or the CLI.
#[derive(Debug, Clone, Deserialize, Default)]
pub struct ConfigFile {
    #[serde(default)]
    pub debug: bool,

    #[serde(default)]
    pub build: BuildSection,

    #[serde(default)]
    pub watcher: WatcherSection,

    #[serde(default)]
    pub proxy: ProxySection,

    #[serde(default)]
    pub wait: WaitSection,
}

/// `[build]` section.
#[derive(Debug, Clone, Deserialize, Default)]
pub struct BuildSection {
    /// One build command, or several run in order.
    #[serde(default)]
    pub cmd: Option<BuildCommands>,

    /// The target executable, optionally followed by arguments.
    #[serde(default)]
    pub bin: Option<String>,

    /// Extra arguments appended to `bin`.
    #[serde(default)]
    pub args: Vec<String>,
}

#[derive(Debug, Clone, Deserialize, PartialEq, Eq)]
#[serde(untagged)]
pub enum BuildCommands {
    One(String),
    Many(Vec<String>),
}

impl BuildCommands {
    pub fn lines(&self) -> Vec<&str> {
        match self {
            BuildCommands::One(line) => vec![line.as_str()],
            BuildCommands::Many(lines) => lines.iter().map(String::as_str).collect(),
        }
    }
}

/// `[watcher]` section.
#[derive(Debug, Clone, Deserialize)]
pub struct WatcherSection {
    #[serde(default = "default_root")]
    pub root: PathBuf,

    /// Poll interval, e.g. `"300ms"`, `"1s"`.
    #[serde(default = "default_interval")]
    pub interval: String,

    /// Glob patterns, matched against paths relative to `root`.
    ///
    /// `None` (as opposed to an empty list) lets the built-in defaults apply.
    #[serde(default)]
    pub exclude: Option<Vec<String>>,

    /// Regular expressions, matched against paths relative to `root`.
    #[serde(default)]
    pub exclude_regex: Option<Vec<String>>,
}

fn default_root() -> PathBuf {
    PathBuf::from(".")
}

fn default_interval() -> String {
    "300ms".to_string()
}

impl Default for WatcherSection {
    fn default() -> Self {
        Self {
            root: default_root(),
            interval: default_interval(),
            exclude: None,
            exclude_regex: None,
        }
    }
}

/// `[proxy]` section.
#[derive(Debug, Clone, Deserialize)]
pub struct ProxySection {
    /// Port the dev server listens on.
    #[serde(default = "default_port")]
    pub port: u16,

    /// Port the target process serves on.
    #[serde(default = "default_target")]
    pub target: u16,

    #[serde(default = "default_host")]
    pub host: String,
}

fn default_port() -> u16 {
    42069
}

fn default_target() -> u16 {
    8080
}

fn default_host() -> String {
    "127.0.0.1".to_string()
}

impl Default for ProxySection {
    fn default() -> Self {
        Self {
            port: default_port(),
            target: default_target(),
            host: default_host(),
        }
    }
}

/// `[wait]` section: services that must be up before the first build.
#[derive(Debug, Clone, Deserialize)]
pub struct WaitSection {
    /// `host:port` addresses.
    #[serde(default, rename = "for")]
    pub addresses: Vec<String>,

    #[serde(default = "default_wait_timeout")]
    pub timeout: String,
}

fn default_wait_timeout() -> String {
    "30s".to_string()
}

impl Default for WaitSection {
    fn default() -> Self {
        Self {
            addresses: Vec::new(),
            timeout: default_wait_timeout(),
        }
    }
}

/// Values from the command line that take precedence over the file.
#[derive(Debug, Clone, Default)]
pub struct Overrides {
    pub build_cmd: Option<String>,
    pub build_bin: Option<String>,
    pub interval: Option<String>,
    pub exclude: Vec<String>,
    pub exclude_regex: Vec<String>,
    pub port: Option<u16>,
    pub target: Option<u16>,
    pub wait_for: Vec<String>,
    pub debug: bool,
    pub open: bool,
}

/// Fully validated runtime settings.
#[derive(Debug, Clone)]
pub struct Settings {
    pub debug: bool,
    pub build: Vec<Command>,
    pub target: Command,
    /// Removed on shutdown; only set when devloop builds the binary itself.
    pub artifact: Option<PathBuf>,
    pub watch_root: PathBuf,
    pub interval: Duration,
    pub exclusions: ExclusionRules,
    pub listen: SocketAddr,
    pub host: String,
    pub target_port: u16,
    pub wait_for: Vec<String>,
    pub wait_timeout: Duration,
    pub open_browser: bool,
}

impl Settings {
    /// URL browsers should open.
    pub fn public_url(&self) -> String {
        format!("http://{}:{}", self.host, self.listen.port())
    }

    /// Base URL of the target process.
    pub fn target_url(&self) -> String {
        format!("http://{}:{}", self.host, self.target_port)
    }
}
