// src/browser.rs

//! Opening the proxy URL in the user's browser.

use tracing::debug;

use crate::errors::{DevloopError, Result};
use crate::exec::Command;

pub trait BrowserLauncher: Send + Sync {
    fn open(&self, url: &str) -> Result<()>;
}

/// Launches the platform's default browser through its opener command.
#[derive(Debug, Default, Clone, Copy)]
pub struct SystemBrowser;

impl SystemBrowser {
    /// The command used to open `url` on this platform.
    pub fn command(url: &str) -> Command {
        opener(url)
    }
}

impl BrowserLauncher for SystemBrowser {
    fn open(&self, url: &str) -> Result<()> {
        let cmd = opener(url);
        debug!(cmd = %cmd, "opening browser");
        std::process::Command::new(cmd.program())
            .args(cmd.args())
            .stdin(std::process::Stdio::null())
            .stdout(std::process::Stdio::null())
            .stderr(std::process::Stdio::null())
            .spawn()
            .map(drop)
            .map_err(|source| DevloopError::SpawnFailure {
                command: cmd.to_string(),
                source,
            })
    }
}

#[cfg(target_os = "macos")]
fn opener(url: &str) -> Command {
    Command::new("open", [url])
}

#[cfg(target_os = "windows")]
fn opener(url: &str) -> Command {
    Command::new("cmd", ["/c", "start", "", url])
}

#[cfg(all(unix, not(target_os = "macos")))]
fn opener(url: &str) -> Command {
    if is_wsl() {
        Command::new("explorer.exe", [url])
    } else {
        Command::new("xdg-open", [url])
    }
}

#[cfg(all(unix, not(target_os = "macos")))]
fn is_wsl() -> bool {
    std::fs::read_to_string("/proc/sys/kernel/osrelease")
        .map(|release| release.to_ascii_lowercase().contains("microsoft"))
        .unwrap_or(false)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn command_ends_with_url() {
        let cmd = SystemBrowser::command("http://127.0.0.1:42069");
        assert_eq!(
            cmd.args().last().map(String::as_str),
            Some("http://127.0.0.1:42069")
        );
    }
}
