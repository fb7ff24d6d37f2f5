// src/exec/command.rs

use std::fmt;
use std::process::Stdio;
use std::str::FromStr;

use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use crate::errors::{DevloopError, Result};

/// An executable plus its ordered arguments.
///
/// Commands are parsed by splitting on whitespace; there is no shell
/// involved, so quoting and globbing are not interpreted. Use
/// `sh -c "..."` explicitly when a shell is wanted.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Command {
    program: String,
    args: Vec<String>,
}

impl Command {
    pub fn new<P, I, S>(program: P, args: I) -> Self
    where
        P: Into<String>,
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            program: program.into(),
            args: args.into_iter().map(Into::into).collect(),
        }
    }

    /// Parse `"go build -o bin/app ."` style command lines.
    pub fn parse(line: &str) -> Result<Self> {
        let mut parts = line.split_whitespace();
        let program = parts
            .next()
            .ok_or_else(|| DevloopError::ConfigError("empty command".to_string()))?;
        Ok(Self::new(program, parts))
    }

    pub fn program(&self) -> &str {
        &self.program
    }

    pub fn args(&self) -> &[String] {
        &self.args
    }

    /// Return a copy with `extra` appended to the argument list.
    pub fn with_args<I, S>(&self, extra: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let mut cmd = self.clone();
        cmd.args.extend(extra.into_iter().map(Into::into));
        cmd
    }

    /// Build a tokio command that shares this process's stdout/stderr.
    pub(crate) fn to_process(&self) -> tokio::process::Command {
        let mut cmd = tokio::process::Command::new(&self.program);
        cmd.args(&self.args)
            .stdin(Stdio::null())
            .stdout(Stdio::inherit())
            .stderr(Stdio::inherit())
            .kill_on_drop(true);
        cmd
    }
}

impl fmt::Display for Command {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.program)?;
        for arg in &self.args {
            write!(f, " {arg}")?;
        }
        Ok(())
    }
}

impl FromStr for Command {
    type Err = DevloopError;

    fn from_str(s: &str) -> Result<Self> {
        Command::parse(s)
    }
}

/// Run a build step to completion, streaming its output to ours.
///
/// - Non-zero exit → [`DevloopError::BuildFailure`].
/// - If `cancel` fires first, the child is killed and
///   [`DevloopError::Cancelled`] is returned.
pub async fn run_to_completion(command: &Command, cancel: &CancellationToken) -> Result<()> {
    info!(cmd = %command, "running build step");

    let mut child = command
        .to_process()
        .spawn()
        .map_err(|source| DevloopError::SpawnFailure {
            command: command.to_string(),
            source,
        })?;

    tokio::select! {
        status = child.wait() => {
            let status = status?;
            if status.success() {
                info!(cmd = %command, "build step finished");
                Ok(())
            } else {
                Err(DevloopError::BuildFailure {
                    command: command.to_string(),
                    status: status.to_string(),
                })
            }
        }
        _ = cancel.cancelled() => {
            warn!(cmd = %command, "cancellation requested; killing build step");
            if let Err(e) = child.kill().await {
                warn!(cmd = %command, error = %e, "failed to kill build step");
            }
            Err(DevloopError::Cancelled)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_splits_on_whitespace() {
        let cmd = Command::parse("  go   build -o bin/app . ").unwrap();
        assert_eq!(cmd.program(), "go");
        assert_eq!(cmd.args(), ["build", "-o", "bin/app", "."]);
        assert_eq!(cmd.to_string(), "go build -o bin/app .");
    }

    #[test]
    fn parse_rejects_empty_lines() {
        assert!(matches!(
            Command::parse("   "),
            Err(DevloopError::ConfigError(_))
        ));
    }

    #[test]
    fn with_args_appends() {
        let cmd = Command::parse("./bin/app").unwrap().with_args(["--port", "8080"]);
        assert_eq!(cmd.to_string(), "./bin/app --port 8080");
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn non_zero_exit_is_a_build_failure() {
        let cancel = CancellationToken::new();
        let err = run_to_completion(&Command::new("false", Vec::<String>::new()), &cancel)
            .await
            .unwrap_err();
        assert!(matches!(err, DevloopError::BuildFailure { .. }));

        run_to_completion(&Command::new("true", Vec::<String>::new()), &cancel)
            .await
            .unwrap();
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn cancellation_interrupts_a_running_build() {
        let cancel = CancellationToken::new();
        let trigger = cancel.clone();
        tokio::spawn(async move {
            tokio::time::sleep(std::time::Duration::from_millis(50)).await;
            trigger.cancel();
        });

        let started = std::time::Instant::now();
        let err = run_to_completion(&Command::new("sleep", ["10"]), &cancel)
            .await
            .unwrap_err();
        assert!(matches!(err, DevloopError::Cancelled));
        assert!(started.elapsed() < std::time::Duration::from_secs(5));
    }
}
