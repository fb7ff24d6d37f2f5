// src/exec/supervisor.rs

use std::io::ErrorKind;
use std::path::PathBuf;
use std::time::Duration;

use tokio::process::Child;
use tokio::sync::Mutex;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::errors::{DevloopError, Result};
use crate::exec::command::{run_to_completion, Command};
use crate::exec::port::wait_for_port_free;

/// How the supervisor builds, starts and probes the target.
#[derive(Debug, Clone)]
pub struct SupervisorConfig {
    /// Build steps, run in order before every (re)start.
    pub build: Vec<Command>,
    /// The long-running target process.
    pub target: Command,
    /// Host the target binds; probed before a new target is spawned.
    pub host: String,
    pub port: u16,
    pub port_poll_interval: Duration,
    pub port_timeout: Duration,
    /// Removed on [`ProcessSupervisor::stop`]. Usually the built binary.
    pub artifact: Option<PathBuf>,
    /// Upper bound on how long `stop` waits for an in-flight `exec`.
    pub stop_timeout: Duration,
}

impl SupervisorConfig {
    pub fn new(target: Command, port: u16) -> Self {
        Self {
            build: Vec::new(),
            target,
            host: "127.0.0.1".to_string(),
            port,
            port_poll_interval: Duration::from_millis(10),
            port_timeout: Duration::from_secs(3),
            artifact: None,
            stop_timeout: Duration::from_secs(5),
        }
    }
}

/// Builds and (re)starts a single target process.
///
/// `exec` and `stop` are serialized through one async lock that also guards
/// the handle of the running process, so at most one rebuild is ever in
/// flight and a new target never starts while the old one holds the port.
pub struct ProcessSupervisor {
    config: SupervisorConfig,
    cancel: CancellationToken,
    active: Mutex<Option<Child>>,
}

impl ProcessSupervisor {
    pub fn new(config: SupervisorConfig) -> Self {
        Self {
            config,
            cancel: CancellationToken::new(),
            active: Mutex::new(None),
        }
    }

    pub fn config(&self) -> &SupervisorConfig {
        &self.config
    }

    /// Build, then replace the running target.
    ///
    /// A failed build leaves the current target running. After a successful
    /// build the old target is killed and the new one is only spawned once
    /// its port has been released.
    pub async fn exec(&self) -> Result<()> {
        let mut active = self.active.lock().await;
        if self.cancel.is_cancelled() {
            return Err(DevloopError::Cancelled);
        }

        for step in &self.config.build {
            run_to_completion(step, &self.cancel).await?;
        }

        if let Some(mut child) = active.take() {
            info!(pid = ?child.id(), "stopping previous target");
            if let Err(e) = child.kill().await {
                warn!(error = %e, "failed to kill previous target");
            }
        }

        wait_for_port_free(
            &self.config.host,
            self.config.port,
            self.config.port_poll_interval,
            self.config.port_timeout,
            &self.cancel,
        )
        .await?;

        if self.cancel.is_cancelled() {
            return Err(DevloopError::Cancelled);
        }

        let child = self
            .config
            .target
            .to_process()
            .spawn()
            .map_err(|source| DevloopError::SpawnFailure {
                command: self.config.target.to_string(),
                source,
            })?;

        info!(pid = ?child.id(), target = %self.config.target, "target started");
        *active = Some(child);
        Ok(())
    }

    /// Cancel any in-flight `exec`, kill the target and remove the artifact.
    ///
    /// Once stopped, every later `exec` fails with
    /// [`DevloopError::Cancelled`].
    pub async fn stop(&self) -> Result<()> {
        self.cancel.cancel();

        let mut active = tokio::time::timeout(self.config.stop_timeout, self.active.lock())
            .await
            .map_err(|_| DevloopError::WaitTimeout("in-flight rebuild to stop".to_string()))?;

        if let Some(mut child) = active.take() {
            info!(pid = ?child.id(), "stopping target");
            if let Err(e) = child.kill().await {
                warn!(error = %e, "failed to kill target");
            }
        }

        if let Some(artifact) = &self.config.artifact {
            match tokio::fs::remove_file(artifact).await {
                Ok(()) => debug!(path = ?artifact, "removed build artifact"),
                Err(e) if e.kind() == ErrorKind::NotFound => {
                    debug!(path = ?artifact, "build artifact already gone")
                }
                Err(e) => return Err(e.into()),
            }
        }

        Ok(())
    }

    /// Whether a target was started and has not exited yet.
    pub async fn is_running(&self) -> bool {
        let mut active = self.active.lock().await;
        match active.as_mut() {
            Some(child) => matches!(child.try_wait(), Ok(None)),
            None => false,
        }
    }

    /// OS pid of the current target, if any.
    pub async fn pid(&self) -> Option<u32> {
        self.active.lock().await.as_ref().and_then(Child::id)
    }
}
