// src/engine/runtime.rs

use std::sync::Arc;
use std::time::Duration;

use tokio::time::{interval, MissedTickBehavior};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use crate::errors::{DevloopError, Result};
use crate::events::{ReloadBus, RELOAD_EVENT, RELOAD_PAYLOAD};
use crate::exec::ProcessControl;
use crate::watch::ChangeSource;

/// What a single watch cycle did.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CycleOutcome {
    /// No file changed.
    Idle,
    /// `n` files changed, the target was rebuilt and clients were told to reload.
    Reloaded(usize),
    /// `n` files changed and the rebuild failed. Clients are still told to
    /// reload, so they pick up static assets and see the target's state.
    RebuildFailed(usize),
}

/// The watch → rebuild → notify loop.
///
/// Responsibilities:
/// - Poll the change source on a fixed interval.
/// - Rebuild and restart through the process control on change.
/// - Emit the reload event after every rebuild attempt.
pub struct Runtime<C, S> {
    changes: Arc<C>,
    supervisor: Arc<S>,
    bus: Arc<ReloadBus>,
    interval: Duration,
}

impl<C, S> Runtime<C, S>
where
    C: ChangeSource,
    S: ProcessControl,
{
    pub fn new(changes: Arc<C>, supervisor: Arc<S>, bus: Arc<ReloadBus>, interval: Duration) -> Self {
        Self {
            changes,
            supervisor,
            bus,
            interval,
        }
    }

    /// Initial build, then one cycle per tick until `shutdown` fires.
    ///
    /// Cycle errors are logged and never end the loop.
    pub async fn run(self, shutdown: CancellationToken) {
        info!(interval = ?self.interval, "devloop runtime started");

        if let Err(e) = self.supervisor.exec().await {
            error!(error = %e, "initial build failed; waiting for changes");
        }

        let mut ticker = interval(self.interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                _ = shutdown.cancelled() => break,
                _ = ticker.tick() => {}
            }

            match self.run_cycle().await {
                Ok(CycleOutcome::Idle) => {}
                Ok(outcome) => debug!(?outcome, "cycle finished"),
                Err(DevloopError::Cancelled) => break,
                Err(e) => warn!(error = %e, "watch cycle failed"),
            }
        }

        info!("devloop runtime stopped");
    }

    /// Check for changes once and react to them.
    pub async fn run_cycle(&self) -> Result<CycleOutcome> {
        let source = Arc::clone(&self.changes);
        let changed = tokio::task::spawn_blocking(move || source.changes())
            .await
            .map_err(anyhow::Error::from)??;

        if changed.is_empty() {
            return Ok(CycleOutcome::Idle);
        }

        for path in &changed {
            info!(path = %path, "file changed");
        }

        let outcome = match self.supervisor.exec().await {
            Ok(()) => CycleOutcome::Reloaded(changed.len()),
            Err(DevloopError::Cancelled) => return Err(DevloopError::Cancelled),
            Err(e) => {
                error!(error = %e, "rebuild failed");
                CycleOutcome::RebuildFailed(changed.len())
            }
        };

        if let Err(e) = self.bus.emit(RELOAD_EVENT, RELOAD_PAYLOAD.to_string()).await {
            warn!(error = %e, "failed to emit reload");
        }
        Ok(outcome)
    }
}

/// Wait for `shutdown`, then stop the supervised target.
///
/// Runs alongside the listener drain: streams the proxy relays from the
/// target only end once the target is gone.
pub async fn stop_on_shutdown<S: ProcessControl>(
    supervisor: Arc<S>,
    shutdown: CancellationToken,
) -> Result<()> {
    shutdown.cancelled().await;
    info!("stopping target");
    supervisor.stop().await
}
