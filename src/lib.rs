// src/lib.rs

pub mod browser;
pub mod cli;
pub mod config;
pub mod engine;
pub mod errors;
pub mod events;
pub mod exec;
pub mod logging;
pub mod server;
pub mod watch;

use std::sync::Arc;
use std::time::Duration;

use anyhow::Result;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};

use crate::browser::{BrowserLauncher, SystemBrowser};
use crate::config::Settings;
use crate::engine::{stop_on_shutdown, Runtime};
use crate::events::{EventBus, EventBusConfig};
use crate::exec::port::{wait_for_all, wait_for_listening};
use crate::exec::{ProcessSupervisor, SupervisorConfig};
use crate::server::{AppState, ProxyConfig, RewritingProxy, SCRIPT_PATH};
use crate::watch::{Watcher, WatcherConfig};

const WAIT_POLL: Duration = Duration::from_millis(100);
const READY_TIMEOUT: Duration = Duration::from_secs(60);
const DRAIN_TIMEOUT: Duration = Duration::from_secs(5);

/// High-level entry point used by `main.rs`.
///
/// Runs until SIGINT (Ctrl-C) or, on unix, SIGTERM.
pub async fn run(settings: Settings) -> Result<()> {
    let shutdown = CancellationToken::new();
    {
        let shutdown = shutdown.clone();
        tokio::spawn(async move {
            shutdown_signal().await;
            info!("shutdown requested");
            shutdown.cancel();
        });
    }
    run_until(settings, shutdown).await
}

/// Run devloop until `shutdown` is cancelled.
///
/// This wires together:
/// - wait-for services
/// - the public listener (proxy + notifier endpoints)
/// - watcher / supervisor / event bus runtime
/// - optional browser launch
/// - ordered teardown: the target is stopped as soon as `shutdown` fires,
///   while the listener drains
pub async fn run_until(settings: Settings, shutdown: CancellationToken) -> Result<()> {
    wait_for_all(&settings.wait_for, WAIT_POLL, settings.wait_timeout).await?;

    let bus = Arc::new(EventBus::<String>::new(EventBusConfig::default()));
    let proxy = Arc::new(RewritingProxy::new(ProxyConfig {
        target: settings.target_url(),
        script_src: SCRIPT_PATH.to_string(),
    })?);
    let listener = server::bind(settings.listen).await?;

    let watcher = Arc::new(Watcher::new(WatcherConfig {
        root: settings.watch_root.clone(),
        exclusions: settings.exclusions.clone(),
    }));

    let mut supervisor_config = SupervisorConfig::new(settings.target.clone(), settings.target_port);
    supervisor_config.build = settings.build.clone();
    supervisor_config.host = settings.host.clone();
    supervisor_config.artifact = settings.artifact.clone();
    let supervisor = Arc::new(ProcessSupervisor::new(supervisor_config));

    info!(
        listen = %settings.listen,
        target = %settings.target_url(),
        root = ?settings.watch_root,
        "devloop starting"
    );

    let runtime = Runtime::new(
        watcher,
        Arc::clone(&supervisor),
        Arc::clone(&bus),
        settings.interval,
    );
    let runtime_task = tokio::spawn(runtime.run(shutdown.clone()));

    if settings.open_browser {
        spawn_browser_launch(&settings, shutdown.clone());
    }

    let stopper = tokio::spawn(stop_on_shutdown(Arc::clone(&supervisor), shutdown.clone()));

    let app = server::router(AppState {
        bus: Arc::clone(&bus),
        proxy,
        shutdown: shutdown.clone(),
    });
    let served = server::serve(listener, app, shutdown.clone(), DRAIN_TIMEOUT).await;
    shutdown.cancel();

    match stopper.await {
        Ok(Ok(())) => {}
        Ok(Err(e)) => warn!(error = %e, "failed to stop target cleanly"),
        Err(e) => warn!(error = %e, "stop task ended abnormally"),
    }
    if let Err(e) = runtime_task.await {
        warn!(error = %e, "runtime task ended abnormally");
    }
    bus.stop().await;

    served?;
    info!("devloop stopped");
    Ok(())
}

/// Open the browser once the target accepts connections.
fn spawn_browser_launch(settings: &Settings, shutdown: CancellationToken) {
    let target = format!("{}:{}", settings.host, settings.target_port);
    let url = settings.public_url();

    tokio::spawn(async move {
        let ready = tokio::select! {
            ready = wait_for_listening(&target, WAIT_POLL, READY_TIMEOUT) => ready,
            _ = shutdown.cancelled() => return,
        };

        if let Err(e) = ready {
            warn!(error = %e, "target never became ready; not opening browser");
            return;
        }
        if let Err(e) = SystemBrowser.open(&url) {
            warn!(error = %e, %url, "failed to open browser");
        }
    });
}

/// Resolves on the first SIGINT, or SIGTERM on unix.
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            error!(error = %e, "failed to listen for Ctrl+C");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        use tokio::signal::unix::{signal, SignalKind};
        match signal(SignalKind::terminate()) {
            Ok(mut sigterm) => {
                sigterm.recv().await;
            }
            Err(e) => {
                error!(error = %e, "failed to listen for SIGTERM");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {}
        _ = terminate => {}
    }
}
