// src/server/mod.rs

//! Public HTTP listener: dev-server endpoints plus the proxy fallback.

pub mod notifier;
pub mod proxy;

use std::future::IntoFuture;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use axum::http::header;
use axum::response::IntoResponse;
use axum::routing::get;
use axum::Router;
use tokio::net::TcpListener;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use crate::errors::{DevloopError, Result};
use crate::events::ReloadBus;

pub use proxy::{ProxyConfig, ProxyError, RewritingProxy};

pub const WS_PATH: &str = "/__dev-server/ws";
pub const SSE_PATH: &str = "/__dev-server/sse";
pub const SCRIPT_PATH: &str = "/__dev-server/ws-live-reload.js";

const CLIENT_SCRIPT: &str = include_str!("assets/ws-live-reload.js");

#[derive(Clone)]
pub struct AppState {
    pub bus: Arc<ReloadBus>,
    pub proxy: Arc<RewritingProxy>,
    /// Fired on shutdown so long-lived notifier connections end.
    pub shutdown: CancellationToken,
}

pub fn router(state: AppState) -> Router {
    Router::new()
        .route(WS_PATH, get(notifier::ws_handler))
        .route(SSE_PATH, get(notifier::sse_handler))
        .route(SCRIPT_PATH, get(client_script))
        .fallback(proxy::proxy_handler)
        .with_state(state)
}

async fn client_script() -> impl IntoResponse {
    (
        [
            (header::CONTENT_TYPE, "application/javascript"),
            (header::CACHE_CONTROL, "no-cache"),
        ],
        CLIENT_SCRIPT,
    )
}

/// Bind the public listener. Failure here is fatal for the caller.
pub async fn bind(addr: SocketAddr) -> Result<TcpListener> {
    TcpListener::bind(addr)
        .await
        .map_err(|source| DevloopError::Bind { addr, source })
}

/// Serve `app` until `shutdown` fires, then drain connections for at most
/// `drain_timeout`. Connections still open after that are abandoned.
pub async fn serve(
    listener: TcpListener,
    app: Router,
    shutdown: CancellationToken,
    drain_timeout: Duration,
) -> Result<()> {
    if let Ok(addr) = listener.local_addr() {
        info!(%addr, "dev server listening");
    }

    let signal = shutdown.clone();
    let server = axum::serve(listener, app)
        .with_graceful_shutdown(async move { signal.cancelled().await })
        .into_future();

    tokio::select! {
        served = server => served?,
        _ = async {
            shutdown.cancelled().await;
            tokio::time::sleep(drain_timeout).await;
        } => {
            warn!(?drain_timeout, "connections still open after shutdown; abandoning them");
        }
    }

    info!("dev server stopped");
    Ok(())
}
