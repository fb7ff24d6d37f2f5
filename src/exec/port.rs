// src/exec/port.rs

//! TCP port probing: waiting for a port to be released before starting a new
//! target, and waiting for services to accept connections.

use std::time::Duration;

use tokio::net::{TcpListener, TcpStream};
use tokio::time::{sleep, Instant};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

use crate::errors::{DevloopError, Result};

/// Poll until `host:port` can be bound, i.e. nothing is listening on it.
///
/// The probe listener is dropped immediately. Gives up with
/// [`DevloopError::PortTimeout`] after `timeout`, or
/// [`DevloopError::Cancelled`] as soon as `cancel` fires.
pub async fn wait_for_port_free(
    host: &str,
    port: u16,
    interval: Duration,
    timeout: Duration,
    cancel: &CancellationToken,
) -> Result<()> {
    let deadline = Instant::now() + timeout;
    debug!(host, port, "waiting for port to be free");

    loop {
        match TcpListener::bind((host, port)).await {
            Ok(listener) => {
                drop(listener);
                debug!(host, port, "port is free");
                return Ok(());
            }
            Err(e) => debug!(host, port, error = %e, "port still in use"),
        }

        if Instant::now() >= deadline {
            return Err(DevloopError::PortTimeout { port, timeout });
        }

        tokio::select! {
            _ = sleep(interval) => {}
            _ = cancel.cancelled() => return Err(DevloopError::Cancelled),
        }
    }
}

/// Poll until a TCP connection to `addr` succeeds.
pub async fn wait_for_listening(addr: &str, interval: Duration, timeout: Duration) -> Result<()> {
    let deadline = Instant::now() + timeout;

    loop {
        match TcpStream::connect(addr).await {
            Ok(_) => {
                debug!(addr, "address is accepting connections");
                return Ok(());
            }
            Err(e) => debug!(addr, error = %e, "address not ready yet"),
        }

        if Instant::now() >= deadline {
            return Err(DevloopError::WaitTimeout(addr.to_string()));
        }
        sleep(interval).await;
    }
}

/// Wait for every address in `addrs` to accept connections, sharing a single
/// overall `timeout`.
pub async fn wait_for_all(addrs: &[String], interval: Duration, timeout: Duration) -> Result<()> {
    if addrs.is_empty() {
        return Ok(());
    }

    info!(?addrs, "waiting for services");
    let deadline = Instant::now() + timeout;
    for addr in addrs {
        let remaining = deadline.saturating_duration_since(Instant::now());
        wait_for_listening(addr, interval, remaining).await?;
    }
    info!("all services available");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    const TICK: Duration = Duration::from_millis(10);

    #[tokio::test]
    async fn free_port_returns_immediately() {
        let port = {
            let l = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
            l.local_addr().unwrap().port()
        };
        wait_for_port_free("127.0.0.1", port, TICK, Duration::from_secs(1), &CancellationToken::new())
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn held_port_times_out() {
        let held = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
        let port = held.local_addr().unwrap().port();

        let err = wait_for_port_free(
            "127.0.0.1",
            port,
            TICK,
            Duration::from_millis(100),
            &CancellationToken::new(),
        )
        .await
        .unwrap_err();
        assert!(matches!(err, DevloopError::PortTimeout { port: p, .. } if p == port));
    }

    #[tokio::test]
    async fn cancellation_stops_waiting() {
        let held = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
        let port = held.local_addr().unwrap().port();
        let cancel = CancellationToken::new();
        cancel.cancel();

        let err = wait_for_port_free("127.0.0.1", port, TICK, Duration::from_secs(5), &cancel)
            .await
            .unwrap_err();
        assert!(matches!(err, DevloopError::Cancelled));
    }

    #[tokio::test]
    async fn wait_for_all_sees_listeners() {
        let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
        let addr = listener.local_addr().unwrap().to_string();
        wait_for_all(&[addr], TICK, Duration::from_secs(1)).await.unwrap();
    }

    #[tokio::test]
    async fn wait_for_all_times_out_on_closed_port() {
        let port = {
            let l = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
            l.local_addr().unwrap().port()
        };
        let err = wait_for_all(&[format!("127.0.0.1:{port}")], TICK, Duration::from_millis(50))
            .await
            .unwrap_err();
        assert!(matches!(err, DevloopError::WaitTimeout(_)));
    }
}
