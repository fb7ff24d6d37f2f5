// src/errors.rs

//! Crate-wide error type.
//!
//! Every failure a rebuild cycle, the supervisor or the event bus can report
//! is a variant here. Proxy failures are connection-scoped and live in
//! [`crate::server::proxy::ProxyError`] instead.

use std::net::SocketAddr;
use std::path::PathBuf;
use std::time::Duration;

use thiserror::Error;

#[derive(Error, Debug)]
pub enum DevloopError {
    #[error("Configuration error: {0}")]
    ConfigError(String),

    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),

    #[error("TOML parsing error: {0}")]
    TomlError(#[from] toml::de::Error),

    #[error("invalid exclusion pattern '{pattern}': {reason}")]
    InvalidPattern { pattern: String, reason: String },

    #[error("invalid proxy target '{target}': {reason}")]
    InvalidTarget { target: String, reason: String },

    #[error("build failed: `{command}` exited with {status}")]
    BuildFailure { command: String, status: String },

    #[error("timeout reached, port {port} is still in use after {timeout:?}")]
    PortTimeout { port: u16, timeout: Duration },

    #[error("failed to start `{command}`: {source}")]
    SpawnFailure {
        command: String,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to scan {path:?}: {source}")]
    WatchIo {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("operation cancelled because the supervisor is stopping")]
    Cancelled,

    #[error("failed to bind {addr}: {source}")]
    Bind {
        addr: SocketAddr,
        #[source]
        source: std::io::Error,
    },

    #[error("timed out waiting for {0}")]
    WaitTimeout(String),

    #[error("event bus is stopped")]
    EventBusStopped,

    #[error("event '{0}' dropped: queue is full")]
    EventDropped(String),

    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

impl From<walkdir::Error> for DevloopError {
    fn from(err: walkdir::Error) -> Self {
        let path = err.path().map(PathBuf::from).unwrap_or_default();
        let source = err
            .into_io_error()
            .unwrap_or_else(|| std::io::Error::other("filesystem loop detected"));
        DevloopError::WatchIo { path, source }
    }
}

pub use anyhow::Error;
pub type Result<T> = std::result::Result<T, DevloopError>;
