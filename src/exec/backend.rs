// src/exec/backend.rs

//! Pluggable process-control abstraction.
//!
//! The runtime talks to a `ProcessControl` instead of a concrete supervisor.
//! This makes it easy to swap in a fake in tests while keeping the production
//! implementation in [`supervisor`](super::supervisor).

use std::future::Future;
use std::pin::Pin;

use crate::errors::Result;

use super::supervisor::ProcessSupervisor;

/// Trait abstracting "rebuild and restart" and "shut everything down".
///
/// Production code uses [`ProcessSupervisor`]; tests can provide their own
/// implementation that doesn't spawn real processes.
pub trait ProcessControl: Send + Sync + 'static {
    /// Run the build commands, then replace the running target.
    fn exec(&self) -> Pin<Box<dyn Future<Output = Result<()>> + Send + '_>>;

    /// Cancel anything in flight, terminate the target and clean up.
    fn stop(&self) -> Pin<Box<dyn Future<Output = Result<()>> + Send + '_>>;
}

impl ProcessControl for ProcessSupervisor {
    fn exec(&self) -> Pin<Box<dyn Future<Output = Result<()>> + Send + '_>> {
        Box::pin(ProcessSupervisor::exec(self))
    }

    fn stop(&self) -> Pin<Box<dyn Future<Output = Result<()>> + Send + '_>> {
        Box::pin(ProcessSupervisor::stop(self))
    }
}
