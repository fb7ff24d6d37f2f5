// src/exec/mod.rs

//! Process execution layer.
//!
//! This module is responsible for actually running the build steps and the
//! target process, using `tokio::process::Command`.
//!
//! - [`command`] holds the `Command` value type and the build-step runner.
//! - [`port`] polls TCP ports (waiting for release, waiting for listeners).
//! - [`supervisor`] owns the single running target and serializes rebuilds.
//! - [`backend`] provides the `ProcessControl` trait that the runtime uses,
//!   and which tests can replace with a fake implementation.

pub mod backend;
pub mod command;
pub mod port;
pub mod supervisor;

pub use backend::ProcessControl;
pub use command::Command;
pub use supervisor::{ProcessSupervisor, SupervisorConfig};
