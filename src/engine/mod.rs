// src/engine/mod.rs

//! Orchestration engine for devloop.
//!
//! This module ties together:
//! - the change source (file watcher)
//! - the process control (build + restart)
//! - the reload event bus

pub mod runtime;

pub use runtime::{stop_on_shutdown, CycleOutcome, Runtime};
