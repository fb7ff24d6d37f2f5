// src/watch/mod.rs

//! File watching and change detection.
//!
//! This module is responsible for:
//! - Compiling glob / regex exclusion rules.
//! - Polling the source tree and hashing (whitespace-trimmed) file contents.
//! - Keeping the baseline of known digests between polls.
//!
//! It does **not** know about builds or processes; it only answers "which
//! files changed since last time".

pub mod hash;
pub mod path_utils;
pub mod patterns;
pub mod watcher;

pub use hash::{content_digest, file_digest, Digest};
pub use patterns::{ExclusionRules, ExclusionSpec};
pub use watcher::{ChangeSource, Watcher, WatcherConfig};
