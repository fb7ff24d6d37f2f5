// src/config/mod.rs

//! Configuration loading and validation for devloop.
//!
//! Responsibilities:
//! - Define the TOML-backed data model (`model.rs`).
//! - Discover and load a config file, then apply CLI overrides (`loader.rs`).
//! - Validate and turn the result into runtime `Settings` (`validate.rs`).

pub mod loader;
pub mod model;
pub mod validate;

pub use loader::{load_from_path, load_settings};
pub use model::{ConfigFile, Overrides, Settings};
pub use validate::{parse_duration, validate_config};
