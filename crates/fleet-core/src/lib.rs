//! Core constants shared across fleet crates.
//!
//! This crate provides:
//! - Default configuration values
//! - Error kind labels for metrics/logging
//! - Common project metadata

pub mod defaults;
pub mod errors;

pub use defaults::*;
pub use errors::*;

/// Project name.
pub const PROJECT_NAME: &str = "fleet-rs";
/// Project version (from Cargo.toml).
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
