//! Configuration loading, overrides and validation for the fleet panel.

mod cli;
mod defaults;
mod loader;
mod types;
mod validate;

pub use cli::{CliOverrides, apply_overrides};
pub use loader::{ConfigError, load_config};
pub use types::*;
pub use validate::validate_config;
