//! Relational ledger for the fleet control plane.
//!
//! Holds users (credentials, traffic counters, status, threshold
//! watermark), nodes (connectivity, active profile and inbounds), config
//! profiles, and usage history. Supports PostgreSQL and SQLite through
//! SQLx's `Any` driver.
//!
//! The three bulk statements that carry the accounting engine are
//! [`Ledger::apply_usage_batch`], [`Ledger::evaluate_thresholds`] and
//! [`Ledger::reset_period_batch`]; each is a single set-based statement
//! (or a pair inside one transaction), never a read-modify-write loop.

mod backend;
mod error;
mod model;
mod nodes;
mod profiles;
mod queries;
mod schema;
mod thresholds;
mod usage;
mod users;

pub mod cli;


pub use backend::{DatabaseType, Ledger, LedgerOptions, now_millis};
pub use cli::{LedgerArgs, LedgerCommands};
pub use error::LedgerError;
pub use model::*;
