//! # fleet-rs
//!
//! Control plane for a self-hosted proxy fleet: keeps every node's user
//! set in line with the ledger, accounts usage, and cascades limit and
//! expiry decisions back out to the fleet.
//!
//! ## Crates
//!
//! - [`fleet_core`] - Shared defaults and error labels
//! - [`fleet_config`] - Configuration loading and validation
//! - [`fleet_ledger`] - Relational ledger and bulk statements
//! - [`fleet_node`] - Node agent RPC
//! - [`fleet_queue`] - Work queues and scheduling primitives
//! - [`fleet_events`] - Domain events and the event bus
//! - [`fleet_metrics`] - Prometheus metrics
//! - [`fleet_panel`] - Dispatcher, health manager, ingestion and schedulers

pub use fleet_config as config;
pub use fleet_core as core;
pub use fleet_events as events;
pub use fleet_ledger as ledger;
pub use fleet_metrics as metrics;
pub use fleet_node as node;
pub use fleet_panel as panel;
pub use fleet_queue as queue;

/// Prelude module for convenient imports.
pub mod prelude {
    pub use fleet_config::{Config, load_config, validate_config};
    pub use fleet_events::{EventBus, EventKind, FleetEvent};
    pub use fleet_ledger::{Ledger, LedgerOptions};
    pub use fleet_node::{HttpNodeClient, NodeApi};
    pub use fleet_panel::{Notifier, Panel, PanelContext, PanelError, PanelSettings, Scheduler};
}
