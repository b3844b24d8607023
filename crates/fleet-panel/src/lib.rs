//! Fleet synchronization and usage-accounting engine.
//!
//! A [`Panel`] owns the work queues, the event bus and the handles to the
//! ledger and node transport. Its operations fall into five groups:
//!
//! - dispatch: [`Panel::sync_user`], [`Panel::sync_users`],
//!   [`Panel::desync_user`], [`Panel::desync_users`]
//! - node lifecycle: [`Panel::check_nodes`], [`Panel::start_node`],
//!   [`Panel::restart_all_nodes`], [`Panel::restart_profile`]
//! - usage ingestion: [`Panel::record_usage`]
//! - thresholds: [`Panel::check_thresholds`], [`Panel::evaluate_thresholds`],
//!   [`Panel::mark_limited`],
//!   [`Panel::mark_expired`], [`Panel::reset_period`]
//! - scheduling: [`Scheduler`] drives all of the above on intervals

mod cascade;
pub mod cli;
mod context;
pub mod dispatch;
mod error;
mod health;
mod ingest;
mod jobs;
mod panel;
mod scheduler;
mod thresholds;

pub use cascade::{LogNotifier, Notifier};
pub use cli::{PanelArgs, run};
pub use context::{PanelContext, PanelSettings};
pub use error::PanelError;
pub use health::{HealthOutcome, start_request};
pub use ingest::UsageSweep;
pub use jobs::{PanelJob, Queues};
pub use panel::Panel;
pub use scheduler::{DueResets, ResetClock, Scheduler};
