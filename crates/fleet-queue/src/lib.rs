//! Work queues and scheduling primitives.
//!
//! - [`WorkQueue`]: FIFO queue with a concurrency ceiling, per-key
//!   deduplication and an optional rate cap
//! - [`ExclusiveTasks`]: named exclusive tasks with local delayed-retry
//!   tracking
//! - [`RateGate`]: fixed-window rate cap
//! - [`map_bounded`]: bounded parallel map for fan-out calls

mod exclusive;
mod fanout;
mod guard;
mod queue;
mod rate;

pub use exclusive::{ExclusiveGuard, ExclusiveTasks};
pub use fanout::map_bounded;
pub use queue::{Job, JobHandler, QueueOptions, SubmitOutcome, WorkQueue};
pub use rate::RateGate;
