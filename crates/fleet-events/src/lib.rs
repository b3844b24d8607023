//! Domain events and the in-process bus that delivers them.

mod bus;
mod event;

pub use bus::{EventBus, HandlerError};
pub use event::{EventKind, FleetEvent, NodeRef, UserRef};
