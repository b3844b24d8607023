//! Synchronous publish/subscribe registry.

use std::collections::BTreeMap;
use std::error::Error;
use std::panic::{AssertUnwindSafe, catch_unwind};

use tracing::{debug, error, warn};

use crate::event::{EventKind, FleetEvent};

pub type HandlerError = Box<dyn Error + Send + Sync>;

type Handler = Box<dyn Fn(&FleetEvent) -> Result<(), HandlerError> + Send + Sync>;

struct Subscriber {
    name: &'static str,
    handler: Handler,
}

/// Event registry built once at startup and then shared read-only.
///
/// Subscribers run in registration order on the publishing task. A
/// subscriber that fails or panics is logged and skipped; the remaining
/// subscribers still run.
#[derive(Default)]
pub struct EventBus {
    subscribers: BTreeMap<EventKind, Vec<Subscriber>>,
}

impl EventBus {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn subscribe<F>(&mut self, kind: EventKind, name: &'static str, handler: F)
    where
        F: Fn(&FleetEvent) -> Result<(), HandlerError> + Send + Sync + 'static,
    {
        debug!(event = %kind, subscriber = name, "subscriber registered");
        self.subscribers.entry(kind).or_default().push(Subscriber {
            name,
            handler: Box::new(handler),
        });
    }

    /// Register one handler for several kinds.
    pub fn subscribe_many<F>(&mut self, kinds: &[EventKind], name: &'static str, handler: F)
    where
        F: Fn(&FleetEvent) -> Result<(), HandlerError> + Clone + Send + Sync + 'static,
    {
        for kind in kinds {
            self.subscribe(*kind, name, handler.clone());
        }
    }

    pub fn subscriber_count(&self, kind: EventKind) -> usize {
        self.subscribers.get(&kind).map_or(0, Vec::len)
    }

    /// Deliver `event` to every subscriber of its kind.
    ///
    /// Returns the number of subscribers that completed successfully.
    pub fn publish(&self, event: &FleetEvent) -> usize {
        let kind = event.kind();
        fleet_metrics::record_event(kind.as_str());

        let Some(subs) = self.subscribers.get(&kind) else {
            return 0;
        };

        let mut ok = 0;
        for sub in subs {
            match catch_unwind(AssertUnwindSafe(|| (sub.handler)(event))) {
                Ok(Ok(())) => ok += 1,
                Ok(Err(e)) => {
                    warn!(event = %kind, subscriber = sub.name, error = %e, "event subscriber failed");
                }
                Err(_) => {
                    error!(event = %kind, subscriber = sub.name, "event subscriber panicked");
                }
            }
        }
        ok
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::event::UserRef;
    use std::sync::Arc;
    use std::sync::atomic::{AtomicUsize, Ordering};

    fn limited() -> FleetEvent {
        FleetEvent::UserLimited {
            user: UserRef {
                t_id: 1,
                uuid: "u-1".into(),
                username: "bob".into(),
                vless_uuid: "v-1".into(),
            },
        }
    }

    #[test]
    fn delivers_only_to_matching_kind() {
        let hits = Arc::new(AtomicUsize::new(0));
        let mut bus = EventBus::new();

        let h = hits.clone();
        bus.subscribe(EventKind::UserLimited, "count", move |_| {
            h.fetch_add(1, Ordering::SeqCst);
            Ok(())
        });
        let h = hits.clone();
        bus.subscribe(EventKind::UserExpired, "never", move |_| {
            h.fetch_add(100, Ordering::SeqCst);
            Ok(())
        });

        assert_eq!(bus.publish(&limited()), 1);
        assert_eq!(hits.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn failing_subscriber_does_not_block_others() {
        let hits = Arc::new(AtomicUsize::new(0));
        let mut bus = EventBus::new();

        bus.subscribe(EventKind::UserLimited, "fails", |_| Err("boom".into()));
        bus.subscribe(EventKind::UserLimited, "panics", |_| panic!("subscriber bug"));
        let h = hits.clone();
        bus.subscribe(EventKind::UserLimited, "works", move |_| {
            h.fetch_add(1, Ordering::SeqCst);
            Ok(())
        });

        assert_eq!(bus.subscriber_count(EventKind::UserLimited), 3);
        assert_eq!(bus.publish(&limited()), 1);
        assert_eq!(hits.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn publish_without_subscribers_is_noop() {
        let bus = EventBus::new();
        assert_eq!(bus.publish(&limited()), 0);
    }

    #[test]
    fn subscribe_many_registers_each_kind() {
        let hits = Arc::new(AtomicUsize::new(0));
        let mut bus = EventBus::new();
        let h = hits.clone();
        bus.subscribe_many(&EventKind::ALL, "all", move |_| {
            h.fetch_add(1, Ordering::SeqCst);
            Ok(())
        });
        for kind in EventKind::ALL {
            assert_eq!(bus.subscriber_count(kind), 1);
        }
        bus.publish(&limited());
        assert_eq!(hits.load(Ordering::SeqCst), 1);
    }
}
