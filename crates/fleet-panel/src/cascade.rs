//! Event cascade: built-in subscribers and the notifier seam.

use async_trait::async_trait;
use fleet_events::{EventBus, EventKind, FleetEvent, HandlerError, NodeRef, UserRef};
use fleet_ledger::{NodeRecord, UserIdentity};
use fleet_queue::SubmitOutcome;
use tracing::info;

use crate::jobs::{PanelJob, Queues};

/// Renders and delivers notifications for domain events.
#[async_trait]
pub trait Notifier: Send + Sync {
    async fn notify(&self, event: &FleetEvent) -> Result<(), HandlerError>;
}

/// Writes every event to the log.
#[derive(Debug, Default, Clone, Copy)]
pub struct LogNotifier;

#[async_trait]
impl Notifier for LogNotifier {
    async fn notify(&self, event: &FleetEvent) -> Result<(), HandlerError> {
        let payload = serde_json::to_string(event)?;
        info!(event = %event.kind(), %payload, "fleet event");
        Ok(())
    }
}

/// Register the subscribers every panel runs with.
///
/// Expired and limited users are evicted from all connected nodes; every
/// event is handed to the notification queue.
pub(crate) fn register_subscribers(bus: &mut EventBus, queues: &Queues) {
    let user_queue = queues.user.clone();
    bus.subscribe_many(
        &[EventKind::UserExpired, EventKind::UserLimited],
        "desync",
        move |event| {
            let Some(user) = event.user() else {
                return Ok(());
            };
            accepted(user_queue.submit(PanelJob::desync(user)))
        },
    );

    let notify_queue = queues.notify.clone();
    bus.subscribe_many(&EventKind::ALL, "notify", move |event| {
        accepted(notify_queue.submit(PanelJob::Notify(event.clone())))
    });
}

fn accepted(outcome: SubmitOutcome) -> Result<(), HandlerError> {
    match outcome {
        SubmitOutcome::Queued | SubmitOutcome::Duplicate => Ok(()),
        SubmitOutcome::Closed => Err("queue closed".into()),
    }
}

pub(crate) fn user_ref(identity: UserIdentity) -> UserRef {
    UserRef {
        t_id: identity.t_id,
        uuid: identity.uuid,
        username: identity.username,
        vless_uuid: identity.vless_uuid,
    }
}

pub(crate) fn node_ref(node: &NodeRecord) -> NodeRef {
    NodeRef {
        uuid: node.uuid.clone(),
        name: node.name.clone(),
        address: node.address.clone(),
        port: node.port,
    }
}
