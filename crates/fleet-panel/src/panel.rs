//! Panel assembly: context, queues, event bus and notifier wired together.

use std::sync::Arc;

use fleet_events::{EventBus, FleetEvent};
use fleet_ledger::Ledger;

use crate::cascade::{self, Notifier};
use crate::context::{PanelContext, PanelSettings};
use crate::error::PanelError;
use crate::jobs::{JobRunner, Queues};

/// The running control plane.
///
/// Queue workers hold a weak reference back to the panel, so dropping the
/// last `Arc<Panel>` stops job execution.
pub struct Panel {
    pub(crate) ctx: PanelContext,
    pub(crate) queues: Queues,
    pub(crate) bus: EventBus,
    pub(crate) notifier: Arc<dyn Notifier>,
}

impl Panel {
    /// Start queue workers and register the built-in event subscribers.
    ///
    /// Must be called from within a Tokio runtime.
    pub fn start(ctx: PanelContext, notifier: Arc<dyn Notifier>) -> Arc<Self> {
        Arc::new_cyclic(|weak| {
            let runner = Arc::new(JobRunner {
                panel: weak.clone(),
            });
            let queues = Queues::start(runner, &ctx.settings);
            let mut bus = EventBus::new();
            cascade::register_subscribers(&mut bus, &queues);
            Self {
                ctx,
                queues,
                bus,
                notifier,
            }
        })
    }

    pub fn ledger(&self) -> &Ledger {
        &self.ctx.ledger
    }

    pub fn settings(&self) -> &PanelSettings {
        &self.ctx.settings
    }

    pub fn queues(&self) -> &Queues {
        &self.queues
    }

    /// Publish an event whose ledger write has already committed.
    pub fn publish(&self, event: &FleetEvent) -> usize {
        self.bus.publish(event)
    }

    pub(crate) async fn deliver_notification(&self, event: &FleetEvent) -> Result<(), PanelError> {
        if let Err(e) = self.notifier.notify(event).await {
            tracing::warn!(event = %event.kind(), error = %e, "notification delivery failed");
        }
        Ok(())
    }

    /// Wait until all queued work, including follow-up jobs, has finished.
    pub async fn wait_idle(&self) {
        self.queues.wait_idle().await;
    }

    pub fn shutdown(&self) {
        self.queues.shutdown();
    }
}
