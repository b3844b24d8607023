//! The job table.
//!
//! Every unit of queued work is a [`PanelJob`] variant; [`JobRunner`] maps
//! each variant to the panel operation that executes it.

use std::sync::{Arc, Weak};

use async_trait::async_trait;
use fleet_events::{FleetEvent, UserRef};
use fleet_queue::{Job, JobHandler, QueueOptions, WorkQueue};

use crate::context::PanelSettings;
use crate::dispatch::{DispatchTarget, RemovalKey};
use crate::error::PanelError;
use crate::panel::Panel;

#[derive(Debug, Clone)]
pub enum PanelJob {
    /// One RPC against one node.
    Node(DispatchTarget),
    /// Evict a user from every connected node.
    DesyncUser(RemovalKey),
    /// Start (or restart) one node's proxy.
    StartNode { node_uuid: String },
    /// Restart every enabled node on a profile with one resolved config.
    RestartProfile { profile_uuid: String },
    /// Deliver an event to the notifier.
    Notify(FleetEvent),
}

impl PanelJob {
    pub(crate) fn desync(user: &UserRef) -> Self {
        PanelJob::DesyncUser(RemovalKey {
            t_id: user.t_id,
            vless_uuid: user.vless_uuid.clone(),
            prev_vless_uuid: None,
        })
    }
}

impl Job for PanelJob {
    fn kind(&self) -> &'static str {
        match self {
            PanelJob::Node(target) => target.command.kind(),
            PanelJob::DesyncUser(_) => "desync_user",
            PanelJob::StartNode { .. } => "start_node",
            PanelJob::RestartProfile { .. } => "restart_profile",
            PanelJob::Notify(_) => "notify",
        }
    }

    fn dedup_key(&self) -> Option<String> {
        match self {
            PanelJob::StartNode { node_uuid } => Some(format!("start-node:{node_uuid}")),
            PanelJob::RestartProfile { profile_uuid } => {
                Some(format!("restart-profile:{profile_uuid}"))
            }
            _ => None,
        }
    }
}

/// Queue classes.
#[derive(Clone)]
pub struct Queues {
    /// User add/remove RPCs and desync planning.
    pub user: WorkQueue<PanelJob>,
    /// Node start and profile restarts.
    pub control: WorkQueue<PanelJob>,
    /// Rate-capped notification delivery.
    pub notify: WorkQueue<PanelJob>,
}

impl Queues {
    pub(crate) fn start(runner: Arc<JobRunner>, settings: &PanelSettings) -> Self {
        Self {
            user: WorkQueue::start(
                QueueOptions::new("user", settings.user_concurrency),
                runner.clone(),
            ),
            control: WorkQueue::start(
                QueueOptions::new("control", settings.control_concurrency),
                runner.clone(),
            ),
            notify: WorkQueue::start(
                QueueOptions::new("notify", settings.notify_concurrency)
                    .rate_limit(settings.notify_max_per_window, settings.notify_window),
                runner,
            ),
        }
    }

    fn all(&self) -> [&WorkQueue<PanelJob>; 3] {
        [&self.user, &self.control, &self.notify]
    }

    /// Wait until every queue is empty, including jobs queued by jobs.
    pub async fn wait_idle(&self) {
        loop {
            for queue in self.all() {
                queue.wait_idle().await;
            }
            if self.all().iter().all(|q| q.depth() == 0) {
                return;
            }
        }
    }

    pub fn shutdown(&self) {
        for queue in self.all() {
            queue.shutdown();
        }
    }
}

/// Executes queued jobs against the panel that owns the queues.
pub(crate) struct JobRunner {
    pub(crate) panel: Weak<Panel>,
}

#[async_trait]
impl JobHandler for JobRunner {
    type Job = PanelJob;
    type Error = PanelError;

    async fn handle(&self, job: PanelJob) -> Result<(), PanelError> {
        let panel = self.panel.upgrade().ok_or(PanelError::ShuttingDown)?;
        match job {
            PanelJob::Node(target) => panel.execute_node_command(target).await,
            PanelJob::DesyncUser(key) => panel.desync_user(&key).await.map(|_| ()),
            PanelJob::StartNode { node_uuid } => panel.start_node(&node_uuid).await,
            PanelJob::RestartProfile { profile_uuid } => {
                panel.restart_profile(&profile_uuid).await.map(|_| ())
            }
            PanelJob::Notify(event) => panel.deliver_notification(&event).await,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn only_control_jobs_are_deduplicated() {
        let start = PanelJob::StartNode {
            node_uuid: "n1".into(),
        };
        let restart = PanelJob::RestartProfile {
            profile_uuid: "p1".into(),
        };
        let desync = PanelJob::DesyncUser(RemovalKey {
            t_id: 1,
            vless_uuid: "v".into(),
            prev_vless_uuid: None,
        });

        assert_eq!(start.dedup_key().as_deref(), Some("start-node:n1"));
        assert_eq!(restart.dedup_key().as_deref(), Some("restart-profile:p1"));
        assert!(desync.dedup_key().is_none());
        assert_eq!(desync.kind(), "desync_user");
    }
}
