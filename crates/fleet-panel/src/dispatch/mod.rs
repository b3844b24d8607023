//! Fleet command dispatcher.
//!
//! Turns a changed user (or set of users) into per-node RPC jobs. Each
//! node's jobs are computed and executed independently, so one failing
//! node never holds back the others.

mod payload;
mod plan;

pub use payload::{PayloadError, build_payload, node_username};
pub use plan::{
    DispatchTarget, NodeCommand, NodeTarget, RemovalKey, node_entries, plan_bulk_desync,
    plan_bulk_sync, plan_desync, plan_user_sync,
};

use fleet_ledger::UserStatus;
use fleet_node::{IpListRequest, NodeAddr};
use tracing::{debug, warn};

use crate::error::PanelError;
use crate::jobs::PanelJob;
use crate::panel::Panel;

impl Panel {
    /// Provision one user on every eligible node.
    ///
    /// `prev_vless_uuid` is set after a credential rotation so nodes can
    /// evict sessions still using the old key. A missing or non-active user
    /// is a no-op. Returns the number of jobs queued.
    pub async fn sync_user(
        &self,
        t_id: i64,
        prev_vless_uuid: Option<&str>,
    ) -> Result<usize, PanelError> {
        let Some(user) = self.ctx.ledger.resolve_user(t_id).await? else {
            debug!(t_id, "sync skipped: user not found");
            return Ok(0);
        };
        if user.status != UserStatus::Active {
            debug!(t_id, status = %user.status, "sync skipped: user not active");
            return Ok(0);
        }

        let nodes = self.ctx.ledger.list_nodes().await?;
        Ok(self.submit_targets(plan_user_sync(&user, prev_vless_uuid, &nodes)))
    }

    /// Bulk variant of [`Panel::sync_user`].
    pub async fn sync_users(&self, t_ids: &[i64]) -> Result<usize, PanelError> {
        if t_ids.is_empty() {
            return Ok(0);
        }
        let users: Vec<_> = self
            .ctx
            .ledger
            .resolve_users(t_ids)
            .await?
            .into_iter()
            .filter(|u| u.status == UserStatus::Active)
            .collect();
        if users.is_empty() {
            return Ok(0);
        }

        let nodes = self.ctx.ledger.list_nodes().await?;
        Ok(self.submit_targets(plan_bulk_sync(&users, &nodes)))
    }

    /// Remove one user from every connected node.
    pub async fn desync_user(&self, key: &RemovalKey) -> Result<usize, PanelError> {
        let nodes = self.ctx.ledger.list_nodes().await?;
        Ok(self.submit_targets(plan_desync(key, &nodes)))
    }

    /// Bulk variant of [`Panel::desync_user`].
    pub async fn desync_users(&self, keys: &[RemovalKey]) -> Result<usize, PanelError> {
        if keys.is_empty() {
            return Ok(0);
        }
        let nodes = self.ctx.ledger.list_nodes().await?;
        Ok(self.submit_targets(plan_bulk_desync(keys, &nodes)))
    }

    /// Replace a user's protocol secrets and push the new ones.
    pub async fn rotate_user_credentials(
        &self,
        t_id: i64,
        vless_uuid: &str,
        trojan_password: &str,
        ss_password: &str,
    ) -> Result<usize, PanelError> {
        let previous = self
            .ctx
            .ledger
            .rotate_credentials(t_id, vless_uuid, trojan_password, ss_password)
            .await?;
        self.sync_user(t_id, Some(&previous)).await
    }

    /// Addresses currently connected to `node_uuid` as user `t_id`.
    pub async fn fetch_connected_ips(
        &self,
        node_uuid: &str,
        t_id: i64,
    ) -> Result<Vec<String>, PanelError> {
        let addr = self.node_addr(node_uuid).await?;
        Ok(self
            .ctx
            .nodes
            .fetch_connected_ips(&addr, &node_username(t_id))
            .await?)
    }

    pub async fn block_ips(&self, node_uuid: &str, ips: Vec<String>) -> Result<(), PanelError> {
        let addr = self.node_addr(node_uuid).await?;
        Ok(self.ctx.nodes.block_ips(&addr, &IpListRequest { ips }).await?)
    }

    pub async fn unblock_ips(&self, node_uuid: &str, ips: Vec<String>) -> Result<(), PanelError> {
        let addr = self.node_addr(node_uuid).await?;
        Ok(self
            .ctx
            .nodes
            .unblock_ips(&addr, &IpListRequest { ips })
            .await?)
    }

    async fn node_addr(&self, node_uuid: &str) -> Result<NodeAddr, PanelError> {
        let node = self
            .ctx
            .ledger
            .get_node(node_uuid)
            .await?
            .ok_or_else(|| PanelError::NodeNotFound(node_uuid.to_string()))?;
        Ok(NodeAddr::new(node.address, node.port))
    }

    /// Queue one job per target. Returns how many were accepted.
    pub(crate) fn submit_targets(&self, targets: Vec<DispatchTarget>) -> usize {
        let mut queued = 0;
        for target in targets {
            let node = target.node.uuid.clone();
            match self.queues.user.submit(PanelJob::Node(target)) {
                fleet_queue::SubmitOutcome::Queued => queued += 1,
                outcome => warn!(node = %node, ?outcome, "dispatch job not queued"),
            }
        }
        queued
    }

    /// Run one node command. Failures are reported to the caller and
    /// affect nothing but this job.
    pub(crate) async fn execute_node_command(
        &self,
        target: DispatchTarget,
    ) -> Result<(), PanelError> {
        let api = &self.ctx.nodes;
        let addr = &target.node.addr;
        let kind = target.command.kind();

        let result = match &target.command {
            NodeCommand::AddUser(req) => api.add_user(addr, req).await,
            NodeCommand::RemoveUser(req) => api.remove_user(addr, req).await,
            NodeCommand::AddUsers(req) => api.add_users(addr, req).await,
            NodeCommand::RemoveUsers(req) => api.remove_users(addr, req).await,
        };

        fleet_metrics::record_node_job(kind, result.is_ok());
        result.map_err(|e| {
            fleet_metrics::record_rpc_failure(e.kind());
            warn!(node = %target.node.uuid, %addr, job = kind, error = %e, "node command failed");
            PanelError::from(e)
        })
    }
}
