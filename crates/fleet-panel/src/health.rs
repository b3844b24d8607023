//! Node health and lifecycle.
//!
//! Nodes move between Disabled, Connecting, Connected and Offline. Health
//! ticks probe every enabled node that is not mid-start; starts and
//! restarts go through the control queue, deduplicated per node and per
//! profile.

use std::collections::{BTreeMap, BTreeSet, HashSet};

use fleet_events::FleetEvent;
use fleet_ledger::{NodeRecord, NodeState, ResolvedProfile};
use fleet_node::{InboundUsers, NodeAddr, StartRequest};
use fleet_queue::{SubmitOutcome, map_bounded};
use tracing::{debug, info, warn};

use crate::cascade::node_ref;
use crate::dispatch::{NodeTarget, build_payload};
use crate::error::PanelError;
use crate::jobs::PanelJob;
use crate::panel::Panel;

const NO_PROFILE_MESSAGE: &str = "no active config profile";

/// Outcome of probing one node.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HealthOutcome {
    /// Reachable with the proxy running.
    Healthy,
    /// Reachable, but a start was queued.
    StartQueued,
    Unreachable,
    Skipped,
}

impl Panel {
    /// One health-check tick over the fleet.
    pub async fn check_nodes(&self) -> Result<Vec<(String, HealthOutcome)>, PanelError> {
        let nodes = self.ctx.ledger.list_nodes().await?;
        report_node_states(&nodes);

        let probes = nodes
            .into_iter()
            .filter(|n| !matches!(n.state(), NodeState::Disabled | NodeState::Connecting));
        let outcomes = map_bounded(probes, self.ctx.settings.fanout_concurrency, |node| async move {
            let outcome = self.check_node(&node).await;
            (node.uuid, outcome)
        })
        .await;
        Ok(outcomes)
    }

    /// Probe one node and reconcile its ledger state.
    pub async fn check_node(&self, node: &NodeRecord) -> HealthOutcome {
        if node.is_disabled || node.is_connecting {
            return HealthOutcome::Skipped;
        }
        let addr = NodeAddr::new(node.address.clone(), node.port);

        match self.ctx.nodes.health(&addr).await {
            Ok(health) if health.proxy_running && node.is_connected => {
                match self
                    .ctx
                    .ledger
                    .mark_node_connected(&node.uuid, health.version.as_deref())
                    .await
                {
                    Ok(restored) => {
                        if restored {
                            self.publish(&FleetEvent::ConnectionRestored {
                                node: node_ref(node),
                            });
                        }
                    }
                    Err(e) => warn!(node = %node.uuid, error = %e, "failed to record node health"),
                }
                HealthOutcome::Healthy
            }
            Ok(health) => {
                debug!(
                    node = %node.uuid,
                    proxy_running = health.proxy_running,
                    was_connected = node.is_connected,
                    "node needs start"
                );
                self.queue_start(&node.uuid);
                HealthOutcome::StartQueued
            }
            Err(e) => {
                fleet_metrics::record_rpc_failure(e.kind());
                self.record_offline(node, &e.to_string()).await;
                HealthOutcome::Unreachable
            }
        }
    }

    pub(crate) fn queue_start(&self, node_uuid: &str) -> SubmitOutcome {
        self.queues.control.submit(PanelJob::StartNode {
            node_uuid: node_uuid.to_string(),
        })
    }

    /// Queue a restart of `profile_uuid`, retrying later if one is already
    /// in flight.
    pub fn queue_profile_restart(&self, profile_uuid: &str) -> SubmitOutcome {
        self.queues.control.submit_or_retry(
            PanelJob::RestartProfile {
                profile_uuid: profile_uuid.to_string(),
            },
            self.ctx.settings.profile_restart_retry,
        )
    }

    /// Restart every enabled node: one job per distinct profile, plus a
    /// start job for enabled nodes without one.
    pub async fn restart_all_nodes(&self) -> Result<usize, PanelError> {
        let nodes = self.ctx.ledger.list_nodes().await?;
        let mut profiles = BTreeSet::new();
        let mut queued = 0;

        for node in nodes.iter().filter(|n| !n.is_disabled) {
            match &node.active_config_profile_uuid {
                Some(profile) => {
                    profiles.insert(profile.clone());
                }
                None => {
                    if self.queue_start(&node.uuid) == SubmitOutcome::Queued {
                        queued += 1;
                    }
                }
            }
        }
        for profile in &profiles {
            if self.queue_profile_restart(profile) == SubmitOutcome::Queued {
                queued += 1;
            }
        }
        info!(profiles = profiles.len(), queued, "fleet restart queued");
        Ok(queued)
    }

    /// Start one node's proxy with its resolved config.
    pub async fn start_node(&self, node_uuid: &str) -> Result<(), PanelError> {
        let Some(node) = self.ctx.ledger.get_node(node_uuid).await? else {
            debug!(node = %node_uuid, "start skipped: node not found");
            return Ok(());
        };
        if node.is_disabled {
            return Ok(());
        }
        let Some(profile_uuid) = node.active_config_profile_uuid.clone() else {
            self.record_offline(&node, NO_PROFILE_MESSAGE).await;
            return Ok(());
        };

        let tags: HashSet<String> = node.active_inbounds.iter().map(|ib| ib.tag.clone()).collect();
        let Some(profile) = self
            .ctx
            .ledger
            .resolve_profile(&profile_uuid, Some(&tags))
            .await?
        else {
            self.record_offline(&node, NO_PROFILE_MESSAGE).await;
            return Ok(());
        };

        self.start_with(&node, start_request(&profile, &tags)).await;
        Ok(())
    }

    /// Restart every enabled node on `profile_uuid`, resolving the profile
    /// once. Returns how many nodes started.
    pub async fn restart_profile(&self, profile_uuid: &str) -> Result<usize, PanelError> {
        let Some(profile) = self.ctx.ledger.resolve_profile(profile_uuid, None).await? else {
            debug!(profile = %profile_uuid, "restart skipped: profile not found");
            return Ok(0);
        };

        let nodes: Vec<NodeRecord> = self
            .ctx
            .ledger
            .list_nodes()
            .await?
            .into_iter()
            .filter(|n| !n.is_disabled)
            .filter(|n| n.active_config_profile_uuid.as_deref() == Some(profile_uuid))
            .collect();

        let profile = &profile;
        let started = map_bounded(nodes, self.ctx.settings.fanout_concurrency, |node| async move {
            let tags: HashSet<String> =
                node.active_inbounds.iter().map(|ib| ib.tag.clone()).collect();
            self.start_with(&node, start_request(profile, &tags)).await
        })
        .await
        .into_iter()
        .filter(|ok| *ok)
        .count();

        info!(profile = %profile_uuid, started, "profile restart finished");
        Ok(started)
    }

    /// Send a start RPC and record the result. Returns `true` on success.
    async fn start_with(&self, node: &NodeRecord, request: StartRequest) -> bool {
        let target = NodeTarget::from(node);
        if let Err(e) = self.ctx.ledger.mark_node_connecting(&node.uuid).await {
            warn!(node = %node.uuid, error = %e, "failed to mark node connecting");
        }

        let result = self.ctx.nodes.start_proxy(&target.addr, &request).await;
        fleet_metrics::record_node_job("start_node", matches!(&result, Ok(r) if r.is_started));

        match result {
            Ok(resp) if resp.is_started => {
                match self
                    .ctx
                    .ledger
                    .mark_node_connected(&node.uuid, resp.version.as_deref())
                    .await
                {
                    Ok(true) => {
                        info!(node = %node.uuid, version = ?resp.version, "node connected");
                        self.publish(&FleetEvent::ConnectionRestored {
                            node: node_ref(node),
                        });
                    }
                    Ok(false) => {}
                    Err(e) => {
                        warn!(node = %node.uuid, error = %e, "failed to record node start");
                        // Leave the node eligible for the next health tick.
                        if let Err(e) = self.ctx.ledger.clear_node_connecting(&node.uuid).await {
                            warn!(node = %node.uuid, error = %e, "failed to clear connecting flag");
                        }
                    }
                }
                true
            }
            Ok(resp) => {
                let reason = resp
                    .error
                    .unwrap_or_else(|| "proxy process did not start".to_string());
                self.record_offline(node, &reason).await;
                false
            }
            Err(e) => {
                fleet_metrics::record_rpc_failure(e.kind());
                self.record_offline(node, &e.to_string()).await;
                false
            }
        }
    }

    async fn record_offline(&self, node: &NodeRecord, reason: &str) {
        warn!(node = %node.uuid, %reason, "node offline");
        match self.ctx.ledger.mark_node_offline(&node.uuid, reason).await {
            Ok(true) => {
                self.publish(&FleetEvent::ConnectionLost {
                    node: node_ref(node),
                    reason: reason.to_string(),
                });
            }
            Ok(false) => {}
            Err(e) => warn!(node = %node.uuid, error = %e, "failed to record node offline"),
        }
    }
}

/// Profile config plus every active user's payload for the node's inbounds.
pub fn start_request(profile: &ResolvedProfile, tags: &HashSet<String>) -> StartRequest {
    let inbounds = profile
        .inbounds
        .iter()
        .filter(|(inbound, _)| tags.contains(&inbound.tag))
        .map(|(inbound, users)| InboundUsers {
            tag: inbound.tag.clone(),
            users: users
                .iter()
                .filter_map(|user| match build_payload(inbound, user) {
                    Ok(payload) => Some(payload),
                    Err(e) => {
                        warn!(t_id = user.t_id, error = %e, "skipping inbound payload");
                        fleet_metrics::record_payload_skipped(
                            fleet_core::ERROR_UNSUPPORTED_PROTOCOL,
                        );
                        None
                    }
                })
                .collect(),
        })
        .collect();

    StartRequest {
        config: profile.config.clone(),
        inbounds,
    }
}

fn report_node_states(nodes: &[NodeRecord]) {
    let mut counts: BTreeMap<&'static str, usize> = [
        NodeState::Disabled,
        NodeState::Connecting,
        NodeState::Connected,
        NodeState::Offline,
    ]
    .into_iter()
    .map(|s| (s.as_str(), 0))
    .collect();
    for node in nodes {
        *counts.entry(node.state().as_str()).or_default() += 1;
    }
    for (state, count) in counts {
        fleet_metrics::set_nodes(state, count);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use fleet_ledger::{InboundRecord, UserCredentials};

    fn inbound(tag: &str, protocol: &str) -> InboundRecord {
        InboundRecord {
            uuid: format!("ib-{tag}"),
            profile_uuid: "p1".into(),
            tag: tag.into(),
            protocol: protocol.into(),
            network: None,
            security: None,
            method: None,
        }
    }

    fn creds(t_id: i64) -> UserCredentials {
        UserCredentials {
            t_id,
            uuid: format!("u-{t_id}"),
            username: format!("user{t_id}"),
            vless_uuid: format!("v-{t_id}"),
            trojan_password: format!("pw-{t_id}"),
            ss_password: format!("ss-{t_id}"),
        }
    }

    #[test]
    fn start_request_covers_node_tags_only() {
        let profile = ResolvedProfile {
            uuid: "p1".into(),
            name: "default".into(),
            config: serde_json::json!({"log": {"loglevel": "warning"}}),
            inbounds: vec![
                (inbound("A", "trojan"), vec![creds(1), creds(2)]),
                (inbound("B", "vless"), vec![creds(1)]),
                (inbound("X", "wireguard"), vec![creds(3)]),
            ],
        };
        let tags: HashSet<String> = ["A".to_string(), "X".to_string()].into();

        let req = start_request(&profile, &tags);
        assert_eq!(req.config["log"]["loglevel"], "warning");
        assert_eq!(req.inbounds.len(), 2);
        assert_eq!(req.inbounds[0].tag, "A");
        assert_eq!(req.inbounds[0].users.len(), 2);
        assert_eq!(req.inbounds[1].tag, "X");
        assert!(req.inbounds[1].users.is_empty());
    }
}
