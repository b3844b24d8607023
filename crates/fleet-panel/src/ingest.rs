//! Usage recording sweep.
//!
//! Pulls per-user counters from every connected node, weights them by the
//! node's consumption multiplier and applies the whole sweep to the ledger
//! as one batch.

use fleet_events::FleetEvent;
use fleet_ledger::{NodeRecord, UsageHistoryEntry, UsageSample, now_millis};
use fleet_node::{NodeAddr, UserUsage};
use fleet_queue::map_bounded;
use tracing::{debug, warn};

use crate::cascade::user_ref;
use crate::error::PanelError;
use crate::panel::Panel;

/// Result of one usage sweep.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct UsageSweep {
    pub nodes_polled: usize,
    pub nodes_failed: usize,
    pub samples: usize,
    pub users_updated: usize,
    pub first_connections: usize,
}

/// Samples and history rows derived from one node's report.
#[derive(Debug, Default)]
pub(crate) struct NodeUsage {
    pub samples: Vec<UsageSample>,
    pub history: Vec<UsageHistoryEntry>,
    /// Unweighted bytes reported by the node.
    pub raw_total: i64,
}

/// Convert a node report into ledger samples.
///
/// Usernames that are not user ids are ignored, as are empty counters.
pub(crate) fn node_usage(node: &NodeRecord, report: &[UserUsage]) -> NodeUsage {
    let mut usage = NodeUsage::default();
    for entry in report {
        let Ok(t_id) = entry.username.parse::<i64>() else {
            debug!(node = %node.uuid, username = %entry.username, "ignoring unknown usage entry");
            continue;
        };
        let raw = i64::try_from(entry.total()).unwrap_or(i64::MAX);
        if raw <= 0 {
            continue;
        }
        usage.raw_total = usage.raw_total.saturating_add(raw);
        usage.history.push(UsageHistoryEntry {
            node_uuid: node.uuid.clone(),
            t_id,
            bytes: raw,
        });

        let weighted = (raw as f64 * node.consumption_multiplier).round() as i64;
        if weighted > 0 {
            usage.samples.push(UsageSample {
                t_id,
                delta_bytes: weighted,
                node_uuid: node.uuid.clone(),
            });
        }
    }
    usage
}

/// Total weighted bytes of a sweep, saturating at `i64::MAX`.
fn sampled_bytes(samples: &[UsageSample]) -> u64 {
    let total = samples
        .iter()
        .map(|s| s.delta_bytes)
        .fold(0i64, i64::saturating_add);
    u64::try_from(total).unwrap_or(0)
}

impl Panel {
    /// One usage-recording sweep.
    ///
    /// A node that cannot be polled is skipped. If the ledger batch fails
    /// nothing is applied; the next sweep starts from fresh counters.
    pub async fn record_usage(&self) -> Result<UsageSweep, PanelError> {
        let nodes: Vec<NodeRecord> = self
            .ctx
            .ledger
            .list_nodes()
            .await?
            .into_iter()
            .filter(|n| !n.is_disabled && n.is_connected)
            .collect();

        let mut sweep = UsageSweep {
            nodes_polled: nodes.len(),
            ..Default::default()
        };

        let api = &self.ctx.nodes;
        let reports = map_bounded(nodes, self.ctx.settings.fanout_concurrency, |node| async move {
            let addr = NodeAddr::new(node.address.clone(), node.port);
            let result = api.fetch_user_usage(&addr, true).await;
            (node, result)
        })
        .await;

        let mut samples = Vec::new();
        let mut history = Vec::new();
        let mut node_totals = Vec::new();
        for (node, result) in reports {
            match result {
                Ok(report) => {
                    let usage = node_usage(&node, &report);
                    samples.extend(usage.samples);
                    history.extend(usage.history);
                    node_totals.push((node.uuid, usage.raw_total));
                }
                Err(e) => {
                    sweep.nodes_failed += 1;
                    fleet_metrics::record_rpc_failure(e.kind());
                    warn!(node = %node.uuid, error = %e, "usage fetch failed");
                }
            }
        }
        sweep.samples = samples.len();

        let outcome = match self.ctx.ledger.apply_usage_batch(&samples).await {
            Ok(outcome) => outcome,
            Err(e) => {
                fleet_metrics::record_ledger_failure("apply_usage_batch");
                warn!(samples = samples.len(), error = %e, "usage batch rolled back");
                return Err(e.into());
            }
        };
        sweep.users_updated = outcome.updated;
        sweep.first_connections = outcome.first_connections.len();

        fleet_metrics::record_usage_applied(samples.len() as u64, sampled_bytes(&samples));
        fleet_metrics::record_first_connections(outcome.first_connections.len() as u64);

        for identity in outcome.first_connections {
            self.publish(&FleetEvent::FirstConnected {
                user: user_ref(identity),
            });
        }

        for (node_uuid, total) in &node_totals {
            if let Err(e) = self.ctx.ledger.add_node_traffic(node_uuid, *total).await {
                warn!(node = %node_uuid, error = %e, "failed to add node traffic");
            }
        }
        if let Err(e) = self
            .ctx
            .ledger
            .record_usage_history(&history, now_millis())
            .await
        {
            fleet_metrics::record_ledger_failure("record_usage_history");
            warn!(rows = history.len(), error = %e, "failed to record usage history");
        }

        debug!(?sweep, "usage sweep finished");
        Ok(sweep)
    }
}
