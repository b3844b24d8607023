//! Metrics collection and Prometheus exporter for the fleet control plane.
//!
//! Covers node dispatch, RPC failures, usage accounting, threshold and
//! status transitions, and work-queue pressure.

use std::net::SocketAddr;

use metrics::{counter, gauge};
use metrics_exporter_prometheus::PrometheusBuilder;

/// Initialize Prometheus metrics exporter.
///
/// Starts an HTTP server on the given address to expose metrics.
/// Returns an error message if binding fails.
pub fn init_prometheus(listen: &str) -> Result<(), String> {
    let addr: SocketAddr = listen
        .parse()
        .map_err(|e| format!("invalid metrics listen address: {}", e))?;

    PrometheusBuilder::new()
        .with_http_listener(addr)
        .install()
        .map_err(|e| format!("failed to install prometheus exporter: {}", e))?;

    Ok(())
}

// ============================================================================
// Metric Names
// ============================================================================

/// Node jobs executed, by kind and outcome.
pub const NODE_JOBS_TOTAL: &str = "fleet_node_jobs_total";
/// Failed node RPCs, by error kind.
pub const RPC_FAILURES_TOTAL: &str = "fleet_rpc_failures_total";
/// Aggregated usage samples applied to the ledger.
pub const USAGE_SAMPLES_TOTAL: &str = "fleet_usage_samples_total";
/// Bytes (after consumption multiplier) applied to user counters.
pub const USAGE_BYTES_TOTAL: &str = "fleet_usage_bytes_total";
/// Users connecting for the first time.
pub const FIRST_CONNECTIONS_TOTAL: &str = "fleet_first_connections_total";
/// Threshold watermarks raised.
pub const THRESHOLDS_CROSSED_TOTAL: &str = "fleet_thresholds_crossed_total";
/// Users moved to a new status, by status.
pub const USER_TRANSITIONS_TOTAL: &str = "fleet_user_transitions_total";
/// Payload entries skipped, by reason.
pub const PAYLOAD_SKIPPED_TOTAL: &str = "fleet_payload_skipped_total";
/// Ledger statement failures, by operation.
pub const LEDGER_FAILURES_TOTAL: &str = "fleet_ledger_failures_total";
/// Domain events published, by kind.
pub const EVENTS_TOTAL: &str = "fleet_events_total";
/// Jobs rejected by per-key deduplication, by queue.
pub const QUEUE_DUPLICATES_TOTAL: &str = "fleet_queue_duplicates_total";
/// Jobs waiting or running, by queue.
pub const QUEUE_DEPTH: &str = "fleet_queue_depth";
/// Nodes per connectivity state.
pub const NODES: &str = "fleet_nodes";

// ============================================================================
// Metric Recording Functions
// ============================================================================

/// Record a finished node job.
#[inline]
pub fn record_node_job(kind: &'static str, ok: bool) {
    let outcome = if ok { "ok" } else { "error" };
    counter!(NODE_JOBS_TOTAL, "kind" => kind, "outcome" => outcome).increment(1);
}

/// Record a failed RPC.
#[inline]
pub fn record_rpc_failure(kind: &'static str) {
    counter!(RPC_FAILURES_TOTAL, "kind" => kind).increment(1);
}

/// Record an applied usage batch.
#[inline]
pub fn record_usage_applied(samples: u64, bytes: u64) {
    counter!(USAGE_SAMPLES_TOTAL).increment(samples);
    counter!(USAGE_BYTES_TOTAL).increment(bytes);
}

#[inline]
pub fn record_first_connections(count: u64) {
    counter!(FIRST_CONNECTIONS_TOTAL).increment(count);
}

#[inline]
pub fn record_thresholds_crossed(count: u64) {
    counter!(THRESHOLDS_CROSSED_TOTAL).increment(count);
}

/// Record users moved to `status` (e.g. "limited", "expired", "reset").
#[inline]
pub fn record_user_transitions(status: &'static str, count: u64) {
    counter!(USER_TRANSITIONS_TOTAL, "status" => status).increment(count);
}

#[inline]
pub fn record_payload_skipped(reason: &'static str) {
    counter!(PAYLOAD_SKIPPED_TOTAL, "reason" => reason).increment(1);
}

#[inline]
pub fn record_ledger_failure(operation: &'static str) {
    counter!(LEDGER_FAILURES_TOTAL, "operation" => operation).increment(1);
}

#[inline]
pub fn record_event(kind: &'static str) {
    counter!(EVENTS_TOTAL, "kind" => kind).increment(1);
}

#[inline]
pub fn record_queue_duplicate(queue: &'static str) {
    counter!(QUEUE_DUPLICATES_TOTAL, "queue" => queue).increment(1);
}

/// Set the number of jobs waiting or running in a queue.
#[inline]
pub fn set_queue_depth(queue: &'static str, depth: usize) {
    gauge!(QUEUE_DEPTH, "queue" => queue).set(depth as f64);
}

/// Set the number of nodes in a connectivity state.
#[inline]
pub fn set_nodes(state: &'static str, count: usize) {
    gauge!(NODES, "state" => state).set(count as f64);
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rejects_invalid_listen_address() {
        let err = init_prometheus("not-an-address").unwrap_err();
        assert!(err.contains("invalid metrics listen address"));
    }

    #[test]
    fn recording_without_recorder_is_noop() {
        record_node_job("add_user", true);
        record_queue_duplicate("control");
        set_nodes("connected", 3);
    }
}
