//! Shared handles and tunables every panel operation runs against.

use std::sync::Arc;
use std::time::Duration;

use fleet_config::Config;
use fleet_core::defaults::*;
use fleet_ledger::Ledger;
use fleet_node::NodeApi;

/// Tunables derived from the `queues` and `thresholds` config sections.
#[derive(Debug, Clone)]
pub struct PanelSettings {
    pub user_concurrency: usize,
    pub fanout_concurrency: usize,
    pub control_concurrency: usize,
    pub notify_concurrency: usize,
    pub notify_max_per_window: u32,
    pub notify_window: Duration,
    pub profile_restart_retry: Duration,
    pub threshold_percentages: Vec<u8>,
    pub threshold_batch_limit: u32,
}

impl Default for PanelSettings {
    fn default() -> Self {
        Self {
            user_concurrency: DEFAULT_USER_QUEUE_CONCURRENCY,
            fanout_concurrency: DEFAULT_FANOUT_CONCURRENCY,
            control_concurrency: DEFAULT_CONTROL_QUEUE_CONCURRENCY,
            notify_concurrency: DEFAULT_NOTIFY_CONCURRENCY,
            notify_max_per_window: DEFAULT_NOTIFY_MAX_PER_WINDOW,
            notify_window: Duration::from_secs(DEFAULT_NOTIFY_WINDOW_SECS),
            profile_restart_retry: Duration::from_secs(DEFAULT_PROFILE_RESTART_RETRY_SECS),
            threshold_percentages: DEFAULT_THRESHOLD_PERCENTAGES.to_vec(),
            threshold_batch_limit: DEFAULT_THRESHOLD_BATCH_LIMIT,
        }
    }
}

impl PanelSettings {
    pub fn from_config(config: &Config) -> Self {
        let q = &config.queues;
        Self {
            user_concurrency: q.user_concurrency,
            fanout_concurrency: q.fanout_concurrency,
            control_concurrency: q.control_concurrency,
            notify_concurrency: q.notify_concurrency,
            notify_max_per_window: q.notify_max_per_window,
            notify_window: Duration::from_secs(q.notify_window_secs),
            profile_restart_retry: Duration::from_secs(q.profile_restart_retry_secs),
            threshold_percentages: config.thresholds.percentages.clone(),
            threshold_batch_limit: config.thresholds.batch_limit,
        }
    }
}

/// Ledger, node transport and settings.
#[derive(Clone)]
pub struct PanelContext {
    pub ledger: Arc<Ledger>,
    pub nodes: Arc<dyn NodeApi>,
    pub settings: PanelSettings,
}

impl PanelContext {
    pub fn new(ledger: Arc<Ledger>, nodes: Arc<dyn NodeApi>, settings: PanelSettings) -> Self {
        Self {
            ledger,
            nodes,
            settings,
        }
    }
}
