//! Interval triggers driving the panel.

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Datelike, Utc};
use fleet_config::ScheduleConfig;
use fleet_ledger::{TrafficLimitStrategy, now_millis};
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::panel::Panel;

const MILLIS_PER_DAY: i64 = 86_400_000;

/// Runs every periodic trigger until cancelled.
pub struct Scheduler {
    panel: Arc<Panel>,
    schedule: ScheduleConfig,
}

impl Scheduler {
    pub fn new(panel: Arc<Panel>, schedule: ScheduleConfig) -> Self {
        Self { panel, schedule }
    }

    /// Run all triggers until `shutdown` is cancelled.
    pub async fn run(self, shutdown: CancellationToken) {
        let s = &self.schedule;
        let panel = &self.panel;

        if s.cold_start_restart {
            match panel.restart_all_nodes().await {
                Ok(queued) => info!(queued, "cold start restart queued"),
                Err(e) => warn!(error = %e, "cold start restart failed"),
            }
        }

        let health = every("health_check", secs(s.health_check_secs), &shutdown, || async move {
            if let Err(e) = panel.check_nodes().await {
                warn!(error = %e, "health check failed");
            }
        });

        let usage = every("usage_record", secs(s.usage_record_secs), &shutdown, || async move {
            if let Err(e) = panel.record_usage().await {
                warn!(error = %e, "usage sweep failed");
            }
        });

        let thresholds = every("thresholds", secs(s.threshold_secs), &shutdown, || async move {
            if let Err(e) = panel.check_thresholds().await {
                warn!(error = %e, "threshold tick failed");
            }
        });

        let expiry = every("expiry_scan", secs(s.expiry_scan_secs), &shutdown, || async move {
            if let Err(e) = panel.mark_expired().await {
                warn!(error = %e, "expiry scan failed");
            }
        });

        let mut clock = ResetClock::new(Utc::now());
        let resets = every("reset_check", secs(s.reset_check_secs), &shutdown, || {
            let due = clock.advance(Utc::now());
            async move {
                if let Some(day) = due.node_reset_day {
                    match panel.ctx.ledger.reset_node_traffic(day).await {
                        Ok(n) if n > 0 => info!(day, nodes = n, "node traffic reset"),
                        Ok(_) => {}
                        Err(e) => warn!(error = %e, "node traffic reset failed"),
                    }
                }
                for strategy in due.strategies {
                    if let Err(e) = panel.reset_period(strategy).await {
                        warn!(%strategy, error = %e, "traffic reset failed");
                    }
                }
            }
        });

        let retention = i64::from(s.history_retention_days) * MILLIS_PER_DAY;
        let cleanup = every("history_cleanup", secs(s.history_cleanup_secs), &shutdown, || async move {
            match panel.ctx.ledger.cleanup_usage_history(now_millis() - retention).await {
                Ok(n) if n > 0 => debug!(rows = n, "usage history cleaned"),
                Ok(_) => {}
                Err(e) => warn!(error = %e, "usage history cleanup failed"),
            }
        });

        tokio::join!(health, usage, thresholds, expiry, resets, cleanup);
        info!("scheduler stopped");
    }
}

fn secs(n: u64) -> Duration {
    Duration::from_secs(n.max(1))
}

/// Call `tick` every `period` until `shutdown` fires. A tick that overruns
/// its period causes the missed ticks to be skipped, not bunched up.
async fn every<F, Fut>(name: &'static str, period: Duration, shutdown: &CancellationToken, mut tick: F)
where
    F: FnMut() -> Fut,
    Fut: Future<Output = ()>,
{
    let mut interval = tokio::time::interval(period);
    interval.set_missed_tick_behavior(MissedTickBehavior::Skip);
    debug!(trigger = name, ?period, "trigger started");
    loop {
        tokio::select! {
            _ = shutdown.cancelled() => break,
            _ = interval.tick() => tick().await,
        }
    }
    debug!(trigger = name, "trigger stopped");
}

/// Reset work due after a clock advance.
#[derive(Debug, Default, PartialEq, Eq)]
pub struct DueResets {
    pub strategies: Vec<TrafficLimitStrategy>,
    /// Day of month whose nodes get their traffic counter zeroed.
    pub node_reset_day: Option<u32>,
}

/// Tracks which calendar boundaries (UTC) passed between checks.
#[derive(Debug)]
pub struct ResetClock {
    last: DateTime<Utc>,
}

impl ResetClock {
    pub fn new(now: DateTime<Utc>) -> Self {
        Self { last: now }
    }

    pub fn advance(&mut self, now: DateTime<Utc>) -> DueResets {
        let prev = std::mem::replace(&mut self.last, now);
        if now <= prev {
            return DueResets::default();
        }

        let mut due = DueResets::default();
        if prev.date_naive() != now.date_naive() {
            due.strategies.push(TrafficLimitStrategy::Day);
            due.node_reset_day = Some(now.day());
        }
        if prev.iso_week() != now.iso_week() {
            due.strategies.push(TrafficLimitStrategy::Week);
        }
        if (prev.year(), prev.month()) != (now.year(), now.month()) {
            due.strategies.push(TrafficLimitStrategy::Month);
        }
        due
    }
}
