//! Threshold, limit, expiry and reset jobs.

use fleet_events::FleetEvent;
use fleet_ledger::{TrafficLimitStrategy, now_millis};
use tracing::{debug, info};

use crate::cascade::user_ref;
use crate::error::PanelError;
use crate::panel::Panel;

impl Panel {
    /// One threshold tick: report watermarks, then limit users over 100%.
    ///
    /// Watermarks are claimed first so a user who jumps past the limit in
    /// one ingestion cycle still gets the highest percentage reported.
    /// Both halves run even when the other fails.
    pub async fn check_thresholds(&self) -> Result<(usize, usize), PanelError> {
        let crossed = self.evaluate_thresholds().await;
        let limited = self.mark_limited().await;
        Ok((crossed?, limited?))
    }

    /// Claim newly crossed percentage watermarks and announce them.
    pub async fn evaluate_thresholds(&self) -> Result<usize, PanelError> {
        let settings = &self.ctx.settings;
        let crossings = self
            .ctx
            .ledger
            .evaluate_thresholds(&settings.threshold_percentages, settings.threshold_batch_limit)
            .await
            .inspect_err(|_| fleet_metrics::record_ledger_failure("evaluate_thresholds"))?;

        let count = crossings.len();
        fleet_metrics::record_thresholds_crossed(count as u64);
        for crossing in crossings {
            self.publish(&FleetEvent::ThresholdReached {
                user: user_ref(crossing.user),
                percentage: crossing.watermark,
            });
        }
        if count > 0 {
            debug!(count, "threshold crossings published");
        }
        Ok(count)
    }

    /// Move users over their limit to Limited. Each one is then evicted
    /// from the fleet through the event cascade.
    pub async fn mark_limited(&self) -> Result<usize, PanelError> {
        let users = self
            .ctx
            .ledger
            .mark_limited_users()
            .await
            .inspect_err(|_| fleet_metrics::record_ledger_failure("mark_limited_users"))?;

        let count = users.len();
        fleet_metrics::record_user_transitions("limited", count as u64);
        for identity in users {
            self.publish(&FleetEvent::UserLimited {
                user: user_ref(identity),
            });
        }
        if count > 0 {
            info!(count, "users limited");
        }
        Ok(count)
    }

    /// Move users past their expiry to Expired.
    pub async fn mark_expired(&self) -> Result<usize, PanelError> {
        let users = self
            .ctx
            .ledger
            .mark_expired_users(now_millis())
            .await
            .inspect_err(|_| fleet_metrics::record_ledger_failure("mark_expired_users"))?;

        let count = users.len();
        fleet_metrics::record_user_transitions("expired", count as u64);
        for identity in users {
            self.publish(&FleetEvent::UserExpired {
                user: user_ref(identity),
            });
        }
        if count > 0 {
            info!(count, "users expired");
        }
        Ok(count)
    }

    /// Reset every user on `strategy` and re-provision the ones that were
    /// Limited.
    pub async fn reset_period(&self, strategy: TrafficLimitStrategy) -> Result<u64, PanelError> {
        let outcome = self
            .ctx
            .ledger
            .reset_period_batch(strategy)
            .await
            .inspect_err(|_| fleet_metrics::record_ledger_failure("reset_period_batch"))?;

        fleet_metrics::record_user_transitions("reset", outcome.reset + outcome.reactivated.len() as u64);
        let t_ids: Vec<i64> = outcome.reactivated.iter().map(|u| u.t_id).collect();
        let queued = self.sync_users(&t_ids).await?;

        info!(
            %strategy,
            reset = outcome.reset,
            reactivated = t_ids.len(),
            queued,
            "traffic period reset"
        );
        Ok(outcome.reset + t_ids.len() as u64)
    }

    /// Explicit reset of one user's period traffic.
    pub async fn reset_user_traffic(&self, t_id: i64) -> Result<(), PanelError> {
        let reactivated = self.ctx.ledger.reset_user_traffic(t_id).await?;
        fleet_metrics::record_user_transitions("reset", 1);
        if reactivated {
            self.sync_user(t_id, None).await?;
        }
        Ok(())
    }
}
