//! Threshold watermarks, status scans, and period resets.

use std::collections::BTreeSet;

use sqlx::Row;
use tracing::debug;

use crate::backend::{Ledger, now_millis, parse_identity};
use crate::error::LedgerError;
use crate::model::{ResetOutcome, ThresholdCrossing, TrafficLimitStrategy, UserIdentity};
use crate::queries;

impl Ledger {
    /// Claim users that crossed a configured percentage of their limit.
    ///
    /// Each user is reported once at the highest percentage reached above
    /// its stored watermark, and the watermark is raised in the same
    /// statement, so an unchanged ledger yields nothing on the next call.
    /// At most `limit` users are claimed, oldest accounts first.
    pub async fn evaluate_thresholds(
        &self,
        percentages: &[u8],
        limit: u32,
    ) -> Result<Vec<ThresholdCrossing>, LedgerError> {
        let percentages: BTreeSet<i64> = percentages
            .iter()
            .filter(|p| (1..=100).contains(*p))
            .map(|p| i64::from(*p))
            .collect();
        if percentages.is_empty() || limit == 0 {
            return Ok(Vec::new());
        }

        let statement = queries::evaluate_thresholds(percentages.len());
        let statement = self.sql(&statement);
        let mut query = sqlx::query(&statement);
        for pct in &percentages {
            query = query.bind(*pct);
        }
        let rows = query
            .bind(i64::from(limit))
            .fetch_all(self.pool())
            .await?;

        let crossings = rows
            .iter()
            .map(|row| {
                Ok(ThresholdCrossing {
                    user: parse_identity(row)?,
                    watermark: row.try_get("last_triggered_threshold")?,
                })
            })
            .collect::<Result<Vec<_>, LedgerError>>()?;
        debug!(count = crossings.len(), "thresholds evaluated");
        Ok(crossings)
    }

    /// Reset the traffic of every user on `strategy`.
    ///
    /// Limited users go back to Active with zeroed counters in one
    /// statement; the remaining users of the strategy get their counters
    /// zeroed in a second statement of the same transaction.
    pub async fn reset_period_batch(
        &self,
        strategy: TrafficLimitStrategy,
    ) -> Result<ResetOutcome, LedgerError> {
        if strategy == TrafficLimitStrategy::NoReset {
            return Ok(ResetOutcome::default());
        }

        let now = now_millis();
        let mut tx = self.pool().begin().await?;

        let rows = sqlx::query(&self.sql(queries::RESET_PERIOD_REACTIVATE))
            .bind(now)
            .bind(strategy.as_str())
            .fetch_all(&mut *tx)
            .await?;
        let reactivated = rows
            .iter()
            .map(parse_identity)
            .collect::<Result<Vec<_>, _>>()?;

        let reset = sqlx::query(&self.sql(queries::RESET_PERIOD_COUNTERS))
            .bind(now)
            .bind(strategy.as_str())
            .bind(now)
            .execute(&mut *tx)
            .await?
            .rows_affected();

        tx.commit().await?;
        debug!(%strategy, reactivated = reactivated.len(), reset, "period reset applied");
        Ok(ResetOutcome { reactivated, reset })
    }

    /// Move Active users at or over their limit to Limited.
    pub async fn mark_limited_users(&self) -> Result<Vec<UserIdentity>, LedgerError> {
        let rows = sqlx::query(queries::MARK_LIMITED)
            .fetch_all(self.pool())
            .await?;
        rows.iter().map(parse_identity).collect()
    }

    /// Move Active or Limited users whose expiry has passed to Expired.
    pub async fn mark_expired_users(&self, now: i64) -> Result<Vec<UserIdentity>, LedgerError> {
        let rows = sqlx::query(&self.sql(queries::MARK_EXPIRED))
            .bind(now)
            .fetch_all(self.pool())
            .await?;
        rows.iter().map(parse_identity).collect()
    }
}
