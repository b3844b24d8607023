//! Usage ingestion and node accounting.

use std::collections::BTreeMap;

use fleet_core::defaults::USAGE_BATCH_CHUNK;
use sqlx::Row;
use tracing::debug;

use crate::backend::{Ledger, parse_identity};
use crate::error::LedgerError;
use crate::model::{UsageHistoryEntry, UsageOutcome, UsageSample};
use crate::queries;

/// History rows bound into one insert (four parameters each).
const HISTORY_CHUNK: usize = 5000;

impl Ledger {
    /// Apply node-reported usage to the user counters.
    ///
    /// Samples for the same user are summed first; the last sample's node
    /// becomes `last_connected_node_uuid`. The whole batch runs in one
    /// transaction: on any failure nothing is applied and the error is
    /// returned for the caller to log. Users seen for the first time are
    /// returned in [`UsageOutcome::first_connections`].
    pub async fn apply_usage_batch(
        &self,
        samples: &[UsageSample],
    ) -> Result<UsageOutcome, LedgerError> {
        let aggregated = aggregate_samples(samples);
        if aggregated.is_empty() {
            return Ok(UsageOutcome::default());
        }

        let now = self.next_stamp();
        let mut outcome = UsageOutcome::default();
        let mut tx = self.pool().begin().await?;

        for chunk in aggregated.chunks(USAGE_BATCH_CHUNK) {
            let statement = queries::apply_usage_batch(chunk.len());
            let statement = self.sql(&statement);

            let mut query = sqlx::query(&statement);
            for sample in chunk {
                query = query
                    .bind(sample.t_id)
                    .bind(sample.delta_bytes)
                    .bind(&sample.node_uuid);
            }
            let rows = query.bind(now).bind(now).fetch_all(&mut *tx).await?;

            for row in &rows {
                outcome.updated += 1;
                let first: i64 = row.try_get("first_connection")?;
                if first != 0 {
                    outcome.first_connections.push(parse_identity(row)?);
                }
            }
        }

        tx.commit().await?;
        debug!(
            samples = samples.len(),
            updated = outcome.updated,
            first = outcome.first_connections.len(),
            "usage batch applied"
        );
        Ok(outcome)
    }

    /// Add raw reported bytes to a node's accounting counter.
    pub async fn add_node_traffic(&self, node_uuid: &str, bytes: i64) -> Result<(), LedgerError> {
        if bytes <= 0 {
            return Ok(());
        }
        sqlx::query(&self.sql(queries::ADD_NODE_TRAFFIC))
            .bind(bytes)
            .bind(node_uuid)
            .execute(self.pool())
            .await?;
        Ok(())
    }

    /// Zero the counters of nodes whose reset day is `day_of_month`.
    pub async fn reset_node_traffic(&self, day_of_month: u32) -> Result<u64, LedgerError> {
        let result = sqlx::query(&self.sql(queries::RESET_NODE_TRAFFIC_BY_DAY))
            .bind(i64::from(day_of_month))
            .execute(self.pool())
            .await?;
        Ok(result.rows_affected())
    }

    /// Append per-(node, user) usage rows stamped with `recorded_at`.
    pub async fn record_usage_history(
        &self,
        entries: &[UsageHistoryEntry],
        recorded_at: i64,
    ) -> Result<(), LedgerError> {
        if entries.is_empty() {
            return Ok(());
        }
        let mut tx = self.pool().begin().await?;
        for chunk in entries.chunks(HISTORY_CHUNK) {
            let statement = queries::insert_usage_history(chunk.len());
            let statement = self.sql(&statement);
            let mut query = sqlx::query(&statement);
            for entry in chunk {
                query = query
                    .bind(&entry.node_uuid)
                    .bind(entry.t_id)
                    .bind(entry.bytes)
                    .bind(recorded_at);
            }
            query.execute(&mut *tx).await?;
        }
        tx.commit().await?;
        Ok(())
    }

    /// Delete history rows recorded before `older_than` (unix millis).
    pub async fn cleanup_usage_history(&self, older_than: i64) -> Result<u64, LedgerError> {
        let result = sqlx::query(&self.sql(queries::CLEANUP_USAGE_HISTORY))
            .bind(older_than)
            .execute(self.pool())
            .await?;
        Ok(result.rows_affected())
    }
}

/// Sum deltas per user, dropping empty ones.
///
/// A user can appear in reports from several nodes within one sweep; a
/// set-based `UPDATE .. FROM` would apply only one of the joined rows.
pub(crate) fn aggregate_samples(samples: &[UsageSample]) -> Vec<UsageSample> {
    let mut by_user: BTreeMap<i64, UsageSample> = BTreeMap::new();
    for sample in samples.iter().filter(|s| s.delta_bytes > 0) {
        by_user
            .entry(sample.t_id)
            .and_modify(|agg| {
                agg.delta_bytes = agg.delta_bytes.saturating_add(sample.delta_bytes);
                agg.node_uuid.clone_from(&sample.node_uuid);
            })
            .or_insert_with(|| sample.clone());
    }
    by_user.into_values().collect()
}
