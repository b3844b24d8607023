//! Node records and connectivity writes.

use std::collections::HashMap;

use sqlx::Row;
use sqlx::any::AnyRow;

use crate::backend::{Ledger, now_millis, parse_inbound_row, read_bool};
use crate::error::LedgerError;
use crate::model::{InboundRecord, NewNode, NodeRecord};
use crate::queries;

fn parse_node_row(row: &AnyRow) -> Result<NodeRecord, LedgerError> {
    let port: i64 = row.try_get("port")?;
    Ok(NodeRecord {
        uuid: row.try_get("uuid")?,
        name: row.try_get("name")?,
        address: row.try_get("address")?,
        port: u16::try_from(port).map_err(LedgerError::decode)?,
        is_disabled: read_bool(row, "is_disabled")?,
        is_connecting: read_bool(row, "is_connecting")?,
        is_connected: read_bool(row, "is_connected")?,
        last_status_message: row.try_get("last_status_message")?,
        last_status_change: row.try_get("last_status_change")?,
        active_config_profile_uuid: row.try_get("active_config_profile_uuid")?,
        traffic_used_bytes: row.try_get("traffic_used_bytes")?,
        consumption_multiplier: row.try_get("consumption_multiplier")?,
        traffic_reset_day: row.try_get("traffic_reset_day")?,
        proxy_version: row.try_get("proxy_version")?,
        created_at: row.try_get("created_at")?,
        active_inbounds: Vec::new(),
    })
}

impl Ledger {
    pub async fn create_node(&self, node: &NewNode) -> Result<(), LedgerError> {
        sqlx::query(&self.sql(queries::INSERT_NODE))
            .bind(&node.uuid)
            .bind(&node.name)
            .bind(&node.address)
            .bind(i64::from(node.port))
            .bind(node.consumption_multiplier)
            .bind(node.traffic_reset_day)
            .bind(now_millis())
            .execute(self.pool())
            .await?;
        Ok(())
    }

    /// Load one node with its active inbounds.
    pub async fn get_node(&self, uuid: &str) -> Result<Option<NodeRecord>, LedgerError> {
        let Some(row) = sqlx::query(&self.sql(queries::SELECT_NODE))
            .bind(uuid)
            .fetch_optional(self.pool())
            .await?
        else {
            return Ok(None);
        };
        let mut node = parse_node_row(&row)?;

        let rows = sqlx::query(&self.sql(queries::NODE_INBOUNDS))
            .bind(uuid)
            .fetch_all(self.pool())
            .await?;
        node.active_inbounds = rows
            .iter()
            .map(parse_inbound_row)
            .collect::<Result<_, _>>()?;
        Ok(Some(node))
    }

    /// Load every registered node with its active inbounds.
    pub async fn list_nodes(&self) -> Result<Vec<NodeRecord>, LedgerError> {
        let rows = sqlx::query(queries::LIST_NODES)
            .fetch_all(self.pool())
            .await?;
        let mut nodes = rows
            .iter()
            .map(parse_node_row)
            .collect::<Result<Vec<_>, _>>()?;

        let inbound_rows = sqlx::query(queries::ALL_NODE_INBOUNDS)
            .fetch_all(self.pool())
            .await?;
        let mut by_node: HashMap<String, Vec<InboundRecord>> = HashMap::new();
        for row in &inbound_rows {
            let node_uuid: String = row.try_get("node_uuid")?;
            by_node
                .entry(node_uuid)
                .or_default()
                .push(parse_inbound_row(row)?);
        }
        for node in &mut nodes {
            if let Some(inbounds) = by_node.remove(&node.uuid) {
                node.active_inbounds = inbounds;
            }
        }
        Ok(nodes)
    }

    /// Point a node at a profile and enable the given inbounds of it.
    pub async fn assign_node_profile(
        &self,
        node_uuid: &str,
        profile_uuid: &str,
        inbound_uuids: &[String],
    ) -> Result<(), LedgerError> {
        let mut tx = self.pool().begin().await?;
        let result = sqlx::query(&self.sql(queries::SET_NODE_PROFILE))
            .bind(profile_uuid)
            .bind(node_uuid)
            .execute(&mut *tx)
            .await?;
        if result.rows_affected() == 0 {
            return Err(LedgerError::NotFound(format!("node {node_uuid}")));
        }
        sqlx::query(&self.sql(queries::CLEAR_NODE_INBOUNDS))
            .bind(node_uuid)
            .execute(&mut *tx)
            .await?;
        for inbound in inbound_uuids {
            sqlx::query(&self.sql(queries::ADD_NODE_INBOUND))
                .bind(node_uuid)
                .bind(inbound)
                .execute(&mut *tx)
                .await?;
        }
        tx.commit().await?;
        Ok(())
    }

    /// Admin toggle. Disabling also clears connectivity state.
    pub async fn set_node_disabled(&self, uuid: &str, disabled: bool) -> Result<(), LedgerError> {
        let result = if disabled {
            sqlx::query(&self.sql(queries::DISABLE_NODE))
                .bind(now_millis())
                .bind(uuid)
                .execute(self.pool())
                .await?
        } else {
            sqlx::query(&self.sql(queries::ENABLE_NODE))
                .bind(uuid)
                .execute(self.pool())
                .await?
        };
        if result.rows_affected() == 0 {
            return Err(LedgerError::NotFound(format!("node {uuid}")));
        }
        Ok(())
    }

    /// Flag a start attempt in flight; health ticks skip connecting nodes.
    pub async fn mark_node_connecting(&self, uuid: &str) -> Result<(), LedgerError> {
        sqlx::query(&self.sql(queries::MARK_NODE_CONNECTING))
            .bind(uuid)
            .execute(self.pool())
            .await?;
        Ok(())
    }

    /// Drop the in-flight start flag without touching connectivity.
    pub async fn clear_node_connecting(&self, uuid: &str) -> Result<(), LedgerError> {
        sqlx::query(&self.sql(queries::CLEAR_NODE_CONNECTING))
            .bind(uuid)
            .execute(self.pool())
            .await?;
        Ok(())
    }

    /// Record a successful contact. Returns `true` if the node was not
    /// connected before this call.
    pub async fn mark_node_connected(
        &self,
        uuid: &str,
        proxy_version: Option<&str>,
    ) -> Result<bool, LedgerError> {
        let mut tx = self.pool().begin().await?;
        let restored = sqlx::query(&self.sql(queries::NODE_BECAME_CONNECTED))
            .bind(now_millis())
            .bind(uuid)
            .fetch_optional(&mut *tx)
            .await?
            .is_some();
        sqlx::query(&self.sql(queries::NODE_CONNECTED_DETAILS))
            .bind(proxy_version)
            .bind(uuid)
            .execute(&mut *tx)
            .await?;
        tx.commit().await?;
        Ok(restored)
    }

    /// Record a failed contact. Returns `true` if the node was connected
    /// before this call.
    pub async fn mark_node_offline(&self, uuid: &str, message: &str) -> Result<bool, LedgerError> {
        let mut tx = self.pool().begin().await?;
        let lost = sqlx::query(&self.sql(queries::NODE_BECAME_OFFLINE))
            .bind(now_millis())
            .bind(uuid)
            .fetch_optional(&mut *tx)
            .await?
            .is_some();
        sqlx::query(&self.sql(queries::NODE_OFFLINE_DETAILS))
            .bind(message)
            .bind(uuid)
            .execute(&mut *tx)
            .await?;
        tx.commit().await?;
        Ok(lost)
    }
}
