//! SQL statements shared by both dialects.
//!
//! Written with `?` placeholders; [`crate::Ledger`] renumbers them for
//! PostgreSQL. Statements whose parameter count depends on the batch are
//! assembled by the functions at the bottom of this file.

use crate::backend::{in_list, values_list};

// ============================================================================
// Users
// ============================================================================

pub const INSERT_USER: &str = r#"
INSERT INTO users (uuid, username, ss_password, trojan_password, vless_uuid, status,
                   expire_at, traffic_limit_bytes, traffic_limit_strategy, created_at)
VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
RETURNING t_id
"#;

pub const SELECT_USER_BY_ID: &str = r#"
SELECT t_id, uuid, username, ss_password, trojan_password, vless_uuid, status, expire_at,
       traffic_limit_bytes, traffic_limit_strategy, used_traffic_bytes,
       lifetime_used_traffic_bytes, last_triggered_threshold, last_traffic_reset_at,
       first_connected_at, online_at, last_connected_node_uuid, created_at
FROM users
WHERE t_id = ?
"#;

pub const SELECT_USER_BY_UUID: &str = r#"
SELECT t_id, uuid, username, ss_password, trojan_password, vless_uuid, status, expire_at,
       traffic_limit_bytes, traffic_limit_strategy, used_traffic_bytes,
       lifetime_used_traffic_bytes, last_triggered_threshold, last_traffic_reset_at,
       first_connected_at, online_at, last_connected_node_uuid, created_at
FROM users
WHERE uuid = ?
"#;

pub const LIST_USERS: &str = r#"
SELECT t_id, uuid, username, ss_password, trojan_password, vless_uuid, status, expire_at,
       traffic_limit_bytes, traffic_limit_strategy, used_traffic_bytes,
       lifetime_used_traffic_bytes, last_triggered_threshold, last_traffic_reset_at,
       first_connected_at, online_at, last_connected_node_uuid, created_at
FROM users
ORDER BY t_id
"#;

pub const SET_USER_STATUS: &str = r#"
UPDATE users SET status = ? WHERE t_id = ?
"#;

/// Applies only while the stored VLESS key still matches the one read.
pub const SWAP_USER_CREDENTIALS: &str = r#"
UPDATE users SET vless_uuid = ?, trojan_password = ?, ss_password = ?
WHERE t_id = ? AND vless_uuid = ?
"#;

pub const ADD_USER_GROUP: &str = r#"
INSERT INTO user_groups (t_id, group_uuid) VALUES (?, ?)
ON CONFLICT DO NOTHING
"#;

/// Moves a Limited user back to Active; returns a row only on that transition.
pub const REACTIVATE_USER: &str = r#"
UPDATE users SET status = 'ACTIVE'
WHERE t_id = ? AND status = 'LIMITED'
RETURNING t_id
"#;

pub const RESET_USER_COUNTERS: &str = r#"
UPDATE users
SET used_traffic_bytes = 0, last_triggered_threshold = 0, last_traffic_reset_at = ?
WHERE t_id = ?
"#;

pub const MARK_LIMITED: &str = r#"
UPDATE users SET status = 'LIMITED'
WHERE status = 'ACTIVE'
  AND traffic_limit_bytes > 0
  AND used_traffic_bytes >= traffic_limit_bytes
RETURNING t_id, uuid, username, vless_uuid
"#;

pub const MARK_EXPIRED: &str = r#"
UPDATE users SET status = 'EXPIRED'
WHERE status IN ('ACTIVE', 'LIMITED')
  AND expire_at IS NOT NULL
  AND expire_at <= ?
RETURNING t_id, uuid, username, vless_uuid
"#;

// ============================================================================
// Period reset
// ============================================================================

/// Status and counters change together for the Limited rows of a strategy.
pub const RESET_PERIOD_REACTIVATE: &str = r#"
UPDATE users
SET status = 'ACTIVE',
    used_traffic_bytes = 0,
    last_triggered_threshold = 0,
    last_traffic_reset_at = ?
WHERE status = 'LIMITED' AND traffic_limit_strategy = ?
RETURNING t_id, uuid, username, vless_uuid
"#;

pub const RESET_PERIOD_COUNTERS: &str = r#"
UPDATE users
SET used_traffic_bytes = 0,
    last_triggered_threshold = 0,
    last_traffic_reset_at = ?
WHERE status <> 'LIMITED'
  AND traffic_limit_strategy = ?
  AND (last_traffic_reset_at IS NULL OR last_traffic_reset_at <> ?)
"#;

// ============================================================================
// Profiles and inbounds
// ============================================================================

pub const INSERT_PROFILE: &str = r#"
INSERT INTO config_profiles (uuid, name, config) VALUES (?, ?, ?)
"#;

pub const INSERT_INBOUND: &str = r#"
INSERT INTO config_profile_inbounds (uuid, profile_uuid, tag, protocol, network, security, method, position)
VALUES (?, ?, ?, ?, ?, ?, ?, ?)
"#;

pub const ADD_GROUP_INBOUND: &str = r#"
INSERT INTO group_inbounds (group_uuid, inbound_uuid) VALUES (?, ?)
ON CONFLICT DO NOTHING
"#;

pub const SELECT_PROFILE: &str = r#"
SELECT uuid, name, config FROM config_profiles WHERE uuid = ?
"#;

pub const PROFILE_INBOUNDS: &str = r#"
SELECT i.uuid AS inbound_uuid, i.profile_uuid, i.tag, i.protocol, i.network, i.security,
       i.method, i.position
FROM config_profile_inbounds i
WHERE i.profile_uuid = ?
ORDER BY i.position, i.tag
"#;

/// Active users granted to each inbound of a profile.
pub const PROFILE_INBOUND_USERS: &str = r#"
SELECT DISTINCT gi.inbound_uuid AS inbound_uuid, u.t_id, u.uuid, u.username,
       u.vless_uuid, u.trojan_password, u.ss_password
FROM group_inbounds gi
JOIN config_profile_inbounds i ON i.uuid = gi.inbound_uuid
JOIN user_groups ug ON ug.group_uuid = gi.group_uuid
JOIN users u ON u.t_id = ug.t_id
WHERE i.profile_uuid = ? AND u.status = 'ACTIVE'
ORDER BY u.t_id
"#;

// ============================================================================
// Nodes
// ============================================================================

pub const INSERT_NODE: &str = r#"
INSERT INTO nodes (uuid, name, address, port, consumption_multiplier, traffic_reset_day, created_at)
VALUES (?, ?, ?, ?, ?, ?, ?)
"#;

pub const LIST_NODES: &str = r#"
SELECT uuid, name, address, port, is_disabled, is_connecting, is_connected,
       last_status_message, last_status_change, active_config_profile_uuid,
       traffic_used_bytes, consumption_multiplier, traffic_reset_day, proxy_version, created_at
FROM nodes
ORDER BY created_at, uuid
"#;

pub const SELECT_NODE: &str = r#"
SELECT uuid, name, address, port, is_disabled, is_connecting, is_connected,
       last_status_message, last_status_change, active_config_profile_uuid,
       traffic_used_bytes, consumption_multiplier, traffic_reset_day, proxy_version, created_at
FROM nodes
WHERE uuid = ?
"#;

/// Inbounds enabled on each node, restricted to the node's active profile.
pub const ALL_NODE_INBOUNDS: &str = r#"
SELECT ni.node_uuid, i.uuid AS inbound_uuid, i.profile_uuid, i.tag, i.protocol,
       i.network, i.security, i.method, i.position
FROM node_inbounds ni
JOIN nodes n ON n.uuid = ni.node_uuid
JOIN config_profile_inbounds i ON i.uuid = ni.inbound_uuid
WHERE i.profile_uuid = n.active_config_profile_uuid
ORDER BY ni.node_uuid, i.position, i.tag
"#;

pub const NODE_INBOUNDS: &str = r#"
SELECT ni.node_uuid, i.uuid AS inbound_uuid, i.profile_uuid, i.tag, i.protocol,
       i.network, i.security, i.method, i.position
FROM node_inbounds ni
JOIN nodes n ON n.uuid = ni.node_uuid
JOIN config_profile_inbounds i ON i.uuid = ni.inbound_uuid
WHERE ni.node_uuid = ? AND i.profile_uuid = n.active_config_profile_uuid
ORDER BY i.position, i.tag
"#;

pub const SET_NODE_PROFILE: &str = r#"
UPDATE nodes SET active_config_profile_uuid = ? WHERE uuid = ?
"#;

pub const CLEAR_NODE_INBOUNDS: &str = r#"
DELETE FROM node_inbounds WHERE node_uuid = ?
"#;

pub const ADD_NODE_INBOUND: &str = r#"
INSERT INTO node_inbounds (node_uuid, inbound_uuid) VALUES (?, ?)
ON CONFLICT DO NOTHING
"#;

pub const ENABLE_NODE: &str = r#"
UPDATE nodes SET is_disabled = FALSE WHERE uuid = ?
"#;

/// A disabled node keeps no connectivity state.
pub const DISABLE_NODE: &str = r#"
UPDATE nodes
SET is_disabled = TRUE, is_connecting = FALSE, is_connected = FALSE,
    last_status_message = NULL, last_status_change = ?
WHERE uuid = ?
"#;

pub const MARK_NODE_CONNECTING: &str = r#"
UPDATE nodes SET is_connecting = TRUE WHERE uuid = ? AND is_disabled = FALSE
"#;

pub const CLEAR_NODE_CONNECTING: &str = r#"
UPDATE nodes SET is_connecting = FALSE WHERE uuid = ?
"#;

/// Returns a row only when the node was not connected before.
pub const NODE_BECAME_CONNECTED: &str = r#"
UPDATE nodes SET is_connected = TRUE, last_status_change = ?
WHERE uuid = ? AND is_connected = FALSE
RETURNING uuid
"#;

pub const NODE_CONNECTED_DETAILS: &str = r#"
UPDATE nodes
SET is_connecting = FALSE, last_status_message = NULL,
    proxy_version = COALESCE(?, proxy_version)
WHERE uuid = ?
"#;

/// Returns a row only when the node was connected before.
pub const NODE_BECAME_OFFLINE: &str = r#"
UPDATE nodes SET is_connected = FALSE, last_status_change = ?
WHERE uuid = ? AND is_connected = TRUE
RETURNING uuid
"#;

pub const NODE_OFFLINE_DETAILS: &str = r#"
UPDATE nodes SET is_connecting = FALSE, last_status_message = ? WHERE uuid = ?
"#;

pub const ADD_NODE_TRAFFIC: &str = r#"
UPDATE nodes SET traffic_used_bytes = traffic_used_bytes + ? WHERE uuid = ?
"#;

pub const RESET_NODE_TRAFFIC_BY_DAY: &str = r#"
UPDATE nodes SET traffic_used_bytes = 0 WHERE traffic_reset_day = ?
"#;

// ============================================================================
// Usage history
// ============================================================================

pub const CLEANUP_USAGE_HISTORY: &str = r#"
DELETE FROM usage_history WHERE recorded_at < ?
"#;

// ============================================================================
// Batch statements
// ============================================================================

/// Set-based usage increment for `rows` aggregated samples.
///
/// Binds, in order: `rows` x (t_id, delta, node_uuid), then `now` twice.
/// `first_connected_at` and `online_at` receive the same bound instant, so a
/// row whose two columns are equal afterwards had never connected before
/// this statement.
pub fn apply_usage_batch(rows: usize) -> String {
    format!(
        r#"
WITH batch (b_id, b_delta, b_node) AS (VALUES {values})
UPDATE users
SET used_traffic_bytes = users.used_traffic_bytes + batch.b_delta,
    lifetime_used_traffic_bytes = users.lifetime_used_traffic_bytes + batch.b_delta,
    last_connected_node_uuid = batch.b_node,
    online_at = ?,
    first_connected_at = COALESCE(users.first_connected_at, ?)
FROM batch
WHERE users.t_id = batch.b_id
RETURNING t_id, uuid, username, vless_uuid,
          CAST(CASE WHEN first_connected_at = online_at THEN 1 ELSE 0 END AS BIGINT) AS first_connection
"#,
        values = values_list(rows, 3)
    )
}

/// Claim the highest newly crossed watermark per user.
///
/// Binds, in order: one value per percentage, then the row limit.
pub fn evaluate_thresholds(percentages: usize) -> String {
    format!(
        r#"
WITH thresholds (pct) AS (VALUES {values}),
candidates AS (
    SELECT u.t_id AS c_id, MAX(t.pct) AS c_pct
    FROM users u
    JOIN thresholds t ON u.used_traffic_bytes * 100 >= u.traffic_limit_bytes * t.pct
    WHERE u.status IN ('ACTIVE', 'LIMITED')
      AND u.traffic_limit_bytes > 0
      AND t.pct > u.last_triggered_threshold
    GROUP BY u.t_id
    ORDER BY MIN(u.created_at), u.t_id
    LIMIT ?
)
UPDATE users
SET last_triggered_threshold = candidates.c_pct
FROM candidates
WHERE users.t_id = candidates.c_id
RETURNING t_id, uuid, username, vless_uuid, last_triggered_threshold
"#,
        values = values_list(percentages, 1)
    )
}

pub fn insert_usage_history(rows: usize) -> String {
    format!(
        "INSERT INTO usage_history (node_uuid, t_id, bytes, recorded_at) VALUES {}",
        values_list(rows, 4)
    )
}

pub fn select_users_by_ids(n: usize) -> String {
    format!(
        r#"
SELECT t_id, uuid, username, ss_password, trojan_password, vless_uuid, status
FROM users
WHERE t_id IN ({})
ORDER BY t_id
"#,
        in_list(n)
    )
}

/// Inbounds granted to each of `n` users through their groups.
pub fn user_inbounds(n: usize) -> String {
    format!(
        r#"
SELECT DISTINCT ug.t_id, i.uuid AS inbound_uuid, i.profile_uuid, i.tag, i.protocol,
       i.network, i.security, i.method, i.position
FROM user_groups ug
JOIN group_inbounds gi ON gi.group_uuid = ug.group_uuid
JOIN config_profile_inbounds i ON i.uuid = gi.inbound_uuid
WHERE ug.t_id IN ({})
ORDER BY ug.t_id, i.position, i.tag
"#,
        in_list(n)
    )
}
