//! Ledger DDL per dialect.
//!
//! Integers are 64-bit everywhere and timestamps are unix milliseconds, so
//! both dialects decode through the same `sqlx::Any` types.

pub const POSTGRES: &str = r#"
CREATE TABLE IF NOT EXISTS users (
    t_id BIGSERIAL PRIMARY KEY,
    uuid TEXT NOT NULL UNIQUE,
    username TEXT NOT NULL UNIQUE,
    ss_password TEXT NOT NULL,
    trojan_password TEXT NOT NULL,
    vless_uuid TEXT NOT NULL,
    status TEXT NOT NULL DEFAULT 'ACTIVE',
    expire_at BIGINT,
    traffic_limit_bytes BIGINT NOT NULL DEFAULT 0,
    traffic_limit_strategy TEXT NOT NULL DEFAULT 'NO_RESET',
    used_traffic_bytes BIGINT NOT NULL DEFAULT 0,
    lifetime_used_traffic_bytes BIGINT NOT NULL DEFAULT 0,
    last_triggered_threshold BIGINT NOT NULL DEFAULT 0,
    last_traffic_reset_at BIGINT,
    first_connected_at BIGINT,
    online_at BIGINT,
    last_connected_node_uuid TEXT,
    created_at BIGINT NOT NULL
);
CREATE INDEX IF NOT EXISTS idx_users_status ON users(status);
CREATE INDEX IF NOT EXISTS idx_users_strategy ON users(traffic_limit_strategy);
CREATE TABLE IF NOT EXISTS config_profiles (
    uuid TEXT PRIMARY KEY,
    name TEXT NOT NULL,
    config TEXT NOT NULL
);
CREATE TABLE IF NOT EXISTS config_profile_inbounds (
    uuid TEXT PRIMARY KEY,
    profile_uuid TEXT NOT NULL REFERENCES config_profiles(uuid) ON DELETE CASCADE,
    tag TEXT NOT NULL,
    protocol TEXT NOT NULL,
    network TEXT,
    security TEXT,
    method TEXT,
    position BIGINT NOT NULL DEFAULT 0,
    UNIQUE (profile_uuid, tag)
);
CREATE TABLE IF NOT EXISTS nodes (
    uuid TEXT PRIMARY KEY,
    name TEXT NOT NULL,
    address TEXT NOT NULL,
    port BIGINT NOT NULL,
    is_disabled BOOLEAN NOT NULL DEFAULT FALSE,
    is_connecting BOOLEAN NOT NULL DEFAULT FALSE,
    is_connected BOOLEAN NOT NULL DEFAULT FALSE,
    last_status_message TEXT,
    last_status_change BIGINT,
    active_config_profile_uuid TEXT REFERENCES config_profiles(uuid) ON DELETE SET NULL,
    traffic_used_bytes BIGINT NOT NULL DEFAULT 0,
    consumption_multiplier DOUBLE PRECISION NOT NULL DEFAULT 1.0,
    traffic_reset_day BIGINT,
    proxy_version TEXT,
    created_at BIGINT NOT NULL
);
CREATE TABLE IF NOT EXISTS node_inbounds (
    node_uuid TEXT NOT NULL REFERENCES nodes(uuid) ON DELETE CASCADE,
    inbound_uuid TEXT NOT NULL REFERENCES config_profile_inbounds(uuid) ON DELETE CASCADE,
    PRIMARY KEY (node_uuid, inbound_uuid)
);
CREATE TABLE IF NOT EXISTS user_groups (
    t_id BIGINT NOT NULL REFERENCES users(t_id) ON DELETE CASCADE,
    group_uuid TEXT NOT NULL,
    PRIMARY KEY (t_id, group_uuid)
);
CREATE TABLE IF NOT EXISTS group_inbounds (
    group_uuid TEXT NOT NULL,
    inbound_uuid TEXT NOT NULL REFERENCES config_profile_inbounds(uuid) ON DELETE CASCADE,
    PRIMARY KEY (group_uuid, inbound_uuid)
);
CREATE TABLE IF NOT EXISTS usage_history (
    id BIGSERIAL PRIMARY KEY,
    node_uuid TEXT NOT NULL,
    t_id BIGINT NOT NULL,
    bytes BIGINT NOT NULL,
    recorded_at BIGINT NOT NULL
);
CREATE INDEX IF NOT EXISTS idx_usage_history_recorded ON usage_history(recorded_at)
"#;

pub const SQLITE: &str = r#"
CREATE TABLE IF NOT EXISTS users (
    t_id INTEGER PRIMARY KEY AUTOINCREMENT,
    uuid TEXT NOT NULL UNIQUE,
    username TEXT NOT NULL UNIQUE,
    ss_password TEXT NOT NULL,
    trojan_password TEXT NOT NULL,
    vless_uuid TEXT NOT NULL,
    status TEXT NOT NULL DEFAULT 'ACTIVE',
    expire_at INTEGER,
    traffic_limit_bytes INTEGER NOT NULL DEFAULT 0,
    traffic_limit_strategy TEXT NOT NULL DEFAULT 'NO_RESET',
    used_traffic_bytes INTEGER NOT NULL DEFAULT 0,
    lifetime_used_traffic_bytes INTEGER NOT NULL DEFAULT 0,
    last_triggered_threshold INTEGER NOT NULL DEFAULT 0,
    last_traffic_reset_at INTEGER,
    first_connected_at INTEGER,
    online_at INTEGER,
    last_connected_node_uuid TEXT,
    created_at INTEGER NOT NULL
);
CREATE INDEX IF NOT EXISTS idx_users_status ON users(status);
CREATE INDEX IF NOT EXISTS idx_users_strategy ON users(traffic_limit_strategy);
CREATE TABLE IF NOT EXISTS config_profiles (
    uuid TEXT PRIMARY KEY,
    name TEXT NOT NULL,
    config TEXT NOT NULL
);
CREATE TABLE IF NOT EXISTS config_profile_inbounds (
    uuid TEXT PRIMARY KEY,
    profile_uuid TEXT NOT NULL REFERENCES config_profiles(uuid) ON DELETE CASCADE,
    tag TEXT NOT NULL,
    protocol TEXT NOT NULL,
    network TEXT,
    security TEXT,
    method TEXT,
    position INTEGER NOT NULL DEFAULT 0,
    UNIQUE (profile_uuid, tag)
);
CREATE TABLE IF NOT EXISTS nodes (
    uuid TEXT PRIMARY KEY,
    name TEXT NOT NULL,
    address TEXT NOT NULL,
    port INTEGER NOT NULL,
    is_disabled INTEGER NOT NULL DEFAULT 0,
    is_connecting INTEGER NOT NULL DEFAULT 0,
    is_connected INTEGER NOT NULL DEFAULT 0,
    last_status_message TEXT,
    last_status_change INTEGER,
    active_config_profile_uuid TEXT REFERENCES config_profiles(uuid) ON DELETE SET NULL,
    traffic_used_bytes INTEGER NOT NULL DEFAULT 0,
    consumption_multiplier REAL NOT NULL DEFAULT 1.0,
    traffic_reset_day INTEGER,
    proxy_version TEXT,
    created_at INTEGER NOT NULL
);
CREATE TABLE IF NOT EXISTS node_inbounds (
    node_uuid TEXT NOT NULL REFERENCES nodes(uuid) ON DELETE CASCADE,
    inbound_uuid TEXT NOT NULL REFERENCES config_profile_inbounds(uuid) ON DELETE CASCADE,
    PRIMARY KEY (node_uuid, inbound_uuid)
);
CREATE TABLE IF NOT EXISTS user_groups (
    t_id INTEGER NOT NULL REFERENCES users(t_id) ON DELETE CASCADE,
    group_uuid TEXT NOT NULL,
    PRIMARY KEY (t_id, group_uuid)
);
CREATE TABLE IF NOT EXISTS group_inbounds (
    group_uuid TEXT NOT NULL,
    inbound_uuid TEXT NOT NULL REFERENCES config_profile_inbounds(uuid) ON DELETE CASCADE,
    PRIMARY KEY (group_uuid, inbound_uuid)
);
CREATE TABLE IF NOT EXISTS usage_history (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    node_uuid TEXT NOT NULL,
    t_id INTEGER NOT NULL,
    bytes INTEGER NOT NULL,
    recorded_at INTEGER NOT NULL
);
CREATE INDEX IF NOT EXISTS idx_usage_history_recorded ON usage_history(recorded_at)
"#;
