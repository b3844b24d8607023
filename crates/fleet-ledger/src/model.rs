//! Ledger record types.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::LedgerError;

/// User lifecycle status.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum UserStatus {
    Active,
    Disabled,
    Limited,
    Expired,
}

impl UserStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Active => "ACTIVE",
            Self::Disabled => "DISABLED",
            Self::Limited => "LIMITED",
            Self::Expired => "EXPIRED",
        }
    }
}

impl fmt::Display for UserStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for UserStatus {
    type Err = LedgerError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "ACTIVE" => Ok(Self::Active),
            "DISABLED" => Ok(Self::Disabled),
            "LIMITED" => Ok(Self::Limited),
            "EXPIRED" => Ok(Self::Expired),
            other => Err(LedgerError::Decode(format!("unknown user status '{other}'"))),
        }
    }
}

/// Reset cadence for a user's periodic traffic allowance.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum TrafficLimitStrategy {
    NoReset,
    Day,
    Week,
    Month,
}

impl TrafficLimitStrategy {
    /// Strategies that have a periodic boundary.
    pub const PERIODIC: [TrafficLimitStrategy; 3] = [Self::Day, Self::Week, Self::Month];

    pub fn as_str(self) -> &'static str {
        match self {
            Self::NoReset => "NO_RESET",
            Self::Day => "DAY",
            Self::Week => "WEEK",
            Self::Month => "MONTH",
        }
    }
}

impl fmt::Display for TrafficLimitStrategy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for TrafficLimitStrategy {
    type Err = LedgerError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "NO_RESET" => Ok(Self::NoReset),
            "DAY" => Ok(Self::Day),
            "WEEK" => Ok(Self::Week),
            "MONTH" => Ok(Self::Month),
            other => Err(LedgerError::Decode(format!(
                "unknown traffic limit strategy '{other}'"
            ))),
        }
    }
}

/// A full user row.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct UserRecord {
    pub t_id: i64,
    pub uuid: String,
    pub username: String,
    pub ss_password: String,
    pub trojan_password: String,
    pub vless_uuid: String,
    pub status: UserStatus,
    /// Unix millis, `None` for never.
    pub expire_at: Option<i64>,
    /// Zero means unlimited.
    pub traffic_limit_bytes: i64,
    pub traffic_limit_strategy: TrafficLimitStrategy,
    pub used_traffic_bytes: i64,
    pub lifetime_used_traffic_bytes: i64,
    pub last_triggered_threshold: i64,
    pub last_traffic_reset_at: Option<i64>,
    pub first_connected_at: Option<i64>,
    pub online_at: Option<i64>,
    pub last_connected_node_uuid: Option<String>,
    pub created_at: i64,
}

/// Values required to create a user.
#[derive(Debug, Clone)]
pub struct NewUser {
    pub uuid: String,
    pub username: String,
    pub ss_password: String,
    pub trojan_password: String,
    pub vless_uuid: String,
    pub status: UserStatus,
    pub expire_at: Option<i64>,
    pub traffic_limit_bytes: i64,
    pub traffic_limit_strategy: TrafficLimitStrategy,
}

impl NewUser {
    /// An active, unlimited user with placeholder credentials derived from the username.
    pub fn new(uuid: impl Into<String>, username: impl Into<String>) -> Self {
        let uuid = uuid.into();
        let username = username.into();
        Self {
            ss_password: format!("ss-{username}"),
            trojan_password: format!("tr-{username}"),
            vless_uuid: uuid.clone(),
            uuid,
            username,
            status: UserStatus::Active,
            expire_at: None,
            traffic_limit_bytes: 0,
            traffic_limit_strategy: TrafficLimitStrategy::NoReset,
        }
    }

    /// Builder: set traffic limit and reset cadence.
    pub fn traffic_limit(mut self, bytes: i64, strategy: TrafficLimitStrategy) -> Self {
        self.traffic_limit_bytes = bytes;
        self.traffic_limit_strategy = strategy;
        self
    }

    /// Builder: set expiry (unix millis).
    pub fn expire_at(mut self, at: i64) -> Self {
        self.expire_at = Some(at);
        self
    }

    /// Builder: set initial status.
    pub fn status(mut self, status: UserStatus) -> Self {
        self.status = status;
        self
    }

    /// Builder: set protocol secrets.
    pub fn credentials(
        mut self,
        vless_uuid: impl Into<String>,
        trojan_password: impl Into<String>,
        ss_password: impl Into<String>,
    ) -> Self {
        self.vless_uuid = vless_uuid.into();
        self.trojan_password = trojan_password.into();
        self.ss_password = ss_password.into();
        self
    }
}

/// Identity of a user touched by a bulk statement.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize)]
pub struct UserIdentity {
    pub t_id: i64,
    pub uuid: String,
    pub username: String,
    pub vless_uuid: String,
}

/// One inbound listener defined by a config profile.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct InboundRecord {
    pub uuid: String,
    pub profile_uuid: String,
    pub tag: String,
    /// Protocol type, e.g. `vless`, `trojan`, `shadowsocks`.
    pub protocol: String,
    /// Transport network, e.g. `tcp`, `raw`, `ws`, `grpc`.
    pub network: Option<String>,
    /// Transport security, e.g. `reality`, `tls`, `none`.
    pub security: Option<String>,
    /// Cipher method for shadowsocks inbounds.
    pub method: Option<String>,
}

/// Values required to create an inbound.
#[derive(Debug, Clone)]
pub struct NewInbound {
    pub uuid: String,
    pub tag: String,
    pub protocol: String,
    pub network: Option<String>,
    pub security: Option<String>,
    pub method: Option<String>,
}

impl NewInbound {
    pub fn new(uuid: impl Into<String>, tag: impl Into<String>, protocol: impl Into<String>) -> Self {
        Self {
            uuid: uuid.into(),
            tag: tag.into(),
            protocol: protocol.into(),
            network: None,
            security: None,
            method: None,
        }
    }

    /// Builder: set transport network and security.
    pub fn transport(mut self, network: impl Into<String>, security: impl Into<String>) -> Self {
        self.network = Some(network.into());
        self.security = Some(security.into());
        self
    }

    /// Builder: set shadowsocks cipher method.
    pub fn method(mut self, method: impl Into<String>) -> Self {
        self.method = Some(method.into());
        self
    }
}

/// A node row plus its resolved active inbounds.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct NodeRecord {
    pub uuid: String,
    pub name: String,
    pub address: String,
    pub port: u16,
    pub is_disabled: bool,
    pub is_connecting: bool,
    pub is_connected: bool,
    pub last_status_message: Option<String>,
    pub last_status_change: Option<i64>,
    pub active_config_profile_uuid: Option<String>,
    pub traffic_used_bytes: i64,
    pub consumption_multiplier: f64,
    pub traffic_reset_day: Option<i64>,
    pub proxy_version: Option<String>,
    pub created_at: i64,
    /// Inbounds of the active profile enabled on this node, in profile order.
    pub active_inbounds: Vec<InboundRecord>,
}

impl NodeRecord {
    /// Whether the node can carry any user at all.
    ///
    /// A node without an active profile or without active inbounds is never
    /// a dispatch target, whatever its connectivity.
    pub fn is_eligible(&self) -> bool {
        !self.is_disabled
            && self.active_config_profile_uuid.is_some()
            && !self.active_inbounds.is_empty()
    }

    /// Connectivity state derived from the stored flags.
    pub fn state(&self) -> NodeState {
        if self.is_disabled {
            NodeState::Disabled
        } else if self.is_connecting {
            NodeState::Connecting
        } else if self.is_connected {
            NodeState::Connected
        } else {
            NodeState::Offline
        }
    }
}

/// Node connectivity state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub enum NodeState {
    Disabled,
    Connecting,
    Connected,
    Offline,
}

impl NodeState {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Disabled => "disabled",
            Self::Connecting => "connecting",
            Self::Connected => "connected",
            Self::Offline => "offline",
        }
    }
}

/// Values required to register a node.
#[derive(Debug, Clone)]
pub struct NewNode {
    pub uuid: String,
    pub name: String,
    pub address: String,
    pub port: u16,
    pub consumption_multiplier: f64,
    pub traffic_reset_day: Option<i64>,
}

impl NewNode {
    pub fn new(
        uuid: impl Into<String>,
        name: impl Into<String>,
        address: impl Into<String>,
        port: u16,
    ) -> Self {
        Self {
            uuid: uuid.into(),
            name: name.into(),
            address: address.into(),
            port,
            consumption_multiplier: 1.0,
            traffic_reset_day: None,
        }
    }

    /// Builder: set accounting weight.
    pub fn consumption_multiplier(mut self, multiplier: f64) -> Self {
        self.consumption_multiplier = multiplier;
        self
    }
}

/// Protocol secrets and identity needed to provision a user on a node.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct UserCredentials {
    pub t_id: i64,
    pub uuid: String,
    pub username: String,
    pub vless_uuid: String,
    pub trojan_password: String,
    pub ss_password: String,
}

/// A user with credentials and the inbounds its groups grant.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ResolvedUser {
    pub credentials: UserCredentials,
    pub status: UserStatus,
    pub inbounds: Vec<InboundRecord>,
}

/// A config profile resolved for a proxy start.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ResolvedProfile {
    pub uuid: String,
    pub name: String,
    pub config: serde_json::Value,
    /// Each requested inbound with the active users granted to it.
    pub inbounds: Vec<(InboundRecord, Vec<UserCredentials>)>,
}

/// One node-reported usage delta.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UsageSample {
    pub t_id: i64,
    pub delta_bytes: i64,
    pub node_uuid: String,
}

/// Result of an applied usage batch.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct UsageOutcome {
    /// Users updated by the batch.
    pub updated: usize,
    /// Users that connected for the first time during this batch.
    pub first_connections: Vec<UserIdentity>,
}

/// A user whose notification watermark was just raised.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ThresholdCrossing {
    pub user: UserIdentity,
    pub watermark: i64,
}

/// Result of a periodic traffic reset.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ResetOutcome {
    /// Users moved from Limited back to Active.
    pub reactivated: Vec<UserIdentity>,
    /// Other users of the strategy whose counters were zeroed.
    pub reset: u64,
}

/// Per-(node, user) usage history row.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UsageHistoryEntry {
    pub node_uuid: String,
    pub t_id: i64,
    pub bytes: i64,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn node(disabled: bool, profile: bool, inbounds: usize) -> NodeRecord {
        NodeRecord {
            uuid: "n1".into(),
            name: "n1".into(),
            address: "10.0.0.1".into(),
            port: 2222,
            is_disabled: disabled,
            is_connecting: false,
            is_connected: true,
            last_status_message: None,
            last_status_change: None,
            active_config_profile_uuid: profile.then(|| "p1".to_string()),
            traffic_used_bytes: 0,
            consumption_multiplier: 1.0,
            traffic_reset_day: None,
            proxy_version: None,
            created_at: 0,
            active_inbounds: (0..inbounds)
                .map(|i| InboundRecord {
                    uuid: format!("i{i}"),
                    profile_uuid: "p1".into(),
                    tag: format!("tag{i}"),
                    protocol: "vless".into(),
                    network: None,
                    security: None,
                    method: None,
                })
                .collect(),
        }
    }

    #[test]
    fn eligibility_requires_profile_and_inbounds() {
        assert!(node(false, true, 1).is_eligible());
        assert!(!node(true, true, 1).is_eligible());
        assert!(!node(false, false, 1).is_eligible());
        assert!(!node(false, true, 0).is_eligible());
    }

    #[test]
    fn state_prefers_disabled_over_connectivity() {
        assert_eq!(node(true, true, 1).state(), NodeState::Disabled);
        let mut n = node(false, true, 1);
        assert_eq!(n.state(), NodeState::Connected);
        n.is_connecting = true;
        assert_eq!(n.state(), NodeState::Connecting);
        n.is_connecting = false;
        n.is_connected = false;
        assert_eq!(n.state(), NodeState::Offline);
    }

    #[test]
    fn status_and_strategy_parse() {
        for status in [
            UserStatus::Active,
            UserStatus::Disabled,
            UserStatus::Limited,
            UserStatus::Expired,
        ] {
            assert_eq!(status.as_str().parse::<UserStatus>().unwrap(), status);
        }
        assert_eq!(
            "MONTH".parse::<TrafficLimitStrategy>().unwrap(),
            TrafficLimitStrategy::Month
        );
        assert!("YEARLY".parse::<TrafficLimitStrategy>().is_err());
    }
}
