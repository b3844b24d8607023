//! JSON wire types exchanged with node agents.
//!
//! Field names are camelCase on the wire. Every response body is wrapped
//! in `{"response": ..}`.

use serde::{Deserialize, Serialize};

/// Provisioning entry for one user on one inbound.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum InboundUserPayload {
    #[serde(rename_all = "camelCase")]
    Vless {
        tag: String,
        username: String,
        uuid: String,
        /// Empty when the transport does not negotiate a flow.
        flow: String,
    },
    #[serde(rename_all = "camelCase")]
    Trojan {
        tag: String,
        username: String,
        password: String,
    },
    #[serde(rename_all = "camelCase")]
    Shadowsocks {
        tag: String,
        username: String,
        password: String,
        cipher_type: String,
        iv_check: bool,
    },
}

impl InboundUserPayload {
    pub fn tag(&self) -> &str {
        match self {
            Self::Vless { tag, .. } | Self::Trojan { tag, .. } | Self::Shadowsocks { tag, .. } => {
                tag
            }
        }
    }

    pub fn protocol(&self) -> &'static str {
        match self {
            Self::Vless { .. } => "vless",
            Self::Trojan { .. } => "trojan",
            Self::Shadowsocks { .. } => "shadowsocks",
        }
    }
}

/// Keys the agent uses to find live sessions of a user.
///
/// A credential rotation carries both keys so the stale session is evicted.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct HashData {
    pub vless_uuid: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub prev_vless_uuid: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AddUserRequest {
    pub data: Vec<InboundUserPayload>,
    pub hash_data: HashData,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AddUsersRequest {
    /// Inbounds whose user sets this request touches.
    pub affected_inbound_tags: Vec<String>,
    pub users: Vec<AddUserRequest>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RemoveUserRequest {
    pub username: String,
    pub hash_data: HashData,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RemoveUsersRequest {
    pub users: Vec<RemoveUserRequest>,
}

/// Users to load into one inbound at start.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct InboundUsers {
    pub tag: String,
    pub users: Vec<InboundUserPayload>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StartRequest {
    /// Proxy config document of the node's profile.
    pub config: serde_json::Value,
    pub inbounds: Vec<InboundUsers>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StartResponse {
    pub is_started: bool,
    #[serde(default)]
    pub version: Option<String>,
    #[serde(default)]
    pub error: Option<String>,
    #[serde(default)]
    pub system_info: Option<serde_json::Value>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct HealthResponse {
    pub proxy_running: bool,
    #[serde(default)]
    pub version: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct IpListRequest {
    pub ips: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UserUsage {
    /// The user's `t_id` rendered as a string.
    pub username: String,
    pub uplink: u64,
    pub downlink: u64,
}

impl UserUsage {
    pub fn total(&self) -> u64 {
        self.uplink.saturating_add(self.downlink)
    }
}

/// Generic `{ success, error }` acknowledgement.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Ack {
    pub success: bool,
    #[serde(default)]
    pub error: Option<String>,
}

/// Response wrapper used by every agent endpoint.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Envelope<T> {
    pub response: T,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub(crate) struct UsageRequest {
    pub reset: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub(crate) struct UsageResponse {
    pub users: Vec<UserUsage>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub(crate) struct ConnectedIpsRequest {
    pub username: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub(crate) struct ConnectedIpsResponse {
    pub ips: Vec<String>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn payload_is_tagged_by_protocol() {
        let payload = InboundUserPayload::Shadowsocks {
            tag: "ss-in".into(),
            username: "42".into(),
            password: "secret".into(),
            cipher_type: "chacha20-poly1305".into(),
            iv_check: false,
        };
        assert_eq!(
            serde_json::to_value(&payload).unwrap(),
            json!({
                "type": "shadowsocks",
                "tag": "ss-in",
                "username": "42",
                "password": "secret",
                "cipherType": "chacha20-poly1305",
                "ivCheck": false,
            })
        );
        assert_eq!(payload.tag(), "ss-in");
        assert_eq!(payload.protocol(), "shadowsocks");
    }

    #[test]
    fn hash_data_omits_missing_previous_key() {
        let request = RemoveUserRequest {
            username: "42".into(),
            hash_data: HashData {
                vless_uuid: "u-1".into(),
                prev_vless_uuid: None,
            },
        };
        assert_eq!(
            serde_json::to_value(&request).unwrap(),
            json!({"username": "42", "hashData": {"vlessUuid": "u-1"}})
        );
    }

    #[test]
    fn start_response_tolerates_missing_fields() {
        let body = json!({"response": {"isStarted": true, "version": "25.1.1"}});
        let envelope: Envelope<StartResponse> = serde_json::from_value(body).unwrap();
        assert!(envelope.response.is_started);
        assert_eq!(envelope.response.version.as_deref(), Some("25.1.1"));
        assert!(envelope.response.system_info.is_none());
    }

    #[test]
    fn usage_total_saturates() {
        let usage = UserUsage {
            username: "1".into(),
            uplink: u64::MAX,
            downlink: 10,
        };
        assert_eq!(usage.total(), u64::MAX);
    }
}
