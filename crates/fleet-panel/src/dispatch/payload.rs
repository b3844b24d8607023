//! Per-protocol provisioning payloads.

use fleet_ledger::{InboundRecord, UserCredentials};
use fleet_node::InboundUserPayload;
use thiserror::Error;

const VISION_FLOW: &str = "xtls-rprx-vision";
const DEFAULT_SS_CIPHER: &str = "chacha20-poly1305";
const SS_CIPHERS: [&str; 4] = [
    "aes-128-gcm",
    "aes-256-gcm",
    "chacha20-poly1305",
    "chacha20-ietf-poly1305",
];

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum PayloadError {
    #[error("inbound {tag}: unsupported protocol {protocol}")]
    UnsupportedProtocol { tag: String, protocol: String },
}

/// Name the node agent uses for a user. Usage reports come back keyed by it.
pub fn node_username(t_id: i64) -> String {
    t_id.to_string()
}

/// Build the entry provisioning `user` on `inbound`.
pub fn build_payload(
    inbound: &InboundRecord,
    user: &UserCredentials,
) -> Result<InboundUserPayload, PayloadError> {
    let tag = inbound.tag.clone();
    let username = node_username(user.t_id);

    match inbound.protocol.to_ascii_lowercase().as_str() {
        "vless" => Ok(InboundUserPayload::Vless {
            tag,
            username,
            uuid: user.vless_uuid.clone(),
            flow: vless_flow(inbound.network.as_deref(), inbound.security.as_deref()).to_string(),
        }),
        "trojan" => Ok(InboundUserPayload::Trojan {
            tag,
            username,
            password: user.trojan_password.clone(),
        }),
        "shadowsocks" => Ok(InboundUserPayload::Shadowsocks {
            tag,
            username,
            password: user.ss_password.clone(),
            cipher_type: shadowsocks_cipher(inbound.method.as_deref()).to_string(),
            iv_check: false,
        }),
        _ => Err(PayloadError::UnsupportedProtocol {
            tag,
            protocol: inbound.protocol.clone(),
        }),
    }
}

/// Vision flow only applies to raw TCP carrying TLS or REALITY.
fn vless_flow(network: Option<&str>, security: Option<&str>) -> &'static str {
    let raw = matches!(network, Some("raw" | "tcp"));
    let tls = matches!(security, Some("reality" | "tls"));
    if raw && tls { VISION_FLOW } else { "" }
}

fn shadowsocks_cipher(method: Option<&str>) -> &'static str {
    method
        .and_then(|m| SS_CIPHERS.iter().find(|c| **c == m))
        .copied()
        .unwrap_or(DEFAULT_SS_CIPHER)
}
