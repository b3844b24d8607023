//! RPC error types.

use fleet_core::errors::{ERROR_DECODE, ERROR_REMOTE_STATUS, ERROR_UNREACHABLE};

/// Failure talking to a node agent.
#[derive(Debug, thiserror::Error)]
pub enum RpcError {
    /// Connection failure or timeout.
    #[error("node unreachable: {0}")]
    Unreachable(String),

    /// The agent answered with a non-success HTTP status.
    #[error("node returned HTTP {status}: {body}")]
    Status { status: u16, body: String },

    /// The response body did not match the expected shape.
    #[error("invalid node response: {0}")]
    Decode(String),

    /// The agent processed the request and reported a failure.
    #[error("node rejected request: {0}")]
    Remote(String),
}

impl RpcError {
    /// Label for metrics and logs.
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Unreachable(_) => ERROR_UNREACHABLE,
            Self::Status { .. } | Self::Remote(_) => ERROR_REMOTE_STATUS,
            Self::Decode(_) => ERROR_DECODE,
        }
    }
}

impl From<reqwest::Error> for RpcError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_decode() {
            Self::Decode(err.to_string())
        } else if let Some(status) = err.status() {
            Self::Status {
                status: status.as_u16(),
                body: String::new(),
            }
        } else {
            Self::Unreachable(err.to_string())
        }
    }
}
