//! Panel error types.

use fleet_config::ConfigError;
use fleet_ledger::LedgerError;
use fleet_node::RpcError;
use thiserror::Error;

use crate::dispatch::PayloadError;

/// Errors surfaced at the panel boundary.
#[derive(Debug, Error)]
pub enum PanelError {
    #[error("config: {0}")]
    Config(#[from] ConfigError),
    #[error("ledger: {0}")]
    Ledger(#[from] LedgerError),
    #[error("node rpc: {0}")]
    Rpc(#[from] RpcError),
    #[error("payload: {0}")]
    Payload(#[from] PayloadError),
    #[error("node {0} not found")]
    NodeNotFound(String),
    #[error("panel is shutting down")]
    ShuttingDown,
}

impl PanelError {
    /// Error kind label for metrics.
    pub fn kind(&self) -> &'static str {
        match self {
            PanelError::Config(_) => fleet_core::ERROR_CONFIG,
            PanelError::Ledger(_) => fleet_core::ERROR_LEDGER,
            PanelError::Rpc(e) => e.kind(),
            PanelError::Payload(_) => fleet_core::ERROR_UNSUPPORTED_PROTOCOL,
            PanelError::NodeNotFound(_) => "not_found",
            PanelError::ShuttingDown => "shutdown",
        }
    }
}
