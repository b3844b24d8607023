//! Remote node RPC for the fleet control plane.
//!
//! [`NodeApi`] is the contract the dispatcher and health manager program
//! against; [`HttpNodeClient`] implements it over JSON/HTTPS to the agent
//! running on each node. Every operation is idempotent on the remote side,
//! so callers may retry freely.

mod api;
mod error;
mod http;
mod wire;

pub use api::{NodeAddr, NodeApi};
pub use error::RpcError;
pub use http::HttpNodeClient;
pub use wire::*;
