//! The node RPC contract.

use std::fmt;
use std::sync::Arc;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::error::RpcError;
use crate::wire::{
    AddUserRequest, AddUsersRequest, HealthResponse, IpListRequest, RemoveUserRequest,
    RemoveUsersRequest, StartRequest, StartResponse, UserUsage,
};

/// Network address of a node agent.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct NodeAddr {
    pub address: String,
    pub port: u16,
}

impl NodeAddr {
    pub fn new(address: impl Into<String>, port: u16) -> Self {
        Self {
            address: address.into(),
            port,
        }
    }
}

impl fmt::Display for NodeAddr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.address.contains(':') {
            write!(f, "[{}]:{}", self.address, self.port)
        } else {
            write!(f, "{}:{}", self.address, self.port)
        }
    }
}

/// Operations a node agent exposes to the control plane.
#[async_trait]
pub trait NodeApi: Send + Sync {
    /// Provision (or update) one user on the listed inbounds.
    async fn add_user(&self, node: &NodeAddr, request: &AddUserRequest) -> Result<(), RpcError>;

    /// Provision many users at once.
    async fn add_users(&self, node: &NodeAddr, request: &AddUsersRequest)
    -> Result<(), RpcError>;

    /// Evict one user from every inbound.
    async fn remove_user(
        &self,
        node: &NodeAddr,
        request: &RemoveUserRequest,
    ) -> Result<(), RpcError>;

    /// Evict many users at once.
    async fn remove_users(
        &self,
        node: &NodeAddr,
        request: &RemoveUsersRequest,
    ) -> Result<(), RpcError>;

    /// (Re)start the proxy process with a fully resolved config.
    async fn start_proxy(
        &self,
        node: &NodeAddr,
        request: &StartRequest,
    ) -> Result<StartResponse, RpcError>;

    /// Liveness of the agent and its proxy process.
    async fn health(&self, node: &NodeAddr) -> Result<HealthResponse, RpcError>;

    async fn block_ips(&self, node: &NodeAddr, request: &IpListRequest) -> Result<(), RpcError>;

    async fn unblock_ips(&self, node: &NodeAddr, request: &IpListRequest)
    -> Result<(), RpcError>;

    /// Source addresses currently connected as `username`.
    async fn fetch_connected_ips(
        &self,
        node: &NodeAddr,
        username: &str,
    ) -> Result<Vec<String>, RpcError>;

    /// Per-user byte counters since the previous call (when `reset`).
    async fn fetch_user_usage(
        &self,
        node: &NodeAddr,
        reset: bool,
    ) -> Result<Vec<UserUsage>, RpcError>;
}

#[async_trait]
impl<T: NodeApi + ?Sized> NodeApi for Arc<T> {
    async fn add_user(&self, node: &NodeAddr, request: &AddUserRequest) -> Result<(), RpcError> {
        (**self).add_user(node, request).await
    }

    async fn add_users(
        &self,
        node: &NodeAddr,
        request: &AddUsersRequest,
    ) -> Result<(), RpcError> {
        (**self).add_users(node, request).await
    }

    async fn remove_user(
        &self,
        node: &NodeAddr,
        request: &RemoveUserRequest,
    ) -> Result<(), RpcError> {
        (**self).remove_user(node, request).await
    }

    async fn remove_users(
        &self,
        node: &NodeAddr,
        request: &RemoveUsersRequest,
    ) -> Result<(), RpcError> {
        (**self).remove_users(node, request).await
    }

    async fn start_proxy(
        &self,
        node: &NodeAddr,
        request: &StartRequest,
    ) -> Result<StartResponse, RpcError> {
        (**self).start_proxy(node, request).await
    }

    async fn health(&self, node: &NodeAddr) -> Result<HealthResponse, RpcError> {
        (**self).health(node).await
    }

    async fn block_ips(&self, node: &NodeAddr, request: &IpListRequest) -> Result<(), RpcError> {
        (**self).block_ips(node, request).await
    }

    async fn unblock_ips(
        &self,
        node: &NodeAddr,
        request: &IpListRequest,
    ) -> Result<(), RpcError> {
        (**self).unblock_ips(node, request).await
    }

    async fn fetch_connected_ips(
        &self,
        node: &NodeAddr,
        username: &str,
    ) -> Result<Vec<String>, RpcError> {
        (**self).fetch_connected_ips(node, username).await
    }

    async fn fetch_user_usage(
        &self,
        node: &NodeAddr,
        reset: bool,
    ) -> Result<Vec<UserUsage>, RpcError> {
        (**self).fetch_user_usage(node, reset).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn formats_ipv6_with_brackets() {
        assert_eq!(NodeAddr::new("10.0.0.1", 2222).to_string(), "10.0.0.1:2222");
        assert_eq!(NodeAddr::new("::1", 2222).to_string(), "[::1]:2222");
    }
}
