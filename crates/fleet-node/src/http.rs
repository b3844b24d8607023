//! HTTP client for node agents.
//!
//! # Example
//!
//! ```no_run
//! use std::time::Duration;
//! use fleet_node::HttpNodeClient;
//!
//! let client = HttpNodeClient::new("https", Some("node-token".into()), Duration::from_secs(20))?;
//! # Ok::<(), fleet_node::RpcError>(())
//! ```

use std::time::Duration;

use async_trait::async_trait;
use reqwest::{Client, Method};
use serde::Serialize;
use serde::de::DeserializeOwned;
use tracing::trace;

use crate::api::{NodeAddr, NodeApi};
use crate::error::RpcError;
use crate::wire::{
    Ack, AddUserRequest, AddUsersRequest, ConnectedIpsRequest, ConnectedIpsResponse, Envelope,
    HealthResponse, IpListRequest, RemoveUserRequest, RemoveUsersRequest, StartRequest,
    StartResponse, UsageRequest, UsageResponse, UserUsage,
};

const PATH_START: &str = "/node/proxy/start";
const PATH_HEALTH: &str = "/node/proxy/health";
const PATH_ADD_USER: &str = "/node/handler/add-user";
const PATH_ADD_USERS: &str = "/node/handler/add-users";
const PATH_REMOVE_USER: &str = "/node/handler/remove-user";
const PATH_REMOVE_USERS: &str = "/node/handler/remove-users";
const PATH_BLOCK_IPS: &str = "/node/firewall/block-ips";
const PATH_UNBLOCK_IPS: &str = "/node/firewall/unblock-ips";
const PATH_CONNECTED_IPS: &str = "/node/stats/user-ips";
const PATH_USER_USAGE: &str = "/node/stats/users";

/// JSON-over-HTTP [`NodeApi`] implementation.
#[derive(Debug, Clone)]
pub struct HttpNodeClient {
    client: Client,
    scheme: String,
    token: Option<String>,
}

impl HttpNodeClient {
    /// Create a client with a per-request timeout.
    pub fn new(
        scheme: impl Into<String>,
        token: Option<String>,
        timeout: Duration,
    ) -> Result<Self, RpcError> {
        let client = Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| RpcError::Unreachable(e.to_string()))?;
        Ok(Self::with_client(client, scheme, token))
    }

    /// Create with a custom reqwest [`Client`] (for proxies, custom roots, etc.).
    pub fn with_client(client: Client, scheme: impl Into<String>, token: Option<String>) -> Self {
        Self {
            client,
            scheme: scheme.into(),
            token,
        }
    }

    fn url(&self, node: &NodeAddr, path: &str) -> String {
        format!("{}://{}{}", self.scheme, node, path)
    }

    /// Send a request and decode the enveloped response.
    async fn call<Req, Resp>(
        &self,
        method: Method,
        node: &NodeAddr,
        path: &str,
        body: Option<&Req>,
    ) -> Result<Resp, RpcError>
    where
        Req: Serialize + ?Sized + Sync,
        Resp: DeserializeOwned,
    {
        let url = self.url(node, path);
        trace!(%url, "node rpc");

        let mut req = self.client.request(method, &url);
        if let Some(ref token) = self.token {
            req = req.header("Authorization", format!("Bearer {token}"));
        }
        if let Some(body) = body {
            req = req.json(body);
        }
        let resp = req.send().await?;

        let status = resp.status();
        if !status.is_success() {
            let body = resp.text().await.unwrap_or_default();
            return Err(RpcError::Status {
                status: status.as_u16(),
                body: body.chars().take(256).collect(),
            });
        }

        let envelope: Envelope<Resp> = resp
            .json()
            .await
            .map_err(|e| RpcError::Decode(e.to_string()))?;
        Ok(envelope.response)
    }

    /// POST expecting an [`Ack`]; a negative ack becomes [`RpcError::Remote`].
    async fn post_ack<Req>(&self, node: &NodeAddr, path: &str, body: &Req) -> Result<(), RpcError>
    where
        Req: Serialize + ?Sized + Sync,
    {
        let ack: Ack = self.call(Method::POST, node, path, Some(body)).await?;
        if ack.success {
            Ok(())
        } else {
            Err(RpcError::Remote(
                ack.error.unwrap_or_else(|| "unspecified failure".to_string()),
            ))
        }
    }
}

#[async_trait]
impl NodeApi for HttpNodeClient {
    async fn add_user(&self, node: &NodeAddr, request: &AddUserRequest) -> Result<(), RpcError> {
        self.post_ack(node, PATH_ADD_USER, request).await
    }

    async fn add_users(
        &self,
        node: &NodeAddr,
        request: &AddUsersRequest,
    ) -> Result<(), RpcError> {
        self.post_ack(node, PATH_ADD_USERS, request).await
    }

    async fn remove_user(
        &self,
        node: &NodeAddr,
        request: &RemoveUserRequest,
    ) -> Result<(), RpcError> {
        self.post_ack(node, PATH_REMOVE_USER, request).await
    }

    async fn remove_users(
        &self,
        node: &NodeAddr,
        request: &RemoveUsersRequest,
    ) -> Result<(), RpcError> {
        self.post_ack(node, PATH_REMOVE_USERS, request).await
    }

    async fn start_proxy(
        &self,
        node: &NodeAddr,
        request: &StartRequest,
    ) -> Result<StartResponse, RpcError> {
        self.call(Method::POST, node, PATH_START, Some(request)).await
    }

    async fn health(&self, node: &NodeAddr) -> Result<HealthResponse, RpcError> {
        self.call::<(), _>(Method::GET, node, PATH_HEALTH, None).await
    }

    async fn block_ips(&self, node: &NodeAddr, request: &IpListRequest) -> Result<(), RpcError> {
        self.post_ack(node, PATH_BLOCK_IPS, request).await
    }

    async fn unblock_ips(
        &self,
        node: &NodeAddr,
        request: &IpListRequest,
    ) -> Result<(), RpcError> {
        self.post_ack(node, PATH_UNBLOCK_IPS, request).await
    }

    async fn fetch_connected_ips(
        &self,
        node: &NodeAddr,
        username: &str,
    ) -> Result<Vec<String>, RpcError> {
        let request = ConnectedIpsRequest {
            username: username.to_owned(),
        };
        let resp: ConnectedIpsResponse = self
            .call(Method::POST, node, PATH_CONNECTED_IPS, Some(&request))
            .await?;
        Ok(resp.ips)
    }

    async fn fetch_user_usage(
        &self,
        node: &NodeAddr,
        reset: bool,
    ) -> Result<Vec<UserUsage>, RpcError> {
        let request = UsageRequest { reset };
        let resp: UsageResponse = self
            .call(Method::POST, node, PATH_USER_USAGE, Some(&request))
            .await?;
        Ok(resp.users)
    }
}
