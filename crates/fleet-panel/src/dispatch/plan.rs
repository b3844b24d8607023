//! Dispatch planning.
//!
//! Every plan is recomputed from the resolved ledger state and the node
//! list; nothing about previous dispatches is remembered.

use std::collections::{BTreeSet, HashSet};

use fleet_ledger::{InboundRecord, NodeRecord, ResolvedUser, UserCredentials};
use fleet_node::{
    AddUserRequest, AddUsersRequest, HashData, InboundUserPayload, NodeAddr, RemoveUserRequest,
    RemoveUsersRequest,
};
use tracing::error;

use super::payload::{build_payload, node_username};

/// The node a job is addressed to.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NodeTarget {
    pub uuid: String,
    pub name: String,
    pub addr: NodeAddr,
}

impl From<&NodeRecord> for NodeTarget {
    fn from(node: &NodeRecord) -> Self {
        Self {
            uuid: node.uuid.clone(),
            name: node.name.clone(),
            addr: NodeAddr::new(node.address.clone(), node.port),
        }
    }
}

/// RPC a dispatch job performs.
#[derive(Debug, Clone, PartialEq)]
pub enum NodeCommand {
    AddUser(AddUserRequest),
    RemoveUser(RemoveUserRequest),
    AddUsers(AddUsersRequest),
    RemoveUsers(RemoveUsersRequest),
}

impl NodeCommand {
    pub fn kind(&self) -> &'static str {
        match self {
            NodeCommand::AddUser(_) => "add_user",
            NodeCommand::RemoveUser(_) => "remove_user",
            NodeCommand::AddUsers(_) => "add_users",
            NodeCommand::RemoveUsers(_) => "remove_users",
        }
    }
}

/// One (node, command) pair of a dispatch cycle.
#[derive(Debug, Clone, PartialEq)]
pub struct DispatchTarget {
    pub node: NodeTarget,
    pub command: NodeCommand,
}

/// Identity needed to evict a user from a node.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RemovalKey {
    pub t_id: i64,
    pub vless_uuid: String,
    pub prev_vless_uuid: Option<String>,
}

impl RemovalKey {
    fn request(&self) -> RemoveUserRequest {
        RemoveUserRequest {
            username: node_username(self.t_id),
            hash_data: HashData {
                vless_uuid: self.vless_uuid.clone(),
                prev_vless_uuid: self.prev_vless_uuid.clone(),
            },
        }
    }
}

/// Provisioning entries for `user` restricted to the node's active tags.
///
/// Inbounds are deduplicated by tag. An inbound whose protocol has no
/// payload mapping is logged and left out.
pub fn node_entries(
    user: &UserCredentials,
    inbounds: &[InboundRecord],
    active_tags: &HashSet<&str>,
) -> Vec<InboundUserPayload> {
    let mut seen = HashSet::new();
    inbounds
        .iter()
        .filter(|ib| active_tags.contains(ib.tag.as_str()))
        .filter(|ib| seen.insert(ib.tag.as_str()))
        .filter_map(|ib| match build_payload(ib, user) {
            Ok(payload) => Some(payload),
            Err(e) => {
                error!(t_id = user.t_id, error = %e, "skipping inbound payload");
                fleet_metrics::record_payload_skipped(fleet_core::ERROR_UNSUPPORTED_PROTOCOL);
                None
            }
        })
        .collect()
}

fn active_tags(node: &NodeRecord) -> HashSet<&str> {
    node.active_inbounds.iter().map(|ib| ib.tag.as_str()).collect()
}

/// Jobs bringing every eligible node in line with one user.
///
/// A user without any resolved inbound yields no jobs. A node sharing no
/// inbound with the user gets a removal, otherwise an add carrying only
/// the shared inbounds.
pub fn plan_user_sync(
    user: &ResolvedUser,
    prev_vless_uuid: Option<&str>,
    nodes: &[NodeRecord],
) -> Vec<DispatchTarget> {
    if user.inbounds.is_empty() {
        return Vec::new();
    }

    let creds = &user.credentials;
    let hash_data = HashData {
        vless_uuid: creds.vless_uuid.clone(),
        prev_vless_uuid: prev_vless_uuid.map(str::to_string),
    };

    nodes
        .iter()
        .filter(|node| node.is_eligible())
        .map(|node| {
            let entries = node_entries(creds, &user.inbounds, &active_tags(node));
            let command = if entries.is_empty() {
                NodeCommand::RemoveUser(RemoveUserRequest {
                    username: node_username(creds.t_id),
                    hash_data: hash_data.clone(),
                })
            } else {
                NodeCommand::AddUser(AddUserRequest {
                    data: entries,
                    hash_data: hash_data.clone(),
                })
            };
            DispatchTarget {
                node: node.into(),
                command,
            }
        })
        .collect()
}

/// Bulk variant of [`plan_user_sync`]: at most one add and one remove job
/// per node, each covering many users.
pub fn plan_bulk_sync(users: &[ResolvedUser], nodes: &[NodeRecord]) -> Vec<DispatchTarget> {
    let users: Vec<&ResolvedUser> = users.iter().filter(|u| !u.inbounds.is_empty()).collect();
    if users.is_empty() {
        return Vec::new();
    }

    let mut targets = Vec::new();
    for node in nodes.iter().filter(|node| node.is_eligible()) {
        let tags = active_tags(node);
        let mut provision = Vec::new();
        let mut deprovision = Vec::new();

        for user in &users {
            let creds = &user.credentials;
            let hash_data = HashData {
                vless_uuid: creds.vless_uuid.clone(),
                prev_vless_uuid: None,
            };
            let entries = node_entries(creds, &user.inbounds, &tags);
            if entries.is_empty() {
                deprovision.push(RemoveUserRequest {
                    username: node_username(creds.t_id),
                    hash_data,
                });
            } else {
                provision.push(AddUserRequest {
                    data: entries,
                    hash_data,
                });
            }
        }

        let target: NodeTarget = node.into();
        if !provision.is_empty() {
            let affected: BTreeSet<&str> = tags.iter().copied().collect();
            targets.push(DispatchTarget {
                node: target.clone(),
                command: NodeCommand::AddUsers(AddUsersRequest {
                    affected_inbound_tags: affected.into_iter().map(str::to_string).collect(),
                    users: provision,
                }),
            });
        }
        if !deprovision.is_empty() {
            targets.push(DispatchTarget {
                node: target,
                command: NodeCommand::RemoveUsers(RemoveUsersRequest {
                    users: deprovision,
                }),
            });
        }
    }
    targets
}

/// Removal of one user from every connected node, regardless of inbounds.
pub fn plan_desync(key: &RemovalKey, nodes: &[NodeRecord]) -> Vec<DispatchTarget> {
    connected(nodes)
        .map(|node| DispatchTarget {
            node: node.into(),
            command: NodeCommand::RemoveUser(key.request()),
        })
        .collect()
}

/// Removal of many users: one job per connected node.
pub fn plan_bulk_desync(keys: &[RemovalKey], nodes: &[NodeRecord]) -> Vec<DispatchTarget> {
    if keys.is_empty() {
        return Vec::new();
    }
    let request = RemoveUsersRequest {
        users: keys.iter().map(RemovalKey::request).collect(),
    };
    connected(nodes)
        .map(|node| DispatchTarget {
            node: node.into(),
            command: NodeCommand::RemoveUsers(request.clone()),
        })
        .collect()
}

fn connected(nodes: &[NodeRecord]) -> impl Iterator<Item = &NodeRecord> {
    nodes.iter().filter(|n| !n.is_disabled && n.is_connected)
}
