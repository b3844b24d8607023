//! Domain event types.

use std::fmt;

use serde::Serialize;

/// User identity carried by user events.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct UserRef {
    pub t_id: i64,
    pub uuid: String,
    pub username: String,
    /// Key the remote nodes index the user's sessions by.
    pub vless_uuid: String,
}

/// Node identity carried by connectivity events.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct NodeRef {
    pub uuid: String,
    pub name: String,
    pub address: String,
    pub port: u16,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum EventKind {
    UserExpired,
    UserLimited,
    ThresholdReached,
    FirstConnected,
    ConnectionLost,
    ConnectionRestored,
}

impl EventKind {
    pub const ALL: [EventKind; 6] = [
        EventKind::UserExpired,
        EventKind::UserLimited,
        EventKind::ThresholdReached,
        EventKind::FirstConnected,
        EventKind::ConnectionLost,
        EventKind::ConnectionRestored,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            EventKind::UserExpired => "user.expired",
            EventKind::UserLimited => "user.limited",
            EventKind::ThresholdReached => "user.threshold_reached",
            EventKind::FirstConnected => "user.first_connected",
            EventKind::ConnectionLost => "node.connection_lost",
            EventKind::ConnectionRestored => "node.connection_restored",
        }
    }
}

impl fmt::Display for EventKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Something the ledger or a node reported that other components act on.
///
/// Published only after the ledger write that produced it has committed.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum FleetEvent {
    UserExpired { user: UserRef },
    UserLimited { user: UserRef },
    ThresholdReached { user: UserRef, percentage: i64 },
    FirstConnected { user: UserRef },
    ConnectionLost { node: NodeRef, reason: String },
    ConnectionRestored { node: NodeRef },
}

impl FleetEvent {
    pub fn kind(&self) -> EventKind {
        match self {
            FleetEvent::UserExpired { .. } => EventKind::UserExpired,
            FleetEvent::UserLimited { .. } => EventKind::UserLimited,
            FleetEvent::ThresholdReached { .. } => EventKind::ThresholdReached,
            FleetEvent::FirstConnected { .. } => EventKind::FirstConnected,
            FleetEvent::ConnectionLost { .. } => EventKind::ConnectionLost,
            FleetEvent::ConnectionRestored { .. } => EventKind::ConnectionRestored,
        }
    }

    pub fn user(&self) -> Option<&UserRef> {
        match self {
            FleetEvent::UserExpired { user }
            | FleetEvent::UserLimited { user }
            | FleetEvent::ThresholdReached { user, .. }
            | FleetEvent::FirstConnected { user } => Some(user),
            _ => None,
        }
    }

    pub fn node(&self) -> Option<&NodeRef> {
        match self {
            FleetEvent::ConnectionLost { node, .. } | FleetEvent::ConnectionRestored { node } => {
                Some(node)
            }
            _ => None,
        }
    }
}
