//! Ledger administration CLI.
//!
//! Used either as the standalone `fleet-ledger` binary or as the `ledger`
//! subcommand of the unified `fleet-rs` binary.
//!
//! # Usage
//!
//! ```bash
//! # Create tables
//! fleet-ledger init -d sqlite:fleet.db
//!
//! # List users or nodes
//! fleet-ledger users -d sqlite:fleet.db
//! fleet-ledger nodes -d sqlite:fleet.db --format json
//!
//! # Zero a user's period usage
//! fleet-ledger reset-traffic -d sqlite:fleet.db --t-id 42
//! ```

use chrono::{DateTime, Utc};
use clap::{Parser, Subcommand};
use tabled::{Table, Tabled};

use crate::{Ledger, LedgerOptions, NodeRecord, UserRecord};

/// Ledger administration CLI arguments.
#[derive(Parser, Debug, Clone)]
#[command(name = "fleet-ledger", version, about = "Inspect and maintain the fleet ledger")]
pub struct LedgerArgs {
    #[command(subcommand)]
    pub command: LedgerCommands,
}

/// Ledger CLI subcommands.
#[derive(Subcommand, Debug, Clone)]
pub enum LedgerCommands {
    /// Initialize database schema.
    Init {
        /// Database connection URL.
        #[arg(short, long, env = "DATABASE_URL")]
        database: String,
    },

    /// List users with their traffic counters.
    Users {
        /// Database connection URL.
        #[arg(short, long, env = "DATABASE_URL")]
        database: String,

        /// Output format (table, json).
        #[arg(short, long, default_value = "table")]
        format: String,
    },

    /// List nodes with their connectivity state.
    Nodes {
        /// Database connection URL.
        #[arg(short, long, env = "DATABASE_URL")]
        database: String,

        /// Output format (table, json).
        #[arg(short, long, default_value = "table")]
        format: String,
    },

    /// Reset a user's period traffic (lifetime usage is kept).
    ResetTraffic {
        /// Database connection URL.
        #[arg(short, long, env = "DATABASE_URL")]
        database: String,

        /// Internal user id.
        #[arg(short, long)]
        t_id: i64,
    },
}

/// User row for display.
#[derive(Tabled)]
struct UserDisplay {
    #[tabled(rename = "ID")]
    t_id: i64,
    #[tabled(rename = "Username")]
    username: String,
    #[tabled(rename = "Status")]
    status: String,
    #[tabled(rename = "Used")]
    used: String,
    #[tabled(rename = "Limit")]
    limit: String,
    #[tabled(rename = "Lifetime")]
    lifetime: String,
    #[tabled(rename = "Reset")]
    strategy: String,
    #[tabled(rename = "Expires")]
    expires: String,
    #[tabled(rename = "Online")]
    online: String,
}

impl From<&UserRecord> for UserDisplay {
    fn from(user: &UserRecord) -> Self {
        Self {
            t_id: user.t_id,
            username: user.username.clone(),
            status: user.status.to_string(),
            used: format_bytes(user.used_traffic_bytes),
            limit: format_traffic_limit(user.traffic_limit_bytes),
            lifetime: format_bytes(user.lifetime_used_traffic_bytes),
            strategy: user.traffic_limit_strategy.to_string(),
            expires: user.expire_at.map_or_else(|| "Never".to_string(), format_millis),
            online: user.online_at.map_or_else(|| "-".to_string(), format_millis),
        }
    }
}

/// Node row for display.
#[derive(Tabled)]
struct NodeDisplay {
    #[tabled(rename = "UUID")]
    uuid: String,
    #[tabled(rename = "Name")]
    name: String,
    #[tabled(rename = "Address")]
    address: String,
    #[tabled(rename = "State")]
    state: String,
    #[tabled(rename = "Inbounds")]
    inbounds: String,
    #[tabled(rename = "Traffic")]
    traffic: String,
    #[tabled(rename = "Version")]
    version: String,
    #[tabled(rename = "Message")]
    message: String,
}

impl From<&NodeRecord> for NodeDisplay {
    fn from(node: &NodeRecord) -> Self {
        Self {
            uuid: node.uuid.clone(),
            name: node.name.clone(),
            address: format!("{}:{}", node.address, node.port),
            state: node.state().as_str().to_string(),
            inbounds: node
                .active_inbounds
                .iter()
                .map(|i| i.tag.as_str())
                .collect::<Vec<_>>()
                .join(","),
            traffic: format_bytes(node.traffic_used_bytes),
            version: node.proxy_version.clone().unwrap_or_default(),
            message: node.last_status_message.clone().unwrap_or_default(),
        }
    }
}

/// Run the ledger CLI with the given arguments.
pub async fn run(args: LedgerArgs) -> Result<(), Box<dyn std::error::Error>> {
    match args.command {
        LedgerCommands::Init { database } => {
            let ledger = connect(&database).await?;
            ledger.init_schema().await?;
            println!("Database schema initialized successfully.");
            Ok(())
        }
        LedgerCommands::Users { database, format } => {
            let ledger = connect(&database).await?;
            let users = ledger.list_users().await?;
            if format == "json" {
                println!("{}", serde_json::to_string_pretty(&users)?);
            } else if users.is_empty() {
                println!("No users found.");
            } else {
                let rows: Vec<UserDisplay> = users.iter().map(UserDisplay::from).collect();
                println!("{}", Table::new(rows));
            }
            Ok(())
        }
        LedgerCommands::Nodes { database, format } => {
            let ledger = connect(&database).await?;
            let nodes = ledger.list_nodes().await?;
            if format == "json" {
                println!("{}", serde_json::to_string_pretty(&nodes)?);
            } else if nodes.is_empty() {
                println!("No nodes found.");
            } else {
                let rows: Vec<NodeDisplay> = nodes.iter().map(NodeDisplay::from).collect();
                println!("{}", Table::new(rows));
            }
            Ok(())
        }
        LedgerCommands::ResetTraffic { database, t_id } => {
            let ledger = connect(&database).await?;
            let reactivated = ledger.reset_user_traffic(t_id).await?;
            println!("Traffic reset for user {t_id}.");
            if reactivated {
                println!("  User was limited and is active again.");
            }
            Ok(())
        }
    }
}

async fn connect(url: &str) -> Result<Ledger, Box<dyn std::error::Error>> {
    Ok(Ledger::connect(LedgerOptions::new(url).max_connections(1)).await?)
}

/// Format bytes to human readable string.
fn format_bytes(bytes: i64) -> String {
    const KB: i64 = 1024;
    const MB: i64 = KB * 1024;
    const GB: i64 = MB * 1024;
    const TB: i64 = GB * 1024;

    if bytes >= TB {
        format!("{:.2} TB", bytes as f64 / TB as f64)
    } else if bytes >= GB {
        format!("{:.2} GB", bytes as f64 / GB as f64)
    } else if bytes >= MB {
        format!("{:.2} MB", bytes as f64 / MB as f64)
    } else if bytes >= KB {
        format!("{:.2} KB", bytes as f64 / KB as f64)
    } else {
        format!("{} B", bytes)
    }
}

/// Format traffic limit (0 means unlimited).
fn format_traffic_limit(bytes: i64) -> String {
    if bytes == 0 {
        "Unlimited".to_string()
    } else {
        format_bytes(bytes)
    }
}

fn format_millis(ms: i64) -> String {
    DateTime::<Utc>::from_timestamp_millis(ms)
        .map(|dt| dt.format("%Y-%m-%d %H:%M").to_string())
        .unwrap_or_else(|| ms.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn formats_bytes() {
        assert_eq!(format_bytes(512), "512 B");
        assert_eq!(format_bytes(1536), "1.50 KB");
        assert_eq!(format_bytes(3 * 1024 * 1024 * 1024), "3.00 GB");
        assert_eq!(format_traffic_limit(0), "Unlimited");
    }

    #[test]
    fn formats_millis_as_utc() {
        assert_eq!(format_millis(0), "1970-01-01 00:00");
        assert_eq!(format_millis(1_700_000_000_000), "2023-11-14 22:13");
    }

    #[test]
    fn parses_reset_traffic() {
        let args =
            LedgerArgs::try_parse_from(["fleet-ledger", "reset-traffic", "-d", "sqlite::memory:", "-t", "7"])
                .unwrap();
        match args.command {
            LedgerCommands::ResetTraffic { t_id, .. } => assert_eq!(t_id, 7),
            other => panic!("unexpected command: {other:?}"),
        }
    }
}
