//! End-to-end fleet scenarios against in-memory SQLite and a recording
//! node transport.

use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use async_trait::async_trait;
use fleet_events::{EventKind, FleetEvent, HandlerError};
use fleet_ledger::{
    Ledger, LedgerOptions, NewInbound, NewNode, NewUser, NodeState, TrafficLimitStrategy,
    UserStatus,
};
use fleet_node::{
    AddUserRequest, AddUsersRequest, HealthResponse, IpListRequest, NodeAddr, NodeApi,
    RemoveUserRequest, RemoveUsersRequest, RpcError, StartRequest, StartResponse, UserUsage,
};
use fleet_panel::{HealthOutcome, Notifier, Panel, PanelContext, PanelSettings};
use parking_lot::Mutex;
use serde_json::json;

#[derive(Debug, Clone)]
enum Call {
    AddUser(String, AddUserRequest),
    RemoveUser(String, RemoveUserRequest),
    AddUsers(String, AddUsersRequest),
    RemoveUsers(String, RemoveUsersRequest),
    Start(String, StartRequest),
}

impl Call {
    fn address(&self) -> &str {
        match self {
            Call::AddUser(a, _)
            | Call::RemoveUser(a, _)
            | Call::AddUsers(a, _)
            | Call::RemoveUsers(a, _)
            | Call::Start(a, _) => a,
        }
    }
}

#[derive(Default)]
struct MockNodes {
    calls: Mutex<Vec<Call>>,
    unreachable: Mutex<HashSet<String>>,
    running: Mutex<HashSet<String>>,
    usage: Mutex<HashMap<String, Vec<UserUsage>>>,
}

impl MockNodes {
    fn check(&self, node: &NodeAddr) -> Result<(), RpcError> {
        if self.unreachable.lock().contains(&node.address) {
            return Err(RpcError::Unreachable(format!("{node}: connection refused")));
        }
        Ok(())
    }

    fn record(&self, node: &NodeAddr, call: Call) -> Result<(), RpcError> {
        self.check(node)?;
        self.calls.lock().push(call);
        Ok(())
    }

    fn calls(&self) -> Vec<Call> {
        self.calls.lock().clone()
    }

    fn take_calls(&self) -> Vec<Call> {
        std::mem::take(&mut *self.calls.lock())
    }

    fn report(&self, address: &str, t_id: i64, bytes: u64) {
        self.usage
            .lock()
            .entry(address.to_string())
            .or_default()
            .push(UserUsage {
                username: t_id.to_string(),
                uplink: bytes,
                downlink: 0,
            });
    }
}

#[async_trait]
impl NodeApi for MockNodes {
    async fn add_user(&self, node: &NodeAddr, request: &AddUserRequest) -> Result<(), RpcError> {
        self.record(node, Call::AddUser(node.address.clone(), request.clone()))
    }

    async fn add_users(&self, node: &NodeAddr, request: &AddUsersRequest) -> Result<(), RpcError> {
        self.record(node, Call::AddUsers(node.address.clone(), request.clone()))
    }

    async fn remove_user(
        &self,
        node: &NodeAddr,
        request: &RemoveUserRequest,
    ) -> Result<(), RpcError> {
        self.record(node, Call::RemoveUser(node.address.clone(), request.clone()))
    }

    async fn remove_users(
        &self,
        node: &NodeAddr,
        request: &RemoveUsersRequest,
    ) -> Result<(), RpcError> {
        self.record(node, Call::RemoveUsers(node.address.clone(), request.clone()))
    }

    async fn start_proxy(
        &self,
        node: &NodeAddr,
        request: &StartRequest,
    ) -> Result<StartResponse, RpcError> {
        self.record(node, Call::Start(node.address.clone(), request.clone()))?;
        self.running.lock().insert(node.address.clone());
        Ok(StartResponse {
            is_started: true,
            version: Some("25.1.0".into()),
            error: None,
            system_info: None,
        })
    }

    async fn health(&self, node: &NodeAddr) -> Result<HealthResponse, RpcError> {
        self.check(node)?;
        Ok(HealthResponse {
            proxy_running: self.running.lock().contains(&node.address),
            version: Some("25.1.0".into()),
        })
    }

    async fn block_ips(&self, node: &NodeAddr, _request: &IpListRequest) -> Result<(), RpcError> {
        self.check(node)
    }

    async fn unblock_ips(&self, node: &NodeAddr, _request: &IpListRequest) -> Result<(), RpcError> {
        self.check(node)
    }

    async fn fetch_connected_ips(
        &self,
        node: &NodeAddr,
        username: &str,
    ) -> Result<Vec<String>, RpcError> {
        self.check(node)?;
        Ok(vec![format!("198.51.100.{username}")])
    }

    async fn fetch_user_usage(&self, node: &NodeAddr, reset: bool) -> Result<Vec<UserUsage>, RpcError> {
        self.check(node)?;
        let mut usage = self.usage.lock();
        Ok(if reset {
            usage.remove(&node.address).unwrap_or_default()
        } else {
            usage.get(&node.address).cloned().unwrap_or_default()
        })
    }
}

#[derive(Default)]
struct RecordingNotifier {
    events: Mutex<Vec<FleetEvent>>,
}

impl RecordingNotifier {
    fn count(&self, kind: EventKind) -> usize {
        self.events.lock().iter().filter(|e| e.kind() == kind).count()
    }
}

#[async_trait]
impl Notifier for RecordingNotifier {
    async fn notify(&self, event: &FleetEvent) -> Result<(), HandlerError> {
        self.events.lock().push(event.clone());
        Ok(())
    }
}

struct Fleet {
    panel: Arc<Panel>,
    nodes: Arc<MockNodes>,
    notifier: Arc<RecordingNotifier>,
}

const N1: &str = "10.0.0.1";
const N2: &str = "10.0.0.2";
const N3: &str = "10.0.0.3";

/// Profile `p1` with vless, trojan and shadowsocks inbounds. Group `g1`
/// gets vless and trojan. Node n1 runs vless+trojan, n2 trojan only, n3
/// shadowsocks only.
async fn setup_fleet() -> Fleet {
    let ledger = Ledger::connect(LedgerOptions::new("sqlite::memory:").max_connections(1))
        .await
        .expect("Failed to connect");
    ledger.init_schema().await.expect("Failed to create schema");

    ledger
        .create_profile("p1", "main", &json!({"log": {"loglevel": "warning"}}))
        .await
        .unwrap();
    let inbounds = [
        NewInbound::new("i-vless", "vless-in", "vless").transport("tcp", "reality"),
        NewInbound::new("i-trojan", "trojan-in", "trojan").transport("tcp", "tls"),
        NewInbound::new("i-ss", "ss-in", "shadowsocks").method("aes-256-gcm"),
    ];
    for (pos, inbound) in inbounds.iter().enumerate() {
        ledger
            .add_profile_inbound("p1", inbound, pos as i64)
            .await
            .unwrap();
    }
    ledger.grant_group_inbound("g1", "i-vless").await.unwrap();
    ledger.grant_group_inbound("g1", "i-trojan").await.unwrap();

    for (uuid, address, active) in [
        ("n1", N1, vec!["i-vless", "i-trojan"]),
        ("n2", N2, vec!["i-trojan"]),
        ("n3", N3, vec!["i-ss"]),
    ] {
        ledger
            .create_node(&NewNode::new(uuid, format!("edge-{uuid}"), address, 2222))
            .await
            .unwrap();
        let active: Vec<String> = active.into_iter().map(str::to_string).collect();
        ledger.assign_node_profile(uuid, "p1", &active).await.unwrap();
    }

    let nodes = Arc::new(MockNodes::default());
    let notifier = Arc::new(RecordingNotifier::default());
    let ctx = PanelContext::new(Arc::new(ledger), nodes.clone(), PanelSettings::default());
    let panel = Panel::start(ctx, notifier.clone());

    Fleet {
        panel,
        nodes,
        notifier,
    }
}

async fn add_user(fleet: &Fleet, name: &str, limit: i64) -> i64 {
    let ledger = fleet.panel.ledger();
    let t_id = ledger
        .create_user(
            &NewUser::new(format!("uuid-{name}"), name).traffic_limit(limit, TrafficLimitStrategy::Month),
        )
        .await
        .unwrap();
    ledger.add_user_to_group(t_id, "g1").await.unwrap();
    t_id
}

async fn connect_all(fleet: &Fleet) {
    for uuid in ["n1", "n2", "n3"] {
        fleet.panel.start_node(uuid).await.unwrap();
    }
    fleet.panel.wait_idle().await;
    fleet.nodes.take_calls();
}

fn tags(req: &AddUserRequest) -> Vec<&str> {
    let mut tags: Vec<_> = req.data.iter().map(|p| p.tag()).collect();
    tags.sort_unstable();
    tags
}

#[tokio::test]
async fn sync_user_recomputes_every_node() {
    let fleet = setup_fleet().await;
    let t_id = add_user(&fleet, "alice", 0).await;

    assert_eq!(fleet.panel.sync_user(t_id, None).await.unwrap(), 3);
    fleet.panel.wait_idle().await;

    let calls = fleet.nodes.calls();
    assert_eq!(calls.len(), 3);
    for call in &calls {
        match call {
            Call::AddUser(addr, req) if addr == N1 => {
                assert_eq!(tags(req), vec!["trojan-in", "vless-in"]);
                assert_eq!(req.hash_data.vless_uuid, "uuid-alice");
            }
            Call::AddUser(addr, req) if addr == N2 => assert_eq!(tags(req), vec!["trojan-in"]),
            Call::RemoveUser(addr, req) if addr == N3 => assert_eq!(req.username, t_id.to_string()),
            other => panic!("unexpected call {other:?}"),
        }
    }
}

#[tokio::test]
async fn repeated_sync_sends_identical_payloads() {
    let fleet = setup_fleet().await;
    let t_id = add_user(&fleet, "alice", 0).await;

    fleet.panel.sync_user(t_id, None).await.unwrap();
    fleet.panel.wait_idle().await;
    let mut first: Vec<String> = fleet.nodes.take_calls().iter().map(|c| format!("{c:?}")).collect();

    fleet.panel.sync_user(t_id, None).await.unwrap();
    fleet.panel.wait_idle().await;
    let mut second: Vec<String> = fleet.nodes.take_calls().iter().map(|c| format!("{c:?}")).collect();

    first.sort();
    second.sort();
    assert_eq!(first, second);
}

#[tokio::test]
async fn missing_or_inactive_user_is_noop() {
    let fleet = setup_fleet().await;
    assert_eq!(fleet.panel.sync_user(9999, None).await.unwrap(), 0);

    let t_id = add_user(&fleet, "bob", 0).await;
    fleet
        .panel
        .ledger()
        .set_user_status(t_id, UserStatus::Disabled)
        .await
        .unwrap();
    assert_eq!(fleet.panel.sync_user(t_id, None).await.unwrap(), 0);
    assert_eq!(fleet.panel.sync_users(&[t_id]).await.unwrap(), 0);
}

#[tokio::test]
async fn unreachable_node_does_not_block_siblings() {
    let fleet = setup_fleet().await;
    let a = add_user(&fleet, "alice", 0).await;
    let b = add_user(&fleet, "bob", 0).await;
    fleet.nodes.unreachable.lock().insert(N2.to_string());

    fleet.panel.sync_users(&[a, b]).await.unwrap();
    fleet.panel.wait_idle().await;

    let calls = fleet.nodes.calls();
    let addresses: HashSet<&str> = calls.iter().map(Call::address).collect();
    assert_eq!(addresses, HashSet::from([N1, N3]));
    for call in &calls {
        match call {
            Call::AddUsers(addr, req) => {
                assert_eq!(addr, N1);
                assert_eq!(req.users.len(), 2);
                assert_eq!(req.affected_inbound_tags, vec!["trojan-in", "vless-in"]);
            }
            Call::RemoveUsers(addr, req) => {
                assert_eq!(addr, N3);
                assert_eq!(req.users.len(), 2);
            }
            other => panic!("unexpected call {other:?}"),
        }
    }
}

#[tokio::test]
async fn credential_rotation_carries_previous_key() {
    let fleet = setup_fleet().await;
    let t_id = add_user(&fleet, "alice", 0).await;

    fleet
        .panel
        .rotate_user_credentials(t_id, "vless-new", "tr-new", "ss-new")
        .await
        .unwrap();
    fleet.panel.wait_idle().await;

    let adds: Vec<AddUserRequest> = fleet
        .nodes
        .calls()
        .into_iter()
        .filter_map(|c| match c {
            Call::AddUser(_, req) => Some(req),
            _ => None,
        })
        .collect();
    assert_eq!(adds.len(), 2);
    for req in adds {
        assert_eq!(req.hash_data.vless_uuid, "vless-new");
        assert_eq!(req.hash_data.prev_vless_uuid.as_deref(), Some("uuid-alice"));
    }
}

#[tokio::test]
async fn limited_user_is_evicted_and_reset_reprovisions() {
    let fleet = setup_fleet().await;
    let t_id = add_user(&fleet, "alice", 1000).await;
    connect_all(&fleet).await;
    fleet
        .panel
        .ledger()
        .set_node_disabled("n3", true)
        .await
        .unwrap();

    fleet.nodes.report(N1, t_id, 600);
    fleet.nodes.report(N2, t_id, 600);
    let sweep = fleet.panel.record_usage().await.unwrap();
    assert_eq!(sweep.nodes_polled, 2);
    assert_eq!(sweep.users_updated, 1);
    assert_eq!(sweep.first_connections, 1);

    assert_eq!(fleet.panel.mark_limited().await.unwrap(), 1);
    fleet.panel.wait_idle().await;

    let user = fleet.panel.ledger().get_user(t_id).await.unwrap().unwrap();
    assert_eq!(user.status, UserStatus::Limited);
    assert_eq!(user.used_traffic_bytes, 1200);

    let removals: HashSet<String> = fleet
        .nodes
        .take_calls()
        .into_iter()
        .filter_map(|c| match c {
            Call::RemoveUser(addr, req) => {
                assert_eq!(req.hash_data.vless_uuid, "uuid-alice");
                Some(addr)
            }
            _ => None,
        })
        .collect();
    assert_eq!(removals, HashSet::from([N1.to_string(), N2.to_string()]));
    assert_eq!(fleet.notifier.count(EventKind::UserLimited), 1);
    assert_eq!(fleet.notifier.count(EventKind::FirstConnected), 1);

    // Still limited: a second scan claims nobody.
    assert_eq!(fleet.panel.mark_limited().await.unwrap(), 0);

    fleet
        .panel
        .reset_period(TrafficLimitStrategy::Month)
        .await
        .unwrap();
    fleet.panel.wait_idle().await;

    let user = fleet.panel.ledger().get_user(t_id).await.unwrap().unwrap();
    assert_eq!(user.status, UserStatus::Active);
    assert_eq!(user.used_traffic_bytes, 0);
    assert_eq!(user.lifetime_used_traffic_bytes, 1200);

    let bulk_adds: HashSet<String> = fleet
        .nodes
        .take_calls()
        .into_iter()
        .filter_map(|c| match c {
            Call::AddUsers(addr, _) => Some(addr),
            _ => None,
        })
        .collect();
    assert_eq!(bulk_adds, HashSet::from([N1.to_string(), N2.to_string()]));
}

#[tokio::test]
async fn first_connection_is_announced_once() {
    let fleet = setup_fleet().await;
    let t_id = add_user(&fleet, "alice", 0).await;
    connect_all(&fleet).await;

    fleet.nodes.report(N1, t_id, 10);
    fleet.panel.record_usage().await.unwrap();
    fleet.nodes.report(N1, t_id, 10);
    fleet.panel.record_usage().await.unwrap();
    fleet.panel.wait_idle().await;

    assert_eq!(fleet.notifier.count(EventKind::FirstConnected), 1);
    let node = fleet.panel.ledger().get_node("n1").await.unwrap().unwrap();
    assert_eq!(node.traffic_used_bytes, 20);
}

#[tokio::test]
async fn threshold_crossing_is_announced_at_highest_percentage() {
    let fleet = setup_fleet().await;
    let t_id = add_user(&fleet, "alice", 1000).await;
    connect_all(&fleet).await;

    fleet.nodes.report(N1, t_id, 960);
    fleet.panel.record_usage().await.unwrap();
    assert_eq!(fleet.panel.evaluate_thresholds().await.unwrap(), 1);
    assert_eq!(fleet.panel.evaluate_thresholds().await.unwrap(), 0);
    fleet.panel.wait_idle().await;

    let reached: Vec<i64> = fleet
        .notifier
        .events
        .lock()
        .iter()
        .filter_map(|e| match e {
            FleetEvent::ThresholdReached { percentage, .. } => Some(*percentage),
            _ => None,
        })
        .collect();
    assert_eq!(reached, vec![95]);
}

#[tokio::test]
async fn jump_past_limit_reports_watermark_and_limits_in_one_tick() {
    let fleet = setup_fleet().await;
    let t_id = add_user(&fleet, "alice", 1000).await;
    connect_all(&fleet).await;

    fleet.nodes.report(N1, t_id, 400);
    fleet.panel.record_usage().await.unwrap();
    fleet.nodes.report(N1, t_id, 650);
    fleet.panel.record_usage().await.unwrap();

    // 40% -> 105%
    assert_eq!(fleet.panel.check_thresholds().await.unwrap(), (1, 1));
    assert_eq!(fleet.panel.check_thresholds().await.unwrap(), (0, 0));
    fleet.panel.wait_idle().await;

    let events = fleet.notifier.events.lock().clone();
    let reached: Vec<i64> = events
        .iter()
        .filter_map(|e| match e {
            FleetEvent::ThresholdReached { percentage, .. } => Some(*percentage),
            _ => None,
        })
        .collect();
    assert_eq!(reached, vec![95]);
    assert_eq!(fleet.notifier.count(EventKind::UserLimited), 1);

    let user = fleet.panel.ledger().get_user(t_id).await.unwrap().unwrap();
    assert_eq!(user.status, UserStatus::Limited);
    assert_eq!(user.last_triggered_threshold, 95);
}

#[tokio::test]
async fn expired_user_is_evicted() {
    let fleet = setup_fleet().await;
    let ledger = fleet.panel.ledger();
    let t_id = ledger
        .create_user(&NewUser::new("uuid-old", "old").expire_at(1))
        .await
        .unwrap();
    connect_all(&fleet).await;

    assert_eq!(fleet.panel.mark_expired().await.unwrap(), 1);
    fleet.panel.wait_idle().await;

    let user = fleet.panel.ledger().get_user(t_id).await.unwrap().unwrap();
    assert_eq!(user.status, UserStatus::Expired);
    let removals = fleet
        .nodes
        .calls()
        .iter()
        .filter(|c| matches!(c, Call::RemoveUser(..)))
        .count();
    assert_eq!(removals, 3);
    assert_eq!(fleet.notifier.count(EventKind::UserExpired), 1);
}

#[tokio::test]
async fn health_check_starts_idle_nodes_and_detects_loss() {
    let fleet = setup_fleet().await;
    add_user(&fleet, "alice", 0).await;

    let outcomes = fleet.panel.check_nodes().await.unwrap();
    assert_eq!(outcomes.len(), 3);
    assert!(outcomes.iter().all(|(_, o)| *o == HealthOutcome::StartQueued));
    fleet.panel.wait_idle().await;

    for uuid in ["n1", "n2", "n3"] {
        let node = fleet.panel.ledger().get_node(uuid).await.unwrap().unwrap();
        assert_eq!(node.state(), NodeState::Connected, "{uuid}");
        assert_eq!(node.proxy_version.as_deref(), Some("25.1.0"));
    }
    assert_eq!(fleet.notifier.count(EventKind::ConnectionRestored), 3);

    fleet.nodes.unreachable.lock().insert(N2.to_string());
    let outcomes: HashMap<String, HealthOutcome> =
        fleet.panel.check_nodes().await.unwrap().into_iter().collect();
    assert_eq!(outcomes["n1"], HealthOutcome::Healthy);
    assert_eq!(outcomes["n2"], HealthOutcome::Unreachable);
    fleet.panel.wait_idle().await;

    let n2 = fleet.panel.ledger().get_node("n2").await.unwrap().unwrap();
    assert_eq!(n2.state(), NodeState::Offline);
    assert!(n2.last_status_message.unwrap().contains("connection refused"));
    assert_eq!(fleet.notifier.count(EventKind::ConnectionLost), 1);

    // Already offline: no second loss event.
    fleet.panel.check_nodes().await.unwrap();
    fleet.panel.wait_idle().await;
    assert_eq!(fleet.notifier.count(EventKind::ConnectionLost), 1);
}

#[tokio::test]
async fn failed_start_bookkeeping_keeps_node_in_health_rotation() {
    let fleet = setup_fleet().await;
    add_user(&fleet, "alice", 0).await;
    let ledger = fleet.panel.ledger();

    sqlx::query(
        "CREATE TRIGGER reject_version BEFORE UPDATE OF proxy_version ON nodes \
         BEGIN SELECT RAISE(ABORT, 'disk I/O error'); END",
    )
    .execute(ledger.pool())
    .await
    .unwrap();

    fleet.panel.start_node("n1").await.unwrap();
    let n1 = ledger.get_node("n1").await.unwrap().unwrap();
    assert!(!n1.is_connecting);
    assert!(!n1.is_connected);

    sqlx::query("DROP TRIGGER reject_version")
        .execute(ledger.pool())
        .await
        .unwrap();

    let outcomes: HashMap<String, HealthOutcome> =
        fleet.panel.check_nodes().await.unwrap().into_iter().collect();
    assert_eq!(outcomes["n1"], HealthOutcome::StartQueued);
    fleet.panel.wait_idle().await;
    let n1 = ledger.get_node("n1").await.unwrap().unwrap();
    assert_eq!(n1.state(), NodeState::Connected);
}

#[tokio::test]
async fn fleet_restart_resolves_profile_once_per_node_set() {
    let fleet = setup_fleet().await;
    add_user(&fleet, "alice", 0).await;

    assert_eq!(fleet.panel.restart_all_nodes().await.unwrap(), 1);
    fleet.panel.wait_idle().await;

    let starts: HashMap<String, StartRequest> = fleet
        .nodes
        .calls()
        .into_iter()
        .filter_map(|c| match c {
            Call::Start(addr, req) => Some((addr, req)),
            _ => None,
        })
        .collect();
    assert_eq!(starts.len(), 3);

    let n2 = &starts[N2];
    assert_eq!(n2.config["log"]["loglevel"], "warning");
    assert_eq!(n2.inbounds.len(), 1);
    assert_eq!(n2.inbounds[0].tag, "trojan-in");
    assert_eq!(n2.inbounds[0].users.len(), 1);

    let n3 = &starts[N3];
    assert_eq!(n3.inbounds[0].tag, "ss-in");
    assert!(n3.inbounds[0].users.is_empty());
}

#[tokio::test]
async fn disabled_node_is_left_alone() {
    let fleet = setup_fleet().await;
    let t_id = add_user(&fleet, "alice", 0).await;
    fleet
        .panel
        .ledger()
        .set_node_disabled("n1", true)
        .await
        .unwrap();

    let outcomes = fleet.panel.check_nodes().await.unwrap();
    assert!(outcomes.iter().all(|(uuid, _)| uuid != "n1"));
    fleet.panel.wait_idle().await;
    fleet.nodes.take_calls();

    fleet.panel.sync_user(t_id, None).await.unwrap();
    fleet.panel.wait_idle().await;
    assert!(fleet.nodes.calls().iter().all(|c| c.address() != N1));
}

#[tokio::test]
async fn connected_ips_pass_through() {
    let fleet = setup_fleet().await;
    let ips = fleet.panel.fetch_connected_ips("n1", 7).await.unwrap();
    assert_eq!(ips, vec!["198.51.100.7".to_string()]);

    fleet
        .panel
        .block_ips("n1", vec!["203.0.113.9".into()])
        .await
        .unwrap();
    let err = fleet.panel.fetch_connected_ips("missing", 7).await.unwrap_err();
    assert!(err.to_string().contains("not found"));
}
