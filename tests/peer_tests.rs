//! Extension connection loop tests, driven over in-memory channels.

use std::convert::Infallible;
use std::sync::Arc;
use std::time::Duration;

use axum::extract::ws::Message;
use futures::channel::mpsc::{unbounded, UnboundedReceiver, UnboundedSender};
use futures::StreamExt;
use serde_json::{json, Value};
use tokio::task::JoinHandle;

use opendia_gateway::bridge::{drive_peer, PeerListenerState, PeerRequest};
use opendia_gateway::{CallCorrelator, ExtensionBridge, McpServer};

type Inbound = UnboundedSender<Result<Message, Infallible>>;
type Outbound = UnboundedReceiver<Message>;

struct Gateway {
    bridge: Arc<ExtensionBridge>,
    correlator: Arc<CallCorrelator>,
    server: Arc<McpServer>,
    ping_interval: Duration,
}

fn gateway(ping_interval: Duration) -> Gateway {
    let bridge = Arc::new(ExtensionBridge::new());
    let correlator = Arc::new(CallCorrelator::new(bridge.clone(), Duration::from_secs(5)));
    let server = Arc::new(McpServer::new(bridge.clone(), correlator.clone()));
    Gateway {
        bridge,
        correlator,
        server,
        ping_interval,
    }
}

impl Gateway {
    /// Start a connection loop; returns the extension's ends of the socket.
    fn connect(&self) -> (Inbound, Outbound, JoinHandle<()>) {
        let (to_gateway, from_peer) = unbounded();
        let (to_peer, from_gateway) = unbounded();
        let state = PeerListenerState {
            bridge: self.bridge.clone(),
            correlator: self.correlator.clone(),
            ping_interval: self.ping_interval,
        };
        let handle = tokio::spawn(drive_peer(to_peer, from_peer, state));
        (to_gateway, from_gateway, handle)
    }

    async fn request(&self, body: Value) -> Value {
        let response = self.server.handle_message(&body.to_string()).await.unwrap();
        serde_json::to_value(response).unwrap()
    }
}

fn send(inbound: &Inbound, frame: Value) {
    inbound.unbounded_send(Ok(Message::Text(frame.to_string()))).unwrap();
}

async fn next_text(outbound: &mut Outbound) -> Value {
    loop {
        match outbound.next().await.unwrap() {
            Message::Text(text) => return serde_json::from_str(&text).unwrap(),
            Message::Ping(_) => continue,
            other => panic!("unexpected frame: {:?}", other),
        }
    }
}

/// Round-trip a ping so every earlier frame has been handled.
async fn sync(inbound: &Inbound, outbound: &mut Outbound) {
    send(inbound, json!({"type": "ping"}));
    assert_eq!(next_text(outbound).await["type"], "pong");
}

const HOUR: Duration = Duration::from_secs(3600);

// ============================================================================
// Frames
// ============================================================================

#[tokio::test]
async fn test_ping_frame_gets_pong_with_timestamp() {
    let gw = gateway(HOUR);
    let (inbound, mut outbound, _loop) = gw.connect();

    send(&inbound, json!({"type": "ping"}));
    let pong = next_text(&mut outbound).await;

    assert_eq!(pong["type"], "pong");
    assert!(pong["timestamp"].as_i64().unwrap() > 0);
}

#[tokio::test]
async fn test_register_over_socket_feeds_tools_list() {
    let gw = gateway(HOUR);
    let (inbound, mut outbound, _loop) = gw.connect();

    send(
        &inbound,
        json!({
            "type": "register",
            "tools": [
                {"name": "tab_list", "description": "List tabs", "inputSchema": {"type": "object"}},
                {"name": "custom_tool", "description": "Custom", "inputSchema": {"type": "object"}}
            ]
        }),
    );
    sync(&inbound, &mut outbound).await;

    let response = gw
        .request(json!({"jsonrpc": "2.0", "id": 1, "method": "tools/list"}))
        .await;
    let names: Vec<&str> = response["result"]["tools"]
        .as_array()
        .unwrap()
        .iter()
        .map(|t| t["name"].as_str().unwrap())
        .collect();
    assert_eq!(names, vec!["tab_list", "custom_tool"]);
}

#[tokio::test]
async fn test_tool_call_round_trip_over_socket() {
    let gw = gateway(HOUR);
    let (inbound, mut outbound, _loop) = gw.connect();
    sync(&inbound, &mut outbound).await;

    let server = gw.server.clone();
    let call = tokio::spawn(async move {
        let body = json!({
            "jsonrpc": "2.0",
            "id": 7,
            "method": "tools/call",
            "params": {"name": "custom_tool", "arguments": {"q": 1}}
        });
        server.handle_message(&body.to_string()).await.unwrap()
    });

    let frame = next_text(&mut outbound).await;
    let request: PeerRequest = serde_json::from_value(frame).unwrap();
    assert_eq!(request.method, "custom_tool");
    assert_eq!(request.params, json!({"q": 1}));

    // An unrecognised event type still carries a response.
    send(
        &inbound,
        json!({"type": "tool_response", "id": request.id, "result": {"answer": 42}}),
    );

    let response = serde_json::to_value(call.await.unwrap()).unwrap();
    assert_eq!(response["result"]["isError"], false);
    assert!(response["result"]["content"][0]["text"]
        .as_str()
        .unwrap()
        .contains("42"));
}

// ============================================================================
// Connection lifecycle
// ============================================================================

#[tokio::test]
async fn test_close_detaches_and_calls_report_not_connected() {
    let gw = gateway(HOUR);
    let (inbound, mut outbound, handle) = gw.connect();
    sync(&inbound, &mut outbound).await;
    assert!(gw.bridge.is_connected().await);

    drop(inbound);
    handle.await.unwrap();
    assert!(!gw.bridge.is_connected().await);

    let response = gw
        .request(json!({
            "jsonrpc": "2.0",
            "id": 2,
            "method": "tools/call",
            "params": {"name": "tab_list", "arguments": {}}
        }))
        .await;
    assert_eq!(response["result"]["isError"], true);
    assert!(response["result"]["content"][0]["text"]
        .as_str()
        .unwrap()
        .contains("Browser Extension not connected"));
}

#[tokio::test]
async fn test_replaced_connection_still_settles_late_response() {
    let gw = gateway(HOUR);
    let (old_inbound, mut old_outbound, old_loop) = gw.connect();
    sync(&old_inbound, &mut old_outbound).await;

    let correlator = gw.correlator.clone();
    let pending = tokio::spawn(async move { correlator.call("tab_list", json!({})).await });
    let request: PeerRequest = serde_json::from_value(next_text(&mut old_outbound).await).unwrap();

    let (new_inbound, mut new_outbound, _new_loop) = gw.connect();
    sync(&new_inbound, &mut new_outbound).await;

    send(&old_inbound, json!({"id": request.id, "result": {"from": "old"}}));
    assert_eq!(pending.await.unwrap().unwrap(), json!({"from": "old"}));

    // Closing the superseded socket leaves the new connection in place.
    drop(old_inbound);
    old_loop.await.unwrap();
    assert!(gw.bridge.is_connected().await);
}

#[tokio::test(start_paused = true)]
async fn test_liveness_probe_sends_ping() {
    let gw = gateway(Duration::from_secs(30));
    let (_inbound, mut outbound, _loop) = gw.connect();

    assert!(matches!(outbound.next().await.unwrap(), Message::Ping(_)));
}
