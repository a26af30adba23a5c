//! Extension bridge: the single live browser-extension connection.
//!
//! The bridge owns the connection handle and the tool catalog the extension
//! registered over it. Both live behind one lock so that replacing or
//! clearing the connection and its catalog is atomic with respect to
//! forwards issued by the correlator.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use axum::extract::ws::{Message, WebSocket, WebSocketUpgrade};
use axum::extract::State;
use axum::response::IntoResponse;
use chrono::{DateTime, Utc};
use futures::{Sink, SinkExt, Stream, StreamExt};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tokio::sync::{mpsc, RwLock};
use tracing::{debug, info, warn};

use crate::correlator::CallCorrelator;
use crate::error::CallError;
use crate::protocol::ToolDefinition;

/// Identifies one accepted extension connection.
pub type ConnectionId = u64;

/// Handle to the live extension connection.
#[derive(Debug)]
struct PeerConnection {
    id: ConnectionId,
    outbound: mpsc::UnboundedSender<String>,
    connected_at: DateTime<Utc>,
}

#[derive(Debug, Default)]
struct BridgeState {
    connection: Option<PeerConnection>,
    tools: Vec<ToolDefinition>,
}

/// Owner of the extension connection and its registered tools.
#[derive(Debug, Default)]
pub struct ExtensionBridge {
    state: RwLock<BridgeState>,
    next_connection: AtomicU64,
}

impl ExtensionBridge {
    /// Create a bridge with no connection.
    pub fn new() -> Self {
        Self::default()
    }

    /// Install a new connection, replacing any existing one.
    ///
    /// Returns the connection id and the queue of frames to write to it. The
    /// previous connection is dropped from the bridge without notice; calls
    /// already forwarded over it keep their pending entries.
    pub async fn attach(&self) -> (ConnectionId, mpsc::UnboundedReceiver<String>) {
        let id = self.next_connection.fetch_add(1, Ordering::Relaxed) + 1;
        let (tx, rx) = mpsc::unbounded_channel();

        let mut state = self.state.write().await;
        if let Some(previous) = state.connection.take() {
            warn!(
                previous = previous.id,
                replacement = id,
                since = %previous.connected_at,
                "Browser Extension connection replaced; in-flight calls on the old connection are left to complete or time out"
            );
        }
        state.connection = Some(PeerConnection {
            id,
            outbound: tx,
            connected_at: Utc::now(),
        });
        state.tools.clear();

        info!(connection = id, "Browser Extension connected");
        (id, rx)
    }

    /// Clear the connection and its catalog if `id` is still the live one.
    pub async fn detach(&self, id: ConnectionId) -> bool {
        let mut state = self.state.write().await;
        match state.connection.as_ref() {
            Some(current) if current.id == id => {
                state.connection = None;
                state.tools.clear();
                info!(connection = id, "Browser Extension disconnected");
                true
            }
            _ => {
                debug!(connection = id, "Superseded extension connection closed");
                false
            }
        }
    }

    /// Replace the catalog with the tools registered by connection `id`.
    pub async fn register_tools(&self, id: ConnectionId, tools: Vec<ToolDefinition>) -> bool {
        let mut state = self.state.write().await;
        if state.connection.as_ref().map(|c| c.id) != Some(id) {
            warn!(connection = id, "Ignoring tool registration from superseded connection");
            return false;
        }

        info!(
            count = tools.len(),
            "Registered {} browser tools from extension: {}",
            tools.len(),
            tools.iter().map(|t| t.name.as_str()).collect::<Vec<_>>().join(", ")
        );
        state.tools = tools;
        true
    }

    /// Whether an extension connection is live.
    pub async fn is_connected(&self) -> bool {
        self.state.read().await.connection.is_some()
    }

    /// Tools registered by the live connection. Empty when disconnected.
    pub async fn registered_tools(&self) -> Vec<ToolDefinition> {
        self.state.read().await.tools.clone()
    }

    /// Number of registered tools.
    pub async fn tool_count(&self) -> usize {
        self.state.read().await.tools.len()
    }

    /// Forward a call request to the live connection.
    ///
    /// Fails only when no connection exists. A send on a connection whose
    /// writer has already gone away is logged and otherwise ignored: the
    /// caller observes it as a timeout.
    pub async fn send(&self, request: &PeerRequest) -> Result<(), CallError> {
        let frame = serde_json::to_string(request).map_err(|e| CallError::Tool(e.to_string()))?;

        let state = self.state.read().await;
        let connection = state.connection.as_ref().ok_or(CallError::NotConnected)?;
        if connection.outbound.send(frame).is_err() {
            warn!(
                connection = connection.id,
                call = %request.id,
                "Extension writer closed; call will time out"
            );
        }
        Ok(())
    }
}

// ============================================================================
// Extension wire protocol
// ============================================================================

/// Call request sent to the extension.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PeerRequest {
    /// Correlation id.
    pub id: String,
    /// Tool name.
    pub method: String,
    /// Tool arguments.
    pub params: Value,
}

/// Error carried by an extension response.
#[derive(Debug, Clone, Deserialize)]
#[serde(untagged)]
pub enum PeerError {
    /// `{"message": "..."}`
    Object {
        /// Error message.
        message: String,
    },
    /// Bare string.
    Text(String),
    /// Anything else.
    Other(Value),
}

impl PeerError {
    /// Human-readable message.
    pub fn message(&self) -> String {
        match self {
            PeerError::Object { message } => message.clone(),
            PeerError::Text(text) => text.clone(),
            PeerError::Other(value) => value.to_string(),
        }
    }
}

/// Response to a forwarded call.
#[derive(Debug, Clone, Deserialize)]
pub struct PeerResponse {
    /// Correlation id of the original request.
    #[serde(deserialize_with = "call_id")]
    pub id: String,
    /// Tool result.
    #[serde(default)]
    pub result: Option<Value>,
    /// Tool error.
    #[serde(default)]
    pub error: Option<PeerError>,
}

impl PeerResponse {
    /// Resolve with the result or reject with the carried error.
    pub fn into_outcome(self) -> Result<Value, CallError> {
        match self.error {
            Some(error) => Err(CallError::Tool(error.message())),
            None => Ok(self.result.unwrap_or(Value::Null)),
        }
    }
}

fn call_id<'de, D>(deserializer: D) -> std::result::Result<String, D::Error>
where
    D: serde::Deserializer<'de>,
{
    match Value::deserialize(deserializer)? {
        Value::String(s) => Ok(s),
        Value::Number(n) => Ok(n.to_string()),
        other => Err(serde::de::Error::custom(format!("invalid call id: {}", other))),
    }
}

#[derive(Debug, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
enum PeerEvent {
    Register {
        #[serde(default)]
        tools: Vec<ToolDefinition>,
    },
    Ping,
    Pong,
}

/// Message received from the extension.
#[derive(Debug)]
pub enum PeerInbound {
    /// Full tool catalog.
    Register(Vec<ToolDefinition>),
    /// Application-level ping.
    Ping,
    /// Application-level pong.
    Pong,
    /// Response to a call.
    Response(PeerResponse),
}

impl PeerInbound {
    /// Decode a text frame.
    pub fn parse(text: &str) -> crate::Result<Self> {
        let value: Value = serde_json::from_str(text)?;
        // Other `type` values fall through to the response check.
        let is_event = matches!(
            value.get("type").and_then(Value::as_str),
            Some("register" | "ping" | "pong")
        );
        if is_event {
            return Ok(match serde_json::from_value(value)? {
                PeerEvent::Register { tools } => PeerInbound::Register(tools),
                PeerEvent::Ping => PeerInbound::Ping,
                PeerEvent::Pong => PeerInbound::Pong,
            });
        }
        if value.get("id").is_some() {
            return Ok(PeerInbound::Response(serde_json::from_value(value)?));
        }
        Err(crate::Error::InvalidParams("unrecognised extension message".into()))
    }
}

fn pong_frame() -> String {
    serde_json::json!({
        "type": "pong",
        "timestamp": Utc::now().timestamp_millis(),
    })
    .to_string()
}

// ============================================================================
// WebSocket listener
// ============================================================================

/// State shared by the extension-facing listener.
#[derive(Clone)]
pub struct PeerListenerState {
    /// Connection owner.
    pub bridge: Arc<ExtensionBridge>,
    /// Destination for call responses.
    pub correlator: Arc<CallCorrelator>,
    /// Liveness probe interval.
    pub ping_interval: Duration,
}

/// Build the router served on the WebSocket port.
pub fn peer_router(state: PeerListenerState) -> axum::Router {
    axum::Router::new()
        .route("/", axum::routing::get(peer_ws_handler))
        .with_state(state)
}

async fn peer_ws_handler(
    ws: WebSocketUpgrade,
    State(state): State<PeerListenerState>,
) -> impl IntoResponse {
    ws.on_upgrade(move |socket| serve_peer(socket, state))
}

/// Drive one extension connection until it closes.
pub async fn serve_peer(socket: WebSocket, state: PeerListenerState) {
    let (sender, receiver) = socket.split();
    drive_peer(sender, receiver, state).await;
}

/// Run the connection loop over any message sink and stream.
///
/// Attaches to the bridge on entry and detaches on exit. Frames queued by the
/// correlator are written to `sender`; frames read from `receiver` settle
/// calls, register tools, or get a pong.
pub async fn drive_peer<S, R, E>(mut sender: S, mut receiver: R, state: PeerListenerState)
where
    S: Sink<Message> + Unpin,
    R: Stream<Item = std::result::Result<Message, E>> + Unpin,
    E: std::fmt::Display,
{
    let (id, mut outbound) = state.bridge.attach().await;

    let mut probe = tokio::time::interval(state.ping_interval);
    probe.tick().await;
    let mut awaiting_pong = false;
    let mut outbound_open = true;

    loop {
        tokio::select! {
            frame = outbound.recv(), if outbound_open => {
                match frame {
                    Some(text) => {
                        if sender.send(Message::Text(text)).await.is_err() {
                            break;
                        }
                    }
                    // Replaced: keep reading so late responses still settle.
                    None => outbound_open = false,
                }
            }

            msg = receiver.next() => {
                match msg {
                    Some(Ok(Message::Text(text))) => {
                        if let Some(reply) = handle_peer_text(id, &text, &state).await {
                            if sender.send(Message::Text(reply)).await.is_err() {
                                break;
                            }
                        }
                    }
                    Some(Ok(Message::Pong(_))) => {
                        awaiting_pong = false;
                    }
                    Some(Ok(Message::Close(_))) | None => break,
                    Some(Err(e)) => {
                        warn!(connection = id, "WebSocket error: {}", e);
                        break;
                    }
                    Some(Ok(_)) => {}
                }
            }

            _ = probe.tick() => {
                if awaiting_pong {
                    debug!(connection = id, "No pong since last liveness probe");
                }
                awaiting_pong = true;
                if sender.send(Message::Ping(Vec::new())).await.is_err() {
                    break;
                }
            }
        }
    }

    state.bridge.detach(id).await;
}

async fn handle_peer_text(id: ConnectionId, text: &str, state: &PeerListenerState) -> Option<String> {
    match PeerInbound::parse(text) {
        Ok(PeerInbound::Register(tools)) => {
            state.bridge.register_tools(id, tools).await;
            None
        }
        Ok(PeerInbound::Ping) => Some(pong_frame()),
        Ok(PeerInbound::Pong) => None,
        Ok(PeerInbound::Response(response)) => {
            state.correlator.settle(response);
            None
        }
        Err(e) => {
            warn!(connection = id, "Error processing extension message: {}", e);
            None
        }
    }
}
