//! HTTP/SSE front end.
//!
//! # Endpoints
//!
//! - `GET /sse` - event stream: one `connection` event, then heartbeats
//! - `POST /sse` - one JSON-RPC envelope in, one response out
//! - `GET /health` - liveness and extension status
//! - `GET /ports` - resolved ports, for extension self-discovery

use std::convert::Infallible;
use std::sync::Arc;
use std::time::Duration;

use axum::{
    body::Bytes,
    extract::State,
    http::StatusCode,
    response::{
        sse::{Event, KeepAlive, Sse},
        IntoResponse, Json, Response,
    },
    routing::get,
    Router,
};
use chrono::Utc;
use futures::stream::{self, Stream, StreamExt};
use serde_json::{json, Value};
use tokio::sync::RwLock;
use tower::ServiceBuilder;
use tower_http::{cors::CorsLayer, trace::TraceLayer};
use tracing::{debug, info};
use uuid::Uuid;

use crate::error::codes;
use crate::ports::ResolvedPorts;
use crate::protocol::{JsonRpcResponse, McpMessage};
use crate::server::McpServer;

/// Name reported in the SSE `connection` event.
pub const SSE_SERVER_NAME: &str = "OpenDia MCP Server";

/// State for the HTTP listener.
#[derive(Clone)]
pub struct HttpState {
    /// Request router.
    pub server: Arc<McpServer>,
    /// Resolved listener ports.
    pub ports: ResolvedPorts,
    /// `hybrid` or `sse-only`.
    pub transport: &'static str,
    /// SSE heartbeat interval.
    pub heartbeat_interval: Duration,
    /// Public tunnel URL, while a tunnel is up.
    pub tunnel_url: Arc<RwLock<Option<String>>>,
}

/// Build the router served on the HTTP port.
pub fn http_router(state: HttpState) -> Router {
    Router::new()
        .route("/sse", get(sse_handler).post(message_handler))
        .route("/health", get(health_handler))
        .route("/ports", get(ports_handler))
        .layer(
            ServiceBuilder::new()
                .layer(TraceLayer::new_for_http())
                .layer(CorsLayer::permissive()),
        )
        .with_state(state)
}

/// Logs the client's departure when the stream is dropped.
struct SseClient {
    id: Uuid,
}

impl Drop for SseClient {
    fn drop(&mut self) {
        info!(client = %self.id, "SSE client disconnected");
    }
}

fn data_event(payload: Value) -> Event {
    Event::default().data(payload.to_string())
}

/// Event stream for one client: the `connection` event, then heartbeats.
pub fn client_events(heartbeat: Duration) -> impl Stream<Item = Result<Event, Infallible>> {
    let client = SseClient { id: Uuid::new_v4() };
    info!(client = %client.id, "SSE client connected");

    let connected = data_event(json!({
        "type": "connection",
        "status": "connected",
        "server": SSE_SERVER_NAME,
        "version": env!("CARGO_PKG_VERSION"),
    }));

    let heartbeats = stream::unfold(
        (tokio::time::interval_at(tokio::time::Instant::now() + heartbeat, heartbeat), client),
        |(mut ticker, client)| async move {
            ticker.tick().await;
            debug!(client = %client.id, "SSE heartbeat");
            let event = data_event(json!({
                "type": "heartbeat",
                "timestamp": Utc::now().timestamp_millis(),
            }));
            Some((Ok(event), (ticker, client)))
        },
    );

    stream::once(async move { Ok(connected) }).chain(heartbeats)
}

async fn sse_handler(State(state): State<HttpState>) -> impl IntoResponse {
    Sse::new(client_events(state.heartbeat_interval)).keep_alive(KeepAlive::default())
}

async fn message_handler(State(state): State<HttpState>, body: Bytes) -> Response {
    debug!("MCP request received via HTTP: {}", String::from_utf8_lossy(&body));

    let value: Value = match serde_json::from_slice(&body) {
        Ok(value) => value,
        Err(e) => {
            let error = JsonRpcResponse::error(None, codes::PARSE_ERROR, format!("Parse error: {}", e));
            return (StatusCode::BAD_REQUEST, Json(error)).into_response();
        }
    };
    let id = value
        .get("id")
        .cloned()
        .and_then(|id| serde_json::from_value(id).ok());

    let message = match McpMessage::from_value(value) {
        Ok(message) => message,
        Err(e) => {
            let error = JsonRpcResponse::error(id, codes::INVALID_REQUEST, e.to_string());
            return (StatusCode::BAD_REQUEST, Json(error)).into_response();
        }
    };

    match state.server.dispatch(message).await {
        Some(response) => Json(response).into_response(),
        None => StatusCode::ACCEPTED.into_response(),
    }
}

async fn health_handler(State(state): State<HttpState>) -> Json<Value> {
    let bridge = state.server.bridge();
    Json(json!({
        "status": "ok",
        "peerConnected": bridge.is_connected().await,
        "availableTools": bridge.tool_count().await,
        "transport": state.transport,
        "tunnel": state.tunnel_url.read().await.clone(),
        "ports": {
            "websocket": state.ports.websocket,
            "http": state.ports.http,
        },
    }))
}

async fn ports_handler(State(state): State<HttpState>) -> Json<Value> {
    let ResolvedPorts { websocket, http } = state.ports;
    Json(json!({
        "websocket": websocket,
        "http": http,
        "websocketUrl": format!("ws://localhost:{}", websocket),
        "httpUrl": format!("http://localhost:{}", http),
        "sseUrl": format!("http://localhost:{}/sse", http),
    }))
}
