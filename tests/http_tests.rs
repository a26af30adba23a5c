//! HTTP/SSE endpoint tests.

use std::sync::Arc;
use std::time::Duration;

use axum::body::{to_bytes, Body};
use axum::http::{header, Request, StatusCode};
use axum::Router;
use futures::StreamExt;
use serde_json::{json, Value};
use tokio::sync::RwLock;
use tower::ServiceExt;

use opendia_gateway::http::{client_events, http_router, HttpState};
use opendia_gateway::ports::ResolvedPorts;
use opendia_gateway::protocol::ToolDefinition;
use opendia_gateway::{CallCorrelator, ExtensionBridge, McpServer};

struct Harness {
    router: Router,
    bridge: Arc<ExtensionBridge>,
    tunnel_url: Arc<RwLock<Option<String>>>,
}

fn harness() -> Harness {
    let bridge = Arc::new(ExtensionBridge::new());
    let correlator = Arc::new(CallCorrelator::new(bridge.clone(), Duration::from_secs(5)));
    let server = Arc::new(McpServer::new(bridge.clone(), correlator));
    let tunnel_url = Arc::new(RwLock::new(None));
    let router = http_router(HttpState {
        server,
        ports: ResolvedPorts {
            websocket: 5555,
            http: 5556,
        },
        transport: "hybrid",
        heartbeat_interval: Duration::from_secs(30),
        tunnel_url: tunnel_url.clone(),
    });
    Harness {
        router,
        bridge,
        tunnel_url,
    }
}

async fn get(router: Router, uri: &str) -> (StatusCode, Value) {
    let response = router
        .oneshot(Request::builder().uri(uri).body(Body::empty()).unwrap())
        .await
        .unwrap();
    let status = response.status();
    let body = to_bytes(response.into_body(), usize::MAX).await.unwrap();
    (status, serde_json::from_slice(&body).unwrap())
}

async fn post(router: Router, body: &str) -> (StatusCode, Vec<u8>) {
    post_bytes(router, body.as_bytes().to_vec()).await
}

async fn post_bytes(router: Router, body: Vec<u8>) -> (StatusCode, Vec<u8>) {
    let response = router
        .oneshot(
            Request::builder()
                .method("POST")
                .uri("/sse")
                .header(header::CONTENT_TYPE, "application/json")
                .body(Body::from(body))
                .unwrap(),
        )
        .await
        .unwrap();
    let status = response.status();
    let body = to_bytes(response.into_body(), usize::MAX).await.unwrap();
    (status, body.to_vec())
}

// ============================================================================
// Status endpoints
// ============================================================================

#[tokio::test]
async fn test_health_without_peer() {
    let h = harness();
    let (status, body) = get(h.router, "/health").await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["status"], "ok");
    assert_eq!(body["peerConnected"], false);
    assert_eq!(body["availableTools"], 0);
    assert_eq!(body["transport"], "hybrid");
    assert_eq!(body["tunnel"], Value::Null);
    assert_eq!(body["ports"], json!({"websocket": 5555, "http": 5556}));
}

#[tokio::test]
async fn test_health_reflects_peer_and_tunnel() {
    let h = harness();
    let (id, _outbound) = h.bridge.attach().await;
    h.bridge
        .register_tools(
            id,
            vec![ToolDefinition {
                name: "tab_list".into(),
                description: "List tabs".into(),
                input_schema: json!({"type": "object"}),
            }],
        )
        .await;
    *h.tunnel_url.write().await = Some("https://demo.ngrok-free.app".into());

    let (_, body) = get(h.router, "/health").await;
    assert_eq!(body["peerConnected"], true);
    assert_eq!(body["availableTools"], 1);
    assert_eq!(body["tunnel"], "https://demo.ngrok-free.app");
}

#[tokio::test]
async fn test_ports_discovery() {
    let h = harness();
    let (status, body) = get(h.router, "/ports").await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["websocket"], 5555);
    assert_eq!(body["http"], 5556);
    assert_eq!(body["websocketUrl"], "ws://localhost:5555");
    assert_eq!(body["httpUrl"], "http://localhost:5556");
    assert_eq!(body["sseUrl"], "http://localhost:5556/sse");
}

// ============================================================================
// POST /sse
// ============================================================================

#[tokio::test]
async fn test_post_request_returns_response() {
    let h = harness();
    let (status, body) = post(h.router, r#"{"jsonrpc":"2.0","id":1,"method":"tools/list"}"#).await;

    assert_eq!(status, StatusCode::OK);
    let body: Value = serde_json::from_slice(&body).unwrap();
    assert_eq!(body["id"], 1);
    assert_eq!(body["result"]["tools"].as_array().unwrap().len(), 17);
}

#[tokio::test]
async fn test_post_notification_is_accepted_without_body() {
    let h = harness();
    let (status, body) = post(h.router, r#"{"jsonrpc":"2.0","method":"notifications/initialized"}"#).await;

    assert_eq!(status, StatusCode::ACCEPTED);
    assert!(body.is_empty());
}

#[tokio::test]
async fn test_post_unparseable_body_is_parse_error() {
    let h = harness();
    let (status, body) = post(h.router, "{oops").await;

    assert_eq!(status, StatusCode::BAD_REQUEST);
    let body: Value = serde_json::from_slice(&body).unwrap();
    assert_eq!(body["error"]["code"], -32700);
    assert_eq!(body["id"], Value::Null);
}

#[tokio::test]
async fn test_post_body_that_is_not_utf8_is_parse_error() {
    let h = harness();
    let (status, body) = post_bytes(h.router, b"{\"jsonrpc\":\"2.0\",\"id\":\"\xff\xfe\"}".to_vec()).await;

    assert_eq!(status, StatusCode::BAD_REQUEST);
    let body: Value = serde_json::from_slice(&body).unwrap();
    assert_eq!(body["jsonrpc"], "2.0");
    assert_eq!(body["error"]["code"], -32700);
    assert_eq!(body["id"], Value::Null);
}

#[tokio::test]
async fn test_post_invalid_envelope_is_invalid_request() {
    let h = harness();
    let (status, body) = post(h.router, r#"{"jsonrpc":"2.0","id":9}"#).await;

    assert_eq!(status, StatusCode::BAD_REQUEST);
    let body: Value = serde_json::from_slice(&body).unwrap();
    assert_eq!(body["error"]["code"], -32600);
    assert_eq!(body["id"], 9);
}

#[tokio::test]
async fn test_post_tool_call_without_peer() {
    let h = harness();
    let (status, body) = post(
        h.router,
        r#"{"jsonrpc":"2.0","id":"a","method":"tools/call","params":{"name":"tab_list","arguments":{}}}"#,
    )
    .await;

    assert_eq!(status, StatusCode::OK);
    let body: Value = serde_json::from_slice(&body).unwrap();
    assert_eq!(body["id"], "a");
    assert_eq!(body["result"]["isError"], true);
}

// ============================================================================
// GET /sse
// ============================================================================

#[tokio::test]
async fn test_sse_stream_content_type() {
    let h = harness();
    let response = h
        .router
        .oneshot(Request::builder().uri("/sse").body(Body::empty()).unwrap())
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    let content_type = response.headers()[header::CONTENT_TYPE].to_str().unwrap();
    assert!(content_type.starts_with("text/event-stream"));
}

#[tokio::test(start_paused = true)]
async fn test_sse_connection_event_then_heartbeats() {
    let events = client_events(Duration::from_secs(30));
    let mut events = Box::pin(events);

    assert!(events.next().await.unwrap().is_ok());
    assert!(events.next().await.unwrap().is_ok());
    assert!(events.next().await.unwrap().is_ok());
}

#[tokio::test]
async fn test_cors_preflight_is_allowed() {
    let h = harness();
    let response = h
        .router
        .oneshot(
            Request::builder()
                .method("OPTIONS")
                .uri("/sse")
                .header(header::ORIGIN, "https://chat.example")
                .header(header::ACCESS_CONTROL_REQUEST_METHOD, "POST")
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();

    assert!(response
        .headers()
        .contains_key(header::ACCESS_CONTROL_ALLOW_ORIGIN));
}
