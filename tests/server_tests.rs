//! Router and stdio front end tests.
//!
//! Exercises JSON-RPC handling with and without a connected extension. The
//! extension is simulated by a task draining the bridge's outbound queue and
//! settling calls through the correlator.

use std::sync::Arc;
use std::time::Duration;

use serde_json::{json, Value};
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::sync::{mpsc, oneshot};

use opendia_gateway::bridge::{PeerError, PeerRequest, PeerResponse};
use opendia_gateway::protocol::ToolDefinition;
use opendia_gateway::tools::FALLBACK_TOOL_NAMES;
use opendia_gateway::{CallCorrelator, ExtensionBridge, McpServer};

fn gateway(timeout: Duration) -> (Arc<McpServer>, Arc<ExtensionBridge>, Arc<CallCorrelator>) {
    let bridge = Arc::new(ExtensionBridge::new());
    let correlator = Arc::new(CallCorrelator::new(bridge.clone(), timeout));
    let server = Arc::new(McpServer::new(bridge.clone(), correlator.clone()));
    (server, bridge, correlator)
}

/// Answer every forwarded call with `respond(request)`.
fn spawn_peer<F>(mut outbound: mpsc::UnboundedReceiver<String>, correlator: Arc<CallCorrelator>, respond: F)
where
    F: Fn(&PeerRequest) -> Result<Value, String> + Send + 'static,
{
    tokio::spawn(async move {
        while let Some(frame) = outbound.recv().await {
            let request: PeerRequest = serde_json::from_str(&frame).unwrap();
            let (result, error) = match respond(&request) {
                Ok(value) => (Some(value), None),
                Err(message) => (None, Some(PeerError::Object { message })),
            };
            correlator.settle(PeerResponse {
                id: request.id.clone(),
                result,
                error,
            });
        }
    });
}

fn tool(name: &str) -> ToolDefinition {
    ToolDefinition {
        name: name.into(),
        description: format!("{} from the extension", name),
        input_schema: json!({"type": "object", "properties": {}}),
    }
}

async fn request(server: &McpServer, body: Value) -> Value {
    let response = server
        .handle_message(&body.to_string())
        .await
        .expect("request should be answered");
    serde_json::to_value(response).unwrap()
}

fn first_text(response: &Value) -> &str {
    response["result"]["content"][0]["text"].as_str().unwrap()
}

// ============================================================================
// Handshake and catalogs
// ============================================================================

#[tokio::test]
async fn test_initialize_without_peer() {
    let (server, _, _) = gateway(Duration::from_secs(5));
    let response = request(
        &server,
        json!({
            "jsonrpc": "2.0",
            "id": 1,
            "method": "initialize",
            "params": {
                "protocolVersion": "2024-11-05",
                "clientInfo": {"name": "test-client", "version": "1.0"}
            }
        }),
    )
    .await;

    assert_eq!(response["id"], 1);
    assert_eq!(response["result"]["protocolVersion"], "2024-11-05");
    assert_eq!(response["result"]["serverInfo"]["name"], "browser-mcp-server");
    assert!(response["result"]["capabilities"]["tools"].is_object());
    assert!(response["result"]["capabilities"]["prompts"].is_object());
    assert!(response["result"]["instructions"].is_string());
}

#[tokio::test]
async fn test_initialize_without_params() {
    let (server, _, _) = gateway(Duration::from_secs(5));
    let response = request(&server, json!({"jsonrpc": "2.0", "id": "init", "method": "initialize"})).await;
    assert_eq!(response["id"], "init");
    assert_eq!(response["result"]["protocolVersion"], "2024-11-05");
}

#[tokio::test]
async fn test_ping_returns_empty_object() {
    let (server, _, _) = gateway(Duration::from_secs(5));
    let response = request(&server, json!({"jsonrpc": "2.0", "id": 7, "method": "ping"})).await;
    assert_eq!(response["result"], json!({}));
}

#[tokio::test]
async fn test_tools_list_fallback_when_disconnected() {
    let (server, _, _) = gateway(Duration::from_secs(5));
    let response = request(&server, json!({"jsonrpc": "2.0", "id": 2, "method": "tools/list"})).await;

    let names: Vec<&str> = response["result"]["tools"]
        .as_array()
        .unwrap()
        .iter()
        .map(|t| t["name"].as_str().unwrap())
        .collect();
    assert_eq!(names, FALLBACK_TOOL_NAMES);
}

#[tokio::test]
async fn test_tools_list_uses_registered_tools() {
    let (server, bridge, _) = gateway(Duration::from_secs(5));
    let (id, _outbound) = bridge.attach().await;
    bridge.register_tools(id, vec![tool("page_analyze"), tool("tab_list")]).await;

    let response = request(&server, json!({"jsonrpc": "2.0", "id": 3, "method": "tools/list"})).await;
    let tools = response["result"]["tools"].as_array().unwrap();
    assert_eq!(tools.len(), 2);
    assert_eq!(tools[0]["name"], "page_analyze");
    assert_eq!(tools[1]["name"], "tab_list");
    assert!(tools[0]["inputSchema"].is_object());
}

#[tokio::test]
async fn test_tools_list_falls_back_before_registration() {
    let (server, bridge, _) = gateway(Duration::from_secs(5));
    let (_id, _outbound) = bridge.attach().await;

    let response = request(&server, json!({"jsonrpc": "2.0", "id": 4, "method": "tools/list"})).await;
    assert_eq!(
        response["result"]["tools"].as_array().unwrap().len(),
        FALLBACK_TOOL_NAMES.len()
    );
}

#[tokio::test]
async fn test_tools_list_falls_back_after_disconnect() {
    let (server, bridge, _) = gateway(Duration::from_secs(5));
    let (id, _outbound) = bridge.attach().await;
    bridge.register_tools(id, vec![tool("only_one")]).await;
    bridge.detach(id).await;

    let response = request(&server, json!({"jsonrpc": "2.0", "id": 5, "method": "tools/list"})).await;
    assert_eq!(
        response["result"]["tools"].as_array().unwrap().len(),
        FALLBACK_TOOL_NAMES.len()
    );
}

#[tokio::test]
async fn test_resources_list_is_empty() {
    let (server, _, _) = gateway(Duration::from_secs(5));
    let response = request(&server, json!({"jsonrpc": "2.0", "id": 6, "method": "resources/list"})).await;
    assert_eq!(response["result"]["resources"], json!([]));
}

#[tokio::test]
async fn test_prompts_list_has_workflows() {
    let (server, _, _) = gateway(Duration::from_secs(5));
    let response = request(&server, json!({"jsonrpc": "2.0", "id": 8, "method": "prompts/list"})).await;
    let prompts = response["result"]["prompts"].as_array().unwrap();
    assert_eq!(prompts.len(), 6);
    assert_eq!(prompts[0]["name"], "post_to_social");
    assert_eq!(prompts[0]["arguments"][0]["required"], true);
}

// ============================================================================
// Tool calls
// ============================================================================

#[tokio::test]
async fn test_tools_call_without_peer_is_error_result() {
    let (server, _, correlator) = gateway(Duration::from_secs(5));
    let response = request(
        &server,
        json!({
            "jsonrpc": "2.0",
            "id": 10,
            "method": "tools/call",
            "params": {"name": "page_analyze", "arguments": {"intent_hint": "login"}}
        }),
    )
    .await;

    assert!(response.get("error").is_none());
    assert_eq!(response["result"]["isError"], true);
    assert!(first_text(&response).contains("Browser Extension not connected"));
    assert_eq!(correlator.pending_count(), 0);
}

#[tokio::test]
async fn test_tools_call_forwards_to_peer() {
    let (server, bridge, correlator) = gateway(Duration::from_secs(5));
    let (_id, outbound) = bridge.attach().await;
    spawn_peer(outbound, correlator.clone(), |request| {
        Ok(json!({"echo_tool": request.method, "echo_args": request.params}))
    });

    let response = request(
        &server,
        json!({
            "jsonrpc": "2.0",
            "id": 11,
            "method": "tools/call",
            "params": {"name": "custom_tool", "arguments": {"answer": 42}}
        }),
    )
    .await;

    assert_eq!(response["result"]["isError"], false);
    let text = first_text(&response);
    assert!(text.contains("\"echo_tool\": \"custom_tool\""));
    assert!(text.contains("\"answer\": 42"));
    assert_eq!(correlator.pending_count(), 0);
}

#[tokio::test]
async fn test_tools_call_renders_known_tool() {
    let (server, bridge, correlator) = gateway(Duration::from_secs(5));
    let (_id, outbound) = bridge.attach().await;
    spawn_peer(outbound, correlator, |_| {
        Ok(json!({
            "success": true,
            "tabs": [{"id": 1, "title": "Docs", "url": "https://docs.rs", "active": true}],
            "count": 1
        }))
    });

    let response = request(
        &server,
        json!({
            "jsonrpc": "2.0",
            "id": 12,
            "method": "tools/call",
            "params": {"name": "tab_list"}
        }),
    )
    .await;

    let text = first_text(&response);
    assert!(text.contains("Docs"));
    assert!(text.contains("\"tool\": \"tab_list\""));
}

#[tokio::test]
async fn test_tools_call_peer_error_is_error_result() {
    let (server, bridge, correlator) = gateway(Duration::from_secs(5));
    let (_id, outbound) = bridge.attach().await;
    spawn_peer(outbound, correlator, |_| Err("Element not found".into()));

    let response = request(
        &server,
        json!({
            "jsonrpc": "2.0",
            "id": 13,
            "method": "tools/call",
            "params": {"name": "element_click", "arguments": {"element_id": "x"}}
        }),
    )
    .await;

    assert_eq!(response["result"]["isError"], true);
    assert_eq!(first_text(&response), "❌ Tool execution failed: Element not found");
}

#[tokio::test]
async fn test_tools_call_timeout_is_error_result() {
    let (server, bridge, correlator) = gateway(Duration::from_millis(50));
    let (_id, _outbound) = bridge.attach().await;

    let response = request(
        &server,
        json!({
            "jsonrpc": "2.0",
            "id": 14,
            "method": "tools/call",
            "params": {"name": "page_wait_for", "arguments": {"condition_type": "element_visible"}}
        }),
    )
    .await;

    assert_eq!(response["result"]["isError"], true);
    assert!(first_text(&response).contains("timeout"));
    assert_eq!(correlator.pending_count(), 0);
}

#[tokio::test]
async fn test_tools_call_without_params_is_invalid_params() {
    let (server, _, _) = gateway(Duration::from_secs(5));
    let response = request(&server, json!({"jsonrpc": "2.0", "id": 15, "method": "tools/call"})).await;
    assert_eq!(response["error"]["code"], -32602);
}

// ============================================================================
// Prompts
// ============================================================================

#[tokio::test]
async fn test_prompts_get_missing_argument_is_error_result() {
    let (server, _, _) = gateway(Duration::from_secs(5));
    let response = request(
        &server,
        json!({
            "jsonrpc": "2.0",
            "id": 20,
            "method": "prompts/get",
            "params": {"name": "post_to_social", "arguments": {}}
        }),
    )
    .await;

    assert_eq!(response["result"]["isError"], true);
    assert_eq!(
        first_text(&response),
        "❌ Workflow execution failed: Missing required argument: content"
    );
}

#[tokio::test]
async fn test_prompts_get_unknown_prompt() {
    let (server, _, _) = gateway(Duration::from_secs(5));
    let response = request(
        &server,
        json!({
            "jsonrpc": "2.0",
            "id": 21,
            "method": "prompts/get",
            "params": {"name": "make_coffee"}
        }),
    )
    .await;

    assert_eq!(response["result"]["isError"], true);
    assert!(first_text(&response).contains("Unknown prompt: make_coffee"));
}

// ============================================================================
// Envelope handling
// ============================================================================

#[tokio::test]
async fn test_unknown_method_is_internal_error() {
    let (server, _, _) = gateway(Duration::from_secs(5));
    let response = request(&server, json!({"jsonrpc": "2.0", "id": 30, "method": "bogus/method"})).await;

    assert_eq!(response["id"], 30);
    assert_eq!(response["error"]["code"], -32603);
    assert_eq!(response["error"]["message"], "Unknown method: bogus/method");
    assert!(response.get("result").is_none());
}

#[tokio::test]
async fn test_notification_gets_no_response() {
    let (server, _, _) = gateway(Duration::from_secs(5));
    let none = server
        .handle_message(r#"{"jsonrpc":"2.0","method":"notifications/initialized"}"#)
        .await;
    assert!(none.is_none());

    let none = server
        .handle_message(r#"{"jsonrpc":"2.0","id":null,"method":"bogus/method"}"#)
        .await;
    assert!(none.is_none());
}

#[tokio::test]
async fn test_unparseable_line_gets_no_response() {
    let (server, _, _) = gateway(Duration::from_secs(5));
    assert!(server.handle_message("{not json").await.is_none());
}

// ============================================================================
// stdio framing
// ============================================================================

#[tokio::test]
async fn test_stdio_answers_each_line_and_returns_at_eof() {
    let (server, _, _) = gateway(Duration::from_secs(5));
    let (client, server_io) = tokio::io::duplex(64 * 1024);
    let (server_read, server_write) = tokio::io::split(server_io);
    let serving = tokio::spawn(server.serve_lines(BufReader::new(server_read), server_write));

    let (client_read, mut client_write) = tokio::io::split(client);
    let input = concat!(
        r#"{"jsonrpc":"2.0","id":1,"method":"initialize","params":{}}"#,
        "\n",
        r#"{"jsonrpc":"2.0","method":"notifications/initialized"}"#,
        "\n",
        "\n",
        "garbage\n",
        r#"{"jsonrpc":"2.0","id":2,"method":"ping"}"#,
        "\n",
    );
    client_write.write_all(input.as_bytes()).await.unwrap();
    client_write.shutdown().await.unwrap();

    serving.await.unwrap().unwrap();

    let mut lines = BufReader::new(client_read).lines();
    let mut ids = Vec::new();
    while let Some(line) = lines.next_line().await.unwrap() {
        let response: Value = serde_json::from_str(&line).unwrap();
        ids.push(response["id"].as_i64().unwrap());
    }
    ids.sort();
    assert_eq!(ids, vec![1, 2]);
}

#[tokio::test]
async fn test_stdio_slow_call_does_not_block_later_lines() {
    let (server, bridge, correlator) = gateway(Duration::from_secs(5));
    let (_id, mut outbound) = bridge.attach().await;
    let (release_tx, release_rx) = oneshot::channel::<()>();

    // Holds the first call until released.
    let peer_correlator = correlator.clone();
    tokio::spawn(async move {
        let frame = outbound.recv().await.unwrap();
        let request: PeerRequest = serde_json::from_str(&frame).unwrap();
        release_rx.await.unwrap();
        peer_correlator.settle(PeerResponse {
            id: request.id,
            result: Some(json!({"done": true})),
            error: None,
        });
    });

    let (client, server_io) = tokio::io::duplex(64 * 1024);
    let (server_read, server_write) = tokio::io::split(server_io);
    tokio::spawn(server.serve_lines(BufReader::new(server_read), server_write));

    let (client_read, mut client_write) = tokio::io::split(client);
    let mut responses = BufReader::new(client_read).lines();

    let input = concat!(
        r#"{"jsonrpc":"2.0","id":1,"method":"tools/call","params":{"name":"slow_tool"}}"#,
        "\n",
        r#"{"jsonrpc":"2.0","id":2,"method":"ping"}"#,
        "\n",
    );
    client_write.write_all(input.as_bytes()).await.unwrap();

    let first: Value = serde_json::from_str(&responses.next_line().await.unwrap().unwrap()).unwrap();
    assert_eq!(first["id"], 2);

    release_tx.send(()).unwrap();
    let second: Value = serde_json::from_str(&responses.next_line().await.unwrap().unwrap()).unwrap();
    assert_eq!(second["id"], 1);
    assert_eq!(second["result"]["isError"], false);
}

#[tokio::test]
async fn test_stdio_skips_line_that_is_not_utf8() {
    let (server, _, _) = gateway(Duration::from_secs(5));
    let (client, server_io) = tokio::io::duplex(64 * 1024);
    let (server_read, server_write) = tokio::io::split(server_io);
    let serving = tokio::spawn(server.serve_lines(BufReader::new(server_read), server_write));

    let (client_read, mut client_write) = tokio::io::split(client);
    let mut input = Vec::new();
    input.extend_from_slice(br#"{"jsonrpc":"2.0","id":1,"method":"ping"}"#);
    input.extend_from_slice(b"\n\xff\xfe garbage\n");
    input.extend_from_slice(br#"{"jsonrpc":"2.0","id":2,"method":"ping"}"#);
    input.push(b'\n');
    client_write.write_all(&input).await.unwrap();
    client_write.shutdown().await.unwrap();

    serving.await.unwrap().unwrap();

    let mut lines = BufReader::new(client_read).lines();
    let mut ids = Vec::new();
    while let Some(line) = lines.next_line().await.unwrap() {
        let response: Value = serde_json::from_str(&line).unwrap();
        ids.push(response["id"].as_i64().unwrap());
    }
    ids.sort();
    assert_eq!(ids, vec![1, 2]);
}

#[tokio::test]
async fn test_stdio_read_error_still_answers_dispatched_lines() {
    let (server, bridge, correlator) = gateway(Duration::from_secs(5));
    let (_id, outbound) = bridge.attach().await;
    spawn_peer(outbound, correlator, |_| Ok(json!({"done": true})));

    let input = tokio_test::io::Builder::new()
        .read(br#"{"jsonrpc":"2.0","id":1,"method":"tools/call","params":{"name":"slow_tool"}}"#)
        .read(b"\n")
        .read_error(std::io::Error::new(std::io::ErrorKind::Other, "stdin gone"))
        .build();
    let (client, server_write) = tokio::io::duplex(64 * 1024);

    let outcome = server.serve_lines(BufReader::new(input), server_write).await;
    assert!(outcome.is_err());

    let mut lines = BufReader::new(client).lines();
    let response: Value = serde_json::from_str(&lines.next_line().await.unwrap().unwrap()).unwrap();
    assert_eq!(response["id"], 1);
    assert_eq!(response["result"]["isError"], false);
}
