//! Request router and stdio front end.

use std::sync::Arc;

use serde::de::DeserializeOwned;
use serde_json::{json, Map, Value};
use tokio::io::{AsyncBufRead, AsyncBufReadExt, AsyncWrite, AsyncWriteExt};
use tokio::sync::Mutex;
use tokio::task::JoinSet;

use crate::bridge::ExtensionBridge;
use crate::correlator::CallCorrelator;
use crate::error::{CallError, Error, Result};
use crate::protocol::{
    InitializeParams, InitializeResult, JsonRpcRequest, JsonRpcResponse, ListChangedCapability,
    ListPromptsResult, ListResourcesResult, ListToolsResult, McpMessage, PromptGetParams,
    ServerCapabilities, ServerInfo, ToolCallParams, ToolCallResult,
};
use crate::results::format_tool_result;
use crate::tools::fallback_tools;
use crate::workflows::{prompt_catalog, WorkflowEngine};

/// MCP protocol version.
pub const PROTOCOL_VERSION: &str = "2024-11-05";

/// Server name.
pub const SERVER_NAME: &str = "browser-mcp-server";

/// Server version.
pub const SERVER_VERSION: &str = env!("CARGO_PKG_VERSION");

/// Usage hint returned from `initialize`.
pub const INSTRUCTIONS: &str = "🎯 Enhanced browser automation with anti-detection bypass for Twitter/X, LinkedIn, Facebook. Extension may take a moment to connect.";

/// Text of the `isError` result returned while no extension is connected.
pub const NOT_CONNECTED_TEXT: &str = "❌ Browser Extension not connected. Please install and activate the browser extension, then try again.\n\nSetup instructions:\n\nFor Chrome: \n1. Go to chrome://extensions/\n2. Enable Developer mode\n3. Click 'Load unpacked' and select the Chrome extension folder\n\nFor Firefox:\n1. Go to about:debugging#/runtime/this-firefox\n2. Click 'Load Temporary Add-on...'\n3. Select the manifest-firefox.json file\n\n🎯 Features: Anti-detection bypass for Twitter/X, LinkedIn, Facebook + universal automation";

/// MCP request router shared by the stdio and HTTP front ends.
#[derive(Debug, Clone)]
pub struct McpServer {
    bridge: Arc<ExtensionBridge>,
    correlator: Arc<CallCorrelator>,
    workflows: WorkflowEngine,
}

impl McpServer {
    /// Create a router over the given bridge and correlator.
    pub fn new(bridge: Arc<ExtensionBridge>, correlator: Arc<CallCorrelator>) -> Self {
        let workflows = WorkflowEngine::new(correlator.clone());
        Self {
            bridge,
            correlator,
            workflows,
        }
    }

    /// Extension bridge.
    pub fn bridge(&self) -> &Arc<ExtensionBridge> {
        &self.bridge
    }

    /// Run the stdio front end until stdin closes.
    #[cfg(feature = "stdio")]
    pub async fn run_stdio(self: Arc<Self>) -> Result<()> {
        let stdin = tokio::io::BufReader::new(tokio::io::stdin());
        self.serve_lines(stdin, tokio::io::stdout()).await
    }

    /// Serve newline-delimited envelopes from `reader`, writing responses to
    /// `writer`.
    ///
    /// Each line is dispatched on its own task, so a slow tool call does not
    /// hold up the lines behind it. A line that is not valid UTF-8 is logged
    /// and skipped. Returns once the input ends or fails and every dispatched
    /// line has been answered.
    pub async fn serve_lines<R, W>(self: Arc<Self>, mut reader: R, writer: W) -> Result<()>
    where
        R: AsyncBufRead + Unpin,
        W: AsyncWrite + Unpin + Send + 'static,
    {
        let writer = Arc::new(Mutex::new(writer));
        let mut in_flight = JoinSet::new();
        let mut buf = Vec::new();

        tracing::info!("MCP server listening on stdio");

        let outcome = loop {
            buf.clear();
            match reader.read_until(b'\n', &mut buf).await {
                Ok(0) => break Ok(()),
                Ok(_) => {}
                Err(e) => break Err(Error::Io(e)),
            }

            let line = match std::str::from_utf8(&buf) {
                Ok(text) => text.trim().to_string(),
                Err(e) => {
                    tracing::warn!("Ignoring line that is not valid UTF-8: {}", e);
                    continue;
                }
            };
            if line.is_empty() {
                continue;
            }
            tracing::debug!("Received: {}", line);

            let server = self.clone();
            let writer = writer.clone();
            in_flight.spawn(async move {
                let Some(response) = server.handle_message(&line).await else {
                    return Ok(());
                };
                let json = serde_json::to_string(&response)?;
                tracing::debug!("Sending: {}", json);
                let mut out = writer.lock().await;
                out.write_all(json.as_bytes()).await?;
                out.write_all(b"\n").await?;
                out.flush().await?;
                Ok::<(), Error>(())
            });

            while let Some(done) = in_flight.try_join_next() {
                log_line_outcome(done);
            }
        };

        match &outcome {
            Ok(()) => tracing::info!("stdin closed"),
            Err(e) => tracing::error!("stdin read failed: {}", e),
        }
        while let Some(done) = in_flight.join_next().await {
            log_line_outcome(done);
        }
        outcome
    }

    /// Handle one raw envelope.
    ///
    /// Returns `None` for notifications and for lines that do not parse;
    /// parse failures are logged, never answered.
    pub async fn handle_message(&self, json: &str) -> Option<JsonRpcResponse> {
        match McpMessage::parse(json) {
            Ok(message) => self.dispatch(message).await,
            Err(e) => {
                tracing::warn!("Ignoring unparseable message: {}", e);
                None
            }
        }
    }

    /// Dispatch a classified envelope.
    pub async fn dispatch(&self, message: McpMessage) -> Option<JsonRpcResponse> {
        match message {
            McpMessage::Request(request) => Some(self.handle_request(request).await),
            McpMessage::Notification(notification) => {
                self.handle_notification(&notification);
                None
            }
            McpMessage::Response(_) => {
                tracing::debug!("Ignoring response envelope from client");
                None
            }
        }
    }

    /// Handle a request carrying an id.
    pub async fn handle_request(&self, request: JsonRpcRequest) -> JsonRpcResponse {
        let id = request.id.clone();
        match self.route(request).await {
            Ok(result) => JsonRpcResponse::success(id, result),
            Err(e) => {
                tracing::warn!("Request failed: {}", e);
                JsonRpcResponse::error(id, e.code(), e.to_string())
            }
        }
    }

    async fn route(&self, request: JsonRpcRequest) -> Result<Value> {
        let params = request.params;
        let result = match request.method.as_str() {
            "initialize" => to_value(self.handle_initialize(params))?,
            "ping" => json!({}),
            "tools/list" => to_value(self.handle_tools_list().await)?,
            "tools/call" => to_value(self.handle_tools_call(parse_params(params)?).await)?,
            "resources/list" => to_value(ListResourcesResult::default())?,
            "prompts/list" => to_value(ListPromptsResult {
                prompts: prompt_catalog(),
            })?,
            "prompts/get" => to_value(self.handle_prompts_get(parse_params(params)?).await)?,
            other => return Err(Error::UnknownMethod(other.to_string())),
        };
        Ok(result)
    }

    fn handle_notification(&self, notification: &JsonRpcRequest) {
        match notification.method.as_str() {
            "notifications/initialized" => tracing::info!("Client initialized"),
            "notifications/cancelled" => tracing::debug!("Request cancelled by client"),
            other => tracing::debug!("Notification: {}", other),
        }
    }

    fn handle_initialize(&self, params: Option<Value>) -> InitializeResult {
        let params: InitializeParams = params
            .and_then(|p| serde_json::from_value(p).ok())
            .unwrap_or_default();
        if let Some(client) = &params.client_info {
            tracing::info!(
                "Initialize from {} {}",
                client.name,
                client.version.as_deref().unwrap_or("")
            );
        }

        InitializeResult {
            protocol_version: PROTOCOL_VERSION.into(),
            capabilities: ServerCapabilities {
                tools: Some(ListChangedCapability::default()),
                resources: None,
                prompts: Some(ListChangedCapability::default()),
            },
            server_info: ServerInfo {
                name: SERVER_NAME.into(),
                version: SERVER_VERSION.into(),
            },
            instructions: Some(INSTRUCTIONS.into()),
        }
    }

    async fn handle_tools_list(&self) -> ListToolsResult {
        if self.bridge.is_connected().await {
            let tools = self.bridge.registered_tools().await;
            if !tools.is_empty() {
                tracing::debug!("Listing {} registered tools", tools.len());
                return ListToolsResult { tools };
            }
        }
        tracing::debug!("Extension not connected or no tools registered, listing fallback tools");
        ListToolsResult {
            tools: fallback_tools(),
        }
    }

    async fn handle_tools_call(&self, params: ToolCallParams) -> ToolCallResult {
        if !self.bridge.is_connected().await {
            return ToolCallResult::error_text(NOT_CONNECTED_TEXT);
        }

        let args = params.arguments.unwrap_or_else(|| json!({}));
        match self.correlator.call(&params.name, args).await {
            Ok(value) => ToolCallResult::text(format_tool_result(&params.name, value)),
            // Lost the connection between the check and the send.
            Err(CallError::NotConnected) => ToolCallResult::error_text(NOT_CONNECTED_TEXT),
            Err(e) => {
                tracing::error!("Tool {} failed: {}", params.name, e);
                ToolCallResult::error_text(format!("❌ Tool execution failed: {}", e))
            }
        }
    }

    async fn handle_prompts_get(&self, params: PromptGetParams) -> ToolCallResult {
        let args = params.arguments.unwrap_or_else(Map::new);
        match self.workflows.run(&params.name, &args).await {
            Ok(report) => ToolCallResult::text(report),
            Err(e) => ToolCallResult::error_text(format!("❌ Workflow execution failed: {}", e)),
        }
    }
}

fn parse_params<T: DeserializeOwned>(params: Option<Value>) -> Result<T> {
    let params = params.ok_or_else(|| Error::InvalidParams("params required".into()))?;
    serde_json::from_value(params).map_err(|e| Error::InvalidParams(e.to_string()))
}

fn to_value(value: impl serde::Serialize) -> Result<Value> {
    Ok(serde_json::to_value(value)?)
}

fn log_line_outcome(done: std::result::Result<Result<()>, tokio::task::JoinError>) {
    match done {
        Ok(Ok(())) => {}
        Ok(Err(e)) => tracing::error!("Failed to write response: {}", e),
        Err(e) => tracing::error!("Request task failed: {}", e),
    }
}
