//! # opendia-gateway
//!
//! Browser automation gateway for MCP (Model Context Protocol) clients.
//!
//! AI clients speak JSON-RPC over stdio or HTTP/SSE; the tools they call are
//! executed by a browser extension connected over a WebSocket. The gateway
//! correlates each forwarded call with the extension's response, serves a
//! fallback tool catalog while no extension is connected, and composes tool
//! calls into higher-level workflows exposed as MCP prompts.
//!
//! ## Components
//!
//! - [`ports`]: startup port resolution, retiring stale prior instances
//! - [`bridge`]: the single extension connection and its registered tools
//! - [`correlator`]: pending calls settled by response or timeout
//! - [`server`]: the JSON-RPC router and the stdio front end
//! - [`http`]: the HTTP/SSE front end
//! - [`workflows`]: multi-step automations offered as prompts
//! - [`tunnel`]: optional public tunnel for online AI services
//!
//! ## Usage with an MCP client
//!
//! ```json
//! {
//!   "mcpServers": {
//!     "opendia": {
//!       "command": "opendia",
//!       "args": []
//!     }
//!   }
//! }
//! ```

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod bridge;
pub mod config;
pub mod correlator;
pub mod error;
pub mod http;
pub mod ports;
pub mod protocol;
pub mod results;
pub mod server;
pub mod tools;
pub mod tunnel;
pub mod workflows;

pub use bridge::ExtensionBridge;
pub use config::GatewayConfig;
pub use correlator::{CallCorrelator, ToolCaller};
pub use error::{CallError, Error, Result};
pub use protocol::{JsonRpcRequest, JsonRpcResponse, McpMessage};
pub use server::McpServer;
pub use workflows::{WorkflowEngine, WorkflowError};
