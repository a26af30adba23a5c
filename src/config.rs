//! Gateway configuration.

use std::net::{IpAddr, Ipv4Addr};
use std::time::Duration;

/// Default WebSocket (extension) port.
pub const DEFAULT_WS_PORT: u16 = 5555;

/// Default HTTP/SSE port.
pub const DEFAULT_HTTP_PORT: u16 = 5556;

/// Default time a forwarded call waits for its correlated response.
pub const DEFAULT_CALL_TIMEOUT: Duration = Duration::from_secs(30);

/// Default SSE heartbeat interval.
pub const DEFAULT_HEARTBEAT_INTERVAL: Duration = Duration::from_secs(30);

/// Default extension liveness probe interval.
pub const DEFAULT_PEER_PING_INTERVAL: Duration = Duration::from_secs(30);

/// Command-line fragment identifying a prior instance of this service.
pub const SERVICE_MARKER: &str = "opendia";

/// Default listen address for both listeners.
pub const DEFAULT_BIND_HOST: IpAddr = IpAddr::V4(Ipv4Addr::LOCALHOST);

/// Runtime configuration, fixed once startup has parsed the command line.
#[derive(Debug, Clone)]
pub struct GatewayConfig {
    /// Address both listeners bind.
    pub bind_host: IpAddr,
    /// Requested WebSocket port.
    pub ws_port: u16,
    /// Requested HTTP port.
    pub http_port: u16,
    /// Disable the stdio front end.
    pub sse_only: bool,
    /// Start the tunnel helper.
    pub tunnel: bool,
    /// Correlator timeout.
    pub call_timeout: Duration,
    /// SSE heartbeat interval.
    pub heartbeat_interval: Duration,
    /// Extension liveness probe interval.
    pub peer_ping_interval: Duration,
    /// Marker used to recognise prior instances holding our ports.
    pub service_marker: String,
}

impl Default for GatewayConfig {
    fn default() -> Self {
        Self {
            bind_host: DEFAULT_BIND_HOST,
            ws_port: DEFAULT_WS_PORT,
            http_port: DEFAULT_HTTP_PORT,
            sse_only: false,
            tunnel: false,
            call_timeout: DEFAULT_CALL_TIMEOUT,
            heartbeat_interval: DEFAULT_HEARTBEAT_INTERVAL,
            peer_ping_interval: DEFAULT_PEER_PING_INTERVAL,
            service_marker: SERVICE_MARKER.into(),
        }
    }
}

impl GatewayConfig {
    /// Apply the port flags.
    ///
    /// `--port N` means WebSocket on `N` and HTTP on `N + 1`; explicit
    /// `--ws-port` / `--http-port` take precedence over it.
    pub fn with_ports(mut self, ws: Option<u16>, http: Option<u16>, base: Option<u16>) -> Self {
        self.ws_port = ws.or(base).unwrap_or(DEFAULT_WS_PORT);
        self.http_port = http
            .or_else(|| base.map(|b| b.saturating_add(1)))
            .unwrap_or(DEFAULT_HTTP_PORT);
        self
    }

    /// Transport label reported by `/health`.
    pub fn transport_label(&self) -> &'static str {
        if self.sse_only {
            "sse-only"
        } else {
            "hybrid"
        }
    }
}
