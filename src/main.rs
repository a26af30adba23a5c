//! opendia - MCP gateway for browser automation
//!
//! Serves MCP over stdio and HTTP/SSE and forwards tool calls to the browser
//! extension connected on the WebSocket port.

use std::net::IpAddr;
use std::process::ExitCode;
use std::sync::Arc;
use std::time::Duration;

use anyhow::Context;
use clap::Parser;
use tokio::net::TcpListener;
use tokio::sync::RwLock;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use opendia_gateway::bridge::{peer_router, PeerListenerState};
use opendia_gateway::config::{GatewayConfig, DEFAULT_BIND_HOST};
use opendia_gateway::http::{http_router, HttpState};
use opendia_gateway::ports::{PortResolver, ResolvedPorts};
use opendia_gateway::tunnel::{Tunnel, TunnelCommand, TUNNEL_STARTUP_TIMEOUT};
use opendia_gateway::{CallCorrelator, ExtensionBridge, McpServer};

/// MCP gateway brokering tool calls to a browser extension.
#[derive(Parser, Debug)]
#[command(name = "opendia")]
#[command(author, version, about, long_about = None)]
struct Args {
    /// WebSocket port for the browser extension.
    #[arg(long, env = "OPENDIA_WS_PORT")]
    ws_port: Option<u16>,

    /// HTTP/SSE port for AI clients.
    #[arg(long, env = "OPENDIA_HTTP_PORT")]
    http_port: Option<u16>,

    /// Base port: WebSocket on N, HTTP on N+1.
    #[arg(long)]
    port: Option<u16>,

    /// Address both listeners bind.
    #[arg(long, default_value_t = DEFAULT_BIND_HOST)]
    host: IpAddr,

    /// Serve HTTP/SSE only; do not read stdin.
    #[arg(long)]
    sse_only: bool,

    /// Expose the HTTP port through an ngrok tunnel.
    #[arg(long, alias = "auto-tunnel")]
    tunnel: bool,

    /// Seconds a tool call waits for the extension.
    #[arg(long, default_value_t = 30)]
    call_timeout_secs: u64,

    /// Seconds between SSE heartbeats.
    #[arg(long, default_value_t = 30)]
    heartbeat_secs: u64,

    /// Seconds between extension liveness probes.
    #[arg(long, default_value_t = 30)]
    peer_ping_secs: u64,

    /// Enable verbose logging.
    #[arg(short, long)]
    verbose: bool,

    /// Emit logs as JSON.
    #[arg(long)]
    log_json: bool,
}

impl Args {
    fn config(&self) -> GatewayConfig {
        GatewayConfig {
            bind_host: self.host,
            sse_only: self.sse_only,
            tunnel: self.tunnel,
            call_timeout: Duration::from_secs(self.call_timeout_secs.max(1)),
            heartbeat_interval: Duration::from_secs(self.heartbeat_secs.max(1)),
            peer_ping_interval: Duration::from_secs(self.peer_ping_secs.max(1)),
            ..GatewayConfig::default()
        }
        .with_ports(self.ws_port, self.http_port, self.port)
    }
}

#[tokio::main]
async fn main() -> ExitCode {
    let args = Args::parse();

    let filter = if args.verbose {
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("debug"))
    } else {
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"))
    };

    // stdout carries the MCP protocol
    let registry = tracing_subscriber::registry().with(filter);
    if args.log_json {
        registry
            .with(fmt::layer().json().with_writer(std::io::stderr))
            .init();
    } else {
        registry
            .with(fmt::layer().with_writer(std::io::stderr))
            .init();
    }

    tracing::info!(
        "Starting {} v{}",
        opendia_gateway::server::SERVER_NAME,
        opendia_gateway::server::SERVER_VERSION
    );

    match run(args.config()).await {
        Ok(()) => {
            tracing::info!("Gateway stopped");
            ExitCode::SUCCESS
        }
        Err(e) => {
            tracing::error!("Gateway error: {:#}", e);
            ExitCode::FAILURE
        }
    }
}

async fn run(config: GatewayConfig) -> anyhow::Result<()> {
    let resolver = PortResolver::new(config.bind_host, config.service_marker.clone());
    let (websocket, http) = resolver
        .resolve(config.ws_port, config.http_port)
        .await
        .context("could not assign listener ports")?;
    let ports = ResolvedPorts {
        websocket: websocket.resolved,
        http: http.resolved,
    };

    let bridge = Arc::new(ExtensionBridge::new());
    let correlator = Arc::new(CallCorrelator::new(bridge.clone(), config.call_timeout));
    let server = Arc::new(McpServer::new(bridge.clone(), correlator.clone()));
    let tunnel_url = Arc::new(RwLock::new(None));

    let ws_listener = TcpListener::bind((config.bind_host, ports.websocket))
        .await
        .with_context(|| format!("could not bind WebSocket port {}", ports.websocket))?;
    let http_listener = TcpListener::bind((config.bind_host, ports.http))
        .await
        .with_context(|| format!("could not bind HTTP port {}", ports.http))?;

    let peer_app = peer_router(PeerListenerState {
        bridge,
        correlator,
        ping_interval: config.peer_ping_interval,
    });
    tokio::spawn(async move {
        if let Err(e) = axum::serve(ws_listener, peer_app).await {
            tracing::error!("WebSocket listener failed: {}", e);
        }
    });

    let http_app = http_router(HttpState {
        server: server.clone(),
        ports,
        transport: config.transport_label(),
        heartbeat_interval: config.heartbeat_interval,
        tunnel_url: tunnel_url.clone(),
    });
    tokio::spawn(async move {
        if let Err(e) = axum::serve(http_listener, http_app).await {
            tracing::error!("HTTP listener failed: {}", e);
        }
    });

    tracing::info!("WebSocket for extension: ws://localhost:{}", ports.websocket);
    tracing::info!("HTTP/SSE for AI clients: http://localhost:{}/sse", ports.http);
    tracing::info!("Health check: http://localhost:{}/health", ports.http);
    tracing::info!("Port discovery: http://localhost:{}/ports", ports.http);

    let tunnel = if config.tunnel {
        let tunnel = Tunnel::start(TunnelCommand::ngrok(ports.http), TUNNEL_STARTUP_TIMEOUT, tunnel_url)
            .await
            .context("tunnel failed to start; run without --tunnel to serve local-only")?;
        tracing::info!("Online AI services: {}/sse", tunnel.url());
        Some(tunnel)
    } else {
        None
    };

    if config.sse_only {
        tracing::info!("SSE-only mode, stdio disabled");
    } else {
        spawn_stdio(server);
    }

    shutdown_signal().await;
    tracing::info!("Shutting down");

    if let Some(tunnel) = tunnel {
        tunnel.shutdown().await;
    }
    Ok(())
}

#[cfg(feature = "stdio")]
fn spawn_stdio(server: Arc<McpServer>) {
    tokio::spawn(async move {
        if let Err(e) = server.run_stdio().await {
            tracing::error!("stdio front end failed: {}", e);
        }
    });
}

#[cfg(not(feature = "stdio"))]
fn spawn_stdio(_server: Arc<McpServer>) {
    tracing::warn!("Built without the stdio feature; serving HTTP/SSE only");
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            tracing::warn!("Ctrl-C handler unavailable: {}", e);
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        use tokio::signal::unix::{signal, SignalKind};
        match signal(SignalKind::terminate()) {
            Ok(mut sigterm) => {
                sigterm.recv().await;
            }
            Err(e) => {
                tracing::warn!("SIGTERM handler unavailable: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }
}
