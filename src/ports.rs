//! Startup port resolution.
//!
//! Runs once before either listener binds. A requested port that is busy is
//! checked for a prior instance of this service, which gets terminated; any
//! other occupant pushes the role to the next free port above it.

use std::fmt;
use std::net::{IpAddr, TcpListener};
use std::time::Duration;

use serde::Serialize;
use sysinfo::{Pid, ProcessRefreshKind, ProcessesToUpdate, Signal, System, UpdateKind};
use tracing::{debug, info, warn};

use crate::error::{Error, Result};

/// Ports probed above a busy one before giving up.
pub const PORT_SEARCH_CEILING: u16 = 100;

/// Wait after terminating an occupant before probing again.
pub const KILL_GRACE: Duration = Duration::from_secs(1);

/// Wait after the startup sweep killed anything.
pub const SWEEP_SETTLE: Duration = Duration::from_secs(2);

/// Listener roles that need a port.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PortRole {
    /// Extension-facing WebSocket listener.
    WebSocket,
    /// Client-facing HTTP/SSE listener.
    Http,
}

impl fmt::Display for PortRole {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PortRole::WebSocket => write!(f, "WebSocket"),
            PortRole::Http => write!(f, "HTTP"),
        }
    }
}

/// Outcome of resolving one role.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PortAssignment {
    /// Role the port is for.
    pub role: PortRole,
    /// Port asked for on the command line.
    pub requested: u16,
    /// Port the listener will bind.
    pub resolved: u16,
}

/// Final ports of both listeners.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct ResolvedPorts {
    /// WebSocket listener port.
    pub websocket: u16,
    /// HTTP listener port.
    pub http: u16,
}

/// OS process lookups used by the resolver.
#[async_trait::async_trait]
pub trait ProcessInspector: Send + Sync {
    /// Processes listening on `port`.
    async fn pids_on_port(&self, port: u16) -> Vec<u32>;

    /// Full command line of `pid`.
    fn command_line(&self, pid: u32) -> Option<String>;

    /// Ask `pid` to terminate. Returns whether the signal was delivered.
    fn terminate(&self, pid: u32) -> bool;
}

/// Inspector backed by `lsof` and the process table.
#[derive(Debug, Default, Clone, Copy)]
pub struct SystemInspector;

#[async_trait::async_trait]
impl ProcessInspector for SystemInspector {
    async fn pids_on_port(&self, port: u16) -> Vec<u32> {
        let output = tokio::process::Command::new("lsof")
            .arg(format!("-ti:{}", port))
            .output()
            .await;
        match output {
            Ok(output) => String::from_utf8_lossy(&output.stdout)
                .lines()
                .filter_map(|l| l.trim().parse().ok())
                .collect(),
            Err(e) => {
                debug!("lsof unavailable: {}", e);
                Vec::new()
            }
        }
    }

    fn command_line(&self, pid: u32) -> Option<String> {
        let pid = Pid::from_u32(pid);
        let mut sys = System::new();
        sys.refresh_processes_specifics(
            ProcessesToUpdate::Some(&[pid]),
            true,
            ProcessRefreshKind::nothing().with_cmd(UpdateKind::Always),
        );
        let process = sys.process(pid)?;
        let cmd = process
            .cmd()
            .iter()
            .map(|part| part.to_string_lossy())
            .collect::<Vec<_>>()
            .join(" ");
        Some(cmd)
    }

    fn terminate(&self, pid: u32) -> bool {
        let pid = Pid::from_u32(pid);
        let mut sys = System::new();
        sys.refresh_processes(ProcessesToUpdate::Some(&[pid]), true);
        match sys.process(pid) {
            Some(process) => process.kill_with(Signal::Term).unwrap_or_else(|| process.kill()),
            None => false,
        }
    }
}

/// Assigns the WebSocket and HTTP ports.
#[derive(Debug)]
pub struct PortResolver<I = SystemInspector> {
    inspector: I,
    host: IpAddr,
    marker: String,
    own_pid: u32,
    grace: Duration,
    settle: Duration,
    ceiling: u16,
}

impl PortResolver<SystemInspector> {
    /// Resolver using the real process table.
    pub fn new(host: IpAddr, marker: impl Into<String>) -> Self {
        Self::with_inspector(SystemInspector, host, marker)
    }
}

impl<I: ProcessInspector> PortResolver<I> {
    /// Resolver using a custom inspector.
    pub fn with_inspector(inspector: I, host: IpAddr, marker: impl Into<String>) -> Self {
        Self {
            inspector,
            host,
            marker: marker.into(),
            own_pid: std::process::id(),
            grace: KILL_GRACE,
            settle: SWEEP_SETTLE,
            ceiling: PORT_SEARCH_CEILING,
        }
    }

    /// Override the post-kill waits.
    pub fn with_waits(mut self, grace: Duration, settle: Duration) -> Self {
        self.grace = grace;
        self.settle = settle;
        self
    }

    /// Whether `port` can be bound right now.
    pub fn is_free(&self, port: u16) -> bool {
        TcpListener::bind((self.host, port)).is_ok()
    }

    /// Resolve both roles.
    ///
    /// The returned ports always differ.
    pub async fn resolve(&self, ws: u16, http: u16) -> Result<(PortAssignment, PortAssignment)> {
        if self.sweep(&[ws, http]).await > 0 {
            info!("Waiting for terminated instances to release their ports");
            tokio::time::sleep(self.settle).await;
        }

        let websocket = self.resolve_role(PortRole::WebSocket, ws, None).await?;
        let http = self.resolve_role(PortRole::Http, http, Some(websocket.resolved)).await?;
        Ok((websocket, http))
    }

    /// Terminate prior instances listening on any of `ports`.
    ///
    /// Returns how many processes were signalled.
    pub async fn sweep(&self, ports: &[u16]) -> usize {
        let mut killed = 0;
        for &port in ports {
            if !self.is_free(port) {
                killed += self.kill_prior_instances(port).await;
            }
        }
        killed
    }

    async fn kill_prior_instances(&self, port: u16) -> usize {
        let mut killed = 0;
        for pid in self.inspector.pids_on_port(port).await {
            if pid == self.own_pid {
                continue;
            }
            let Some(cmd) = self.inspector.command_line(pid) else {
                continue;
            };
            if !cmd.contains(&self.marker) {
                debug!(pid, port, "Port held by unrelated process: {}", cmd);
                continue;
            }
            warn!(pid, port, "Terminating prior instance: {}", cmd);
            if self.inspector.terminate(pid) {
                killed += 1;
            } else {
                warn!(pid, port, "Could not signal prior instance");
            }
        }
        killed
    }

    /// Resolve one role, never returning `avoid`.
    pub async fn resolve_role(&self, role: PortRole, requested: u16, avoid: Option<u16>) -> Result<PortAssignment> {
        let collides = avoid == Some(requested);
        let mut resolved = None;

        if !collides {
            if self.is_free(requested) {
                resolved = Some(requested);
            } else if self.kill_prior_instances(requested).await > 0 {
                tokio::time::sleep(self.grace).await;
                if self.is_free(requested) {
                    info!(port = requested, "{} port reclaimed from prior instance", role);
                    resolved = Some(requested);
                }
            }
        }

        let resolved = match resolved {
            Some(port) => port,
            None => {
                let port = self.find_free_above(requested, avoid)?;
                warn!("{} port {} unavailable, using {}", role, requested, port);
                port
            }
        };

        Ok(PortAssignment {
            role,
            requested,
            resolved,
        })
    }

    /// First free port above `start`, skipping `avoid`, within the ceiling.
    pub fn find_free_above(&self, start: u16, avoid: Option<u16>) -> Result<u16> {
        for offset in 1..=self.ceiling {
            let Some(port) = start.checked_add(offset) else {
                break;
            };
            if Some(port) != avoid && self.is_free(port) {
                return Ok(port);
            }
        }
        Err(Error::PortsExhausted {
            start,
            checked: self.ceiling,
        })
    }
}
