//! Public tunnel helper.
//!
//! Spawns `ngrok http <port> --log stdout` and waits for it to report its
//! public URL. A tunnel that fails to come up is a startup error; one that
//! dies later only clears the advertised URL.

use std::process::Stdio;
use std::sync::Arc;
use std::time::Duration;

use sysinfo::{Pid, ProcessesToUpdate, Signal, System};
use tokio::io::{AsyncBufReadExt, AsyncRead, BufReader, Lines};
use tokio::process::{Child, Command};
use tokio::sync::{oneshot, RwLock};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use crate::error::{Error, Result};

/// How long to wait for the public URL.
pub const TUNNEL_STARTUP_TIMEOUT: Duration = Duration::from_secs(10);

/// How long the child gets to exit after SIGTERM.
const SHUTDOWN_GRACE: Duration = Duration::from_secs(5);

/// Program and arguments of the tunnel process.
#[derive(Debug, Clone)]
pub struct TunnelCommand {
    program: String,
    args: Vec<String>,
}

impl TunnelCommand {
    /// ngrok forwarding to the local `port`.
    pub fn ngrok(port: u16) -> Self {
        Self::new("ngrok", ["http".to_string(), port.to_string(), "--log".into(), "stdout".into()])
    }

    /// Arbitrary command that prints `url=https://...` once ready.
    pub fn new(program: impl Into<String>, args: impl IntoIterator<Item = impl Into<String>>) -> Self {
        Self {
            program: program.into(),
            args: args.into_iter().map(Into::into).collect(),
        }
    }
}

/// Pull the public URL out of one line of tunnel output.
pub fn extract_tunnel_url(line: &str) -> Option<&str> {
    let start = line.find("url=https://")? + "url=".len();
    line[start..].split_whitespace().next()
}

fn is_tunnel_error(line: &str) -> bool {
    line.contains("error") || line.contains("failed")
}

/// A running tunnel.
#[derive(Debug)]
pub struct Tunnel {
    url: String,
    shutdown: Option<oneshot::Sender<()>>,
    watcher: JoinHandle<()>,
}

impl Tunnel {
    /// Start the tunnel and publish its URL into `public_url`.
    pub async fn start(
        command: TunnelCommand,
        wait: Duration,
        public_url: Arc<RwLock<Option<String>>>,
    ) -> Result<Self> {
        info!("Starting tunnel: {} {}", command.program, command.args.join(" "));
        let mut child = Command::new(&command.program)
            .args(&command.args)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()
            .map_err(|e| Error::Tunnel(format!("could not start {}: {}", command.program, e)))?;

        let stdout = child
            .stdout
            .take()
            .ok_or_else(|| Error::Tunnel("tunnel stdout unavailable".into()))?;
        let stderr = child
            .stderr
            .take()
            .ok_or_else(|| Error::Tunnel("tunnel stderr unavailable".into()))?;
        let mut stdout = BufReader::new(stdout).lines();
        let mut stderr = BufReader::new(stderr).lines();

        let ready = tokio::time::timeout(wait, wait_for_url(&mut stdout, &mut stderr)).await;

        let url = match ready {
            Ok(Ok(url)) => url,
            Ok(Err(e)) => {
                let _ = child.kill().await;
                return Err(e);
            }
            Err(_) => {
                let _ = child.kill().await;
                return Err(Error::Tunnel("Tunnel startup timeout".into()));
            }
        };

        info!("Tunnel ready: {}/sse", url);
        *public_url.write().await = Some(url.clone());

        tokio::spawn(drain(stdout.into_inner()));
        tokio::spawn(drain(stderr.into_inner()));

        let (shutdown_tx, shutdown_rx) = oneshot::channel();
        let watcher = tokio::spawn(watch(child, shutdown_rx, public_url));

        Ok(Self {
            url,
            shutdown: Some(shutdown_tx),
            watcher,
        })
    }

    /// Public URL of the tunnel.
    pub fn url(&self) -> &str {
        &self.url
    }

    /// Send SIGTERM to the tunnel process and wait for it to exit.
    pub async fn shutdown(mut self) {
        if let Some(tx) = self.shutdown.take() {
            let _ = tx.send(());
        }
        let _ = (&mut self.watcher).await;
    }
}

/// Read tunnel output until it reports its URL or an error.
async fn wait_for_url<O, E>(stdout: &mut Lines<BufReader<O>>, stderr: &mut Lines<BufReader<E>>) -> Result<String>
where
    O: AsyncRead + Unpin,
    E: AsyncRead + Unpin,
{
    let mut stderr_open = true;
    loop {
        tokio::select! {
            line = stdout.next_line() => match line? {
                Some(line) => {
                    if let Some(url) = extract_tunnel_url(&line) {
                        return Ok(url.to_string());
                    }
                }
                None => return Err(Error::Tunnel("tunnel exited before reporting a URL".into())),
            },
            line = stderr.next_line(), if stderr_open => match line? {
                Some(line) if is_tunnel_error(&line) => return Err(Error::Tunnel(line.trim().to_string())),
                Some(line) => debug!("tunnel: {}", line),
                None => stderr_open = false,
            },
        }
    }
}

async fn drain<R: AsyncRead + Unpin>(reader: BufReader<R>) {
    let mut lines = reader.lines();
    while let Ok(Some(line)) = lines.next_line().await {
        debug!("tunnel: {}", line);
    }
}

async fn watch(mut child: Child, shutdown: oneshot::Receiver<()>, public_url: Arc<RwLock<Option<String>>>) {
    let exited = tokio::select! {
        status = child.wait() => Some(status),
        _ = shutdown => None,
    };

    match exited {
        Some(Ok(status)) => warn!("Tunnel exited ({}), serving local-only", status),
        Some(Err(e)) => warn!("Tunnel lost: {}, serving local-only", e),
        None => {
            info!("Closing tunnel");
            if let Some(pid) = child.id() {
                terminate(pid);
            }
            if tokio::time::timeout(SHUTDOWN_GRACE, child.wait()).await.is_err() {
                let _ = child.kill().await;
            }
        }
    }
    *public_url.write().await = None;
}

fn terminate(pid: u32) {
    let pid = Pid::from_u32(pid);
    let mut sys = System::new();
    sys.refresh_processes(ProcessesToUpdate::Some(&[pid]), true);
    if let Some(process) = sys.process(pid) {
        if process.kill_with(Signal::Term) != Some(true) {
            process.kill();
        }
    }
}
