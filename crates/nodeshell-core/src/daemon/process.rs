// ABOUTME: Runs the node daemon as a child process and answers health and address queries.
// ABOUTME: Forwards stdout/stderr lines as log events and keeps a bounded buffer of recent output.

use std::collections::VecDeque;
use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use serde::Deserialize;
use tokio::io::{AsyncBufReadExt, AsyncRead, BufReader};
use tokio::net::TcpStream;
use tokio::process::{Child, Command};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use super::DaemonControl;
use crate::error::{Result, ShellError};
use crate::event::ShellEvent;

/// How long a stopping daemon gets before it is killed.
const SHUTDOWN_GRACE: Duration = Duration::from_secs(10);

#[derive(Debug, Clone)]
pub struct ProcessDaemonConfig {
    pub binary: PathBuf,
    pub args: Vec<String>,
    /// Node repository, exported to the daemon as `IPFS_PATH`.
    pub repo_path: PathBuf,
    /// Run `<binary> init` first when the repo has no config yet.
    pub init_if_missing: bool,
    /// Used when the repo config does not name an API address.
    pub api_address: String,
    /// Used when the repo config does not name a gateway address.
    pub gateway_address: String,
    pub health_timeout: Duration,
    pub log_buffer_lines: usize,
}

impl Default for ProcessDaemonConfig {
    fn default() -> Self {
        Self {
            binary: PathBuf::from("ipfs"),
            args: vec!["daemon".to_string()],
            repo_path: PathBuf::from(".ipfs"),
            init_if_missing: true,
            api_address: "127.0.0.1:5001".to_string(),
            gateway_address: "127.0.0.1:8080".to_string(),
            health_timeout: Duration::from_secs(1),
            log_buffer_lines: 500,
        }
    }
}

/// Most recent daemon output lines, oldest first.
#[derive(Debug)]
pub struct LogBuffer {
    lines: VecDeque<String>,
    capacity: usize,
}

impl LogBuffer {
    pub fn new(capacity: usize) -> Self {
        Self {
            lines: VecDeque::with_capacity(capacity.min(1024)),
            capacity,
        }
    }

    pub fn push(&mut self, line: String) {
        if self.capacity == 0 {
            return;
        }
        if self.lines.len() == self.capacity {
            self.lines.pop_front();
        }
        self.lines.push_back(line);
    }

    pub fn snapshot(&self) -> Vec<String> {
        self.lines.iter().cloned().collect()
    }
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "PascalCase")]
struct RepoConfig {
    #[serde(default)]
    identity: Option<RepoIdentity>,
    #[serde(default)]
    addresses: Option<RepoAddresses>,
}

#[derive(Debug, Deserialize)]
struct RepoIdentity {
    #[serde(rename = "PeerID")]
    peer_id: String,
}

#[derive(Debug, Default, Deserialize)]
struct RepoAddresses {
    #[serde(rename = "API", default)]
    api: Option<OneOrMany>,
    #[serde(rename = "Gateway", default)]
    gateway: Option<OneOrMany>,
}

#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum OneOrMany {
    One(String),
    Many(Vec<String>),
}

impl OneOrMany {
    fn first(&self) -> Option<&str> {
        match self {
            OneOrMany::One(addr) => Some(addr.as_str()),
            OneOrMany::Many(addrs) => addrs.first().map(String::as_str),
        }
    }
}

/// Convert a TCP multiaddr such as `/ip4/127.0.0.1/tcp/5001` into `host:port`.
pub fn multiaddr_to_host_port(multiaddr: &str) -> Option<String> {
    let parts: Vec<&str> = multiaddr.trim().split('/').collect();
    match parts.as_slice() {
        ["", "ip4" | "dns" | "dns4" | "dns6", host, "tcp", port, ..] => {
            port.parse::<u16>().ok().map(|port| format!("{host}:{port}"))
        }
        ["", "ip6", host, "tcp", port, ..] => {
            port.parse::<u16>().ok().map(|port| format!("[{host}]:{port}"))
        }
        _ => None,
    }
}

/// The node daemon as a supervised child process.
pub struct ProcessDaemon {
    config: ProcessDaemonConfig,
    child: tokio::sync::Mutex<Option<Child>>,
    log: Arc<Mutex<LogBuffer>>,
    events: Option<mpsc::UnboundedSender<ShellEvent>>,
    reaper: Mutex<Option<JoinHandle<()>>>,
}

impl ProcessDaemon {
    pub fn new(config: ProcessDaemonConfig) -> Self {
        let log = Arc::new(Mutex::new(LogBuffer::new(config.log_buffer_lines)));
        Self {
            config,
            child: tokio::sync::Mutex::new(None),
            log,
            events: None,
            reaper: Mutex::new(None),
        }
    }

    /// Forward each output line to the controller as [`ShellEvent::DaemonLog`].
    pub fn with_events(mut self, events: mpsc::UnboundedSender<ShellEvent>) -> Self {
        self.events = Some(events);
        self
    }

    pub fn config(&self) -> &ProcessDaemonConfig {
        &self.config
    }

    /// Stop the daemon if it is still running and wait until it has exited
    /// or been killed after the grace period.
    pub async fn stop_and_wait(&self) -> Result<()> {
        self.stop().await?;
        let reaper = self
            .reaper
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .take();
        if let Some(reaper) = reaper {
            let _ = reaper.await;
        }
        Ok(())
    }

    fn command(&self) -> Command {
        let mut cmd = Command::new(&self.config.binary);
        cmd.env("IPFS_PATH", &self.config.repo_path)
            .stdin(Stdio::null());
        cmd
    }

    async fn init_repo(&self) -> Result<()> {
        info!(repo = %self.config.repo_path.display(), "Initializing node repo");
        let output = self
            .command()
            .arg("init")
            .output()
            .await
            .map_err(|e| ShellError::Daemon(format!("failed to run init: {e}")))?;
        if !output.status.success() {
            return Err(ShellError::Daemon(format!(
                "init exited with {}: {}",
                output.status,
                String::from_utf8_lossy(&output.stderr).trim()
            )));
        }
        Ok(())
    }

    async fn repo_config(&self) -> Result<RepoConfig> {
        let path = self.config.repo_path.join("config");
        let content = tokio::fs::read_to_string(&path).await?;
        Ok(serde_json::from_str(&content)?)
    }

    /// Resolve an address from the repo config, falling back to the configured one.
    async fn resolve_address(&self, pick: fn(&RepoAddresses) -> Option<&OneOrMany>, fallback: &str) -> String {
        let from_repo = match self.repo_config().await {
            Ok(config) => config
                .addresses
                .as_ref()
                .and_then(pick)
                .and_then(OneOrMany::first)
                .and_then(multiaddr_to_host_port),
            Err(e) => {
                debug!(error = %e, "Repo config unreadable, using configured address");
                None
            }
        };
        from_repo.unwrap_or_else(|| fallback.to_string())
    }

    fn forward_lines<R>(&self, stream: R, source: &'static str)
    where
        R: AsyncRead + Unpin + Send + 'static,
    {
        let log = Arc::clone(&self.log);
        let events = self.events.clone();
        tokio::spawn(async move {
            let mut reader = BufReader::new(stream);
            let mut buf = Vec::new();
            loop {
                buf.clear();
                match reader.read_until(b'\n', &mut buf).await {
                    Ok(0) => break,
                    Ok(_) => {}
                    Err(e) => {
                        warn!(source, error = %e, "Daemon output stream failed");
                        break;
                    }
                }
                // Bad bytes are replaced, not fatal
                let line = String::from_utf8_lossy(&buf)
                    .trim_end_matches(['\r', '\n'])
                    .to_string();
                debug!(source, line = %line, "Daemon output");
                log.lock()
                    .unwrap_or_else(|poisoned| poisoned.into_inner())
                    .push(line.clone());
                if let Some(tx) = &events {
                    let _ = tx.send(ShellEvent::DaemonLog(line));
                }
            }
        });
    }
}

fn repo_has_config(repo: &Path) -> bool {
    repo.join("config").is_file()
}

#[async_trait]
impl DaemonControl for ProcessDaemon {
    async fn start(&self) -> Result<()> {
        let mut guard = self.child.lock().await;
        if let Some(child) = guard.as_mut() {
            if matches!(child.try_wait(), Ok(None)) {
                debug!(pid = ?child.id(), "Daemon already running");
                return Ok(());
            }
        }

        if self.config.init_if_missing && !repo_has_config(&self.config.repo_path) {
            self.init_repo().await?;
        }

        let mut child = self
            .command()
            .args(&self.config.args)
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()
            .map_err(|e| {
                ShellError::Daemon(format!(
                    "failed to spawn {}: {e}",
                    self.config.binary.display()
                ))
            })?;

        info!(pid = ?child.id(), binary = %self.config.binary.display(), "Daemon spawned");

        if let Some(stdout) = child.stdout.take() {
            self.forward_lines(stdout, "stdout");
        }
        if let Some(stderr) = child.stderr.take() {
            self.forward_lines(stderr, "stderr");
        }

        *guard = Some(child);
        Ok(())
    }

    async fn stop(&self) -> Result<()> {
        // Held until the reaper is recorded so a concurrent stop_and_wait sees it.
        let mut guard = self.child.lock().await;
        let Some(mut child) = guard.take() else {
            debug!("Daemon not running, nothing to stop");
            return Ok(());
        };

        match self.command().arg("shutdown").spawn() {
            Ok(_) => debug!("Shutdown requested"),
            Err(e) => {
                warn!(error = %e, "Shutdown command failed, killing daemon");
                child.start_kill()?;
            }
        }

        let reaper = tokio::spawn(async move {
            match tokio::time::timeout(SHUTDOWN_GRACE, child.wait()).await {
                Ok(Ok(status)) => info!(%status, "Daemon exited"),
                Ok(Err(e)) => warn!(error = %e, "Failed to wait for daemon"),
                Err(_) => {
                    warn!("Daemon ignored shutdown, killing");
                    let _ = child.kill().await;
                }
            }
        });
        *self
            .reaper
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner()) = Some(reaper);
        drop(guard);
        Ok(())
    }

    async fn is_online(&self) -> bool {
        let addr = self
            .resolve_address(|a| a.api.as_ref(), &self.config.api_address)
            .await;
        matches!(
            tokio::time::timeout(self.config.health_timeout, TcpStream::connect(&addr)).await,
            Ok(Ok(_))
        )
    }

    async fn peer_id(&self) -> Result<String> {
        self.repo_config()
            .await?
            .identity
            .map(|identity| identity.peer_id)
            .ok_or_else(|| ShellError::query("peer_id", "repo config has no identity"))
    }

    async fn gateway_address(&self) -> Result<String> {
        Ok(self
            .resolve_address(|a| a.gateway.as_ref(), &self.config.gateway_address)
            .await)
    }

    async fn api_address(&self) -> Result<String> {
        Ok(self
            .resolve_address(|a| a.api.as_ref(), &self.config.api_address)
            .await)
    }

    async fn datastore_path(&self) -> Result<PathBuf> {
        Ok(self.config.repo_path.clone())
    }

    async fn current_log(&self) -> Result<Vec<String>> {
        Ok(self
            .log
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .snapshot())
    }
}
