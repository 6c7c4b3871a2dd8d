// ABOUTME: Lifecycle supervision of the node daemon: start, health polling, stop.
// ABOUTME: Defines the daemon collaborator trait and the capability map exposed to the UI.

pub mod process;

pub use process::{ProcessDaemon, ProcessDaemonConfig};

use std::future::Future;
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use serde_json::{json, Value};
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{debug, error, info};

use crate::commands::{CapabilityMap, Handler};
use crate::error::Result;

/// Fixed delay between failed health checks.
pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_millis(2000);

/// Namespace the daemon capabilities are registered under.
pub const DAEMON_NAMESPACE: &str = "ipfs";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DaemonState {
    Stopped,
    Starting,
    Polling,
    Online,
}

/// The externally managed node process.
///
/// Every call is one-shot; callers do their own retrying.
#[async_trait]
pub trait DaemonControl: Send + Sync {
    async fn start(&self) -> Result<()>;

    /// Request shutdown without waiting for the process to exit.
    async fn stop(&self) -> Result<()>;

    /// Health predicate. Failures to reach the daemon read as `false`.
    async fn is_online(&self) -> bool;

    async fn peer_id(&self) -> Result<String>;

    async fn gateway_address(&self) -> Result<String>;

    async fn api_address(&self) -> Result<String>;

    async fn datastore_path(&self) -> Result<PathBuf>;

    /// Recent daemon output, oldest first.
    async fn current_log(&self) -> Result<Vec<String>>;
}

/// Injectable delay so polling can run against a simulated clock.
#[async_trait]
pub trait Sleeper: Send + Sync {
    async fn sleep(&self, duration: Duration);
}

#[derive(Debug, Clone, Copy, Default)]
pub struct TokioSleeper;

#[async_trait]
impl Sleeper for TokioSleeper {
    async fn sleep(&self, duration: Duration) {
        tokio::time::sleep(duration).await;
    }
}

/// Check health until the daemon answers. Returns the number of retries it took.
///
/// Never gives up: there is no attempt cap and the delay never grows.
pub async fn wait_until_online(
    daemon: &dyn DaemonControl,
    sleeper: &dyn Sleeper,
    interval: Duration,
) -> u32 {
    let mut retries = 0u32;
    loop {
        if daemon.is_online().await {
            return retries;
        }
        retries = retries.saturating_add(1);
        debug!(retries, interval_ms = interval.as_millis() as u64, "Daemon not reachable yet");
        sleeper.sleep(interval).await;
    }
}

/// Owns the daemon state machine: Stopped → Starting → Polling → Online,
/// with `stop` returning to Stopped from anywhere.
#[derive(Clone)]
pub struct DaemonSupervisor {
    daemon: Arc<dyn DaemonControl>,
    sleeper: Arc<dyn Sleeper>,
    interval: Duration,
    state: Arc<watch::Sender<DaemonState>>,
    /// Set while a health poll is in flight. Only touched under the state lock.
    polling: Arc<AtomicBool>,
}

impl DaemonSupervisor {
    pub fn new(daemon: Arc<dyn DaemonControl>, interval: Duration) -> Self {
        let (state, _) = watch::channel(DaemonState::Stopped);
        Self {
            daemon,
            sleeper: Arc::new(TokioSleeper),
            interval,
            state: Arc::new(state),
            polling: Arc::new(AtomicBool::new(false)),
        }
    }

    pub fn with_sleeper(mut self, sleeper: Arc<dyn Sleeper>) -> Self {
        self.sleeper = sleeper;
        self
    }

    pub fn state(&self) -> DaemonState {
        *self.state.borrow()
    }

    pub fn subscribe(&self) -> watch::Receiver<DaemonState> {
        self.state.subscribe()
    }

    pub fn daemon(&self) -> Arc<dyn DaemonControl> {
        Arc::clone(&self.daemon)
    }

    /// Launch the daemon in the background. Only acts from Stopped; returns
    /// whether a launch was issued.
    pub fn start(&self) -> bool {
        let launched = self.state.send_if_modified(|state| {
            if *state == DaemonState::Stopped {
                *state = DaemonState::Starting;
                true
            } else {
                false
            }
        });
        if !launched {
            debug!(state = ?self.state(), "Daemon start ignored, already running");
            return false;
        }

        info!("Starting daemon");
        let daemon = Arc::clone(&self.daemon);
        tokio::spawn(async move {
            if let Err(e) = daemon.start().await {
                error!(error = %e, "Daemon launch failed");
            }
        });
        true
    }

    /// Poll the health predicate until it holds, then go Online and call
    /// `on_ready` once. The poll is not cancelled by `stop`.
    ///
    /// At most one poll runs at a time. If one is already in flight the state
    /// moves back to Polling, that poll's `on_ready` stays the only callback,
    /// and `None` is returned.
    ///
    /// A poll that finds the daemon healthy after a `stop` leaves the state
    /// at Stopped and does not call `on_ready`.
    pub fn poll_until_online<F>(&self, on_ready: F) -> Option<JoinHandle<()>>
    where
        F: FnOnce() + Send + 'static,
    {
        let mut fresh = false;
        self.state.send_modify(|state| {
            *state = DaemonState::Polling;
            fresh = !self.polling.swap(true, Ordering::SeqCst);
        });
        if !fresh {
            debug!("Health poll already running, reusing it");
            return None;
        }

        let daemon = Arc::clone(&self.daemon);
        let sleeper = Arc::clone(&self.sleeper);
        let state = Arc::clone(&self.state);
        let polling = Arc::clone(&self.polling);
        let interval = self.interval;

        Some(tokio::spawn(async move {
            let retries = wait_until_online(daemon.as_ref(), sleeper.as_ref(), interval).await;

            let mut ready = false;
            state.send_if_modified(|state| {
                polling.store(false, Ordering::SeqCst);
                ready = *state == DaemonState::Polling;
                if ready {
                    *state = DaemonState::Online;
                }
                ready
            });

            if ready {
                info!(retries, "Daemon online");
                on_ready();
            } else {
                debug!(retries, state = ?*state.borrow(), "Daemon answered after stop, not going online");
            }
        }))
    }

    /// Request shutdown from any state. Does not wait for the process.
    pub fn stop(&self) {
        let previous = self.state.send_replace(DaemonState::Stopped);
        info!(from = ?previous, "Stopping daemon");
        let daemon = Arc::clone(&self.daemon);
        tokio::spawn(async move {
            if let Err(e) = daemon.stop().await {
                error!(error = %e, "Daemon stop request failed");
            }
        });
    }

    /// Daemon operations callable from the UI as `ipfs:<action>`.
    ///
    /// `on_ready` runs each time a UI-initiated start reaches Online.
    pub fn capabilities<R>(&self, on_ready: R) -> CapabilityMap
    where
        R: Fn() + Send + Sync + 'static,
    {
        let on_ready = Arc::new(on_ready);
        let ns = DAEMON_NAMESPACE;
        let mut map = CapabilityMap::new();

        let sup = self.clone();
        map.handler(ns, "start", Handler::new(move |_| {
            let sup = sup.clone();
            let on_ready = Arc::clone(&on_ready);
            async move {
                if sup.start() {
                    sup.poll_until_online(move || on_ready());
                }
                Ok(Value::Null)
            }
        }));

        let sup = self.clone();
        map.handler(ns, "stop", Handler::new(move |_| {
            let sup = sup.clone();
            async move {
                sup.stop();
                Ok(Value::Null)
            }
        }));

        map.handler(ns, "isOnline", self.query(|d| async move { Ok(json!(d.is_online().await)) }));
        map.handler(ns, "getPeerId", self.query(|d| async move { Ok(json!(d.peer_id().await?)) }));
        map.handler(
            ns,
            "getGatewayAddress",
            self.query(|d| async move { Ok(json!(d.gateway_address().await?)) }),
        );
        map.handler(
            ns,
            "getApiAddress",
            self.query(|d| async move { Ok(json!(d.api_address().await?)) }),
        );
        map.handler(
            ns,
            "getDatastorePath",
            self.query(|d| async move {
                let path = d.datastore_path().await?;
                Ok(json!(path.to_string_lossy()))
            }),
        );
        map.handler(ns, "getLog", self.query(|d| async move { Ok(json!(d.current_log().await?)) }));
        map
    }

    fn query<F, Fut>(&self, call: F) -> Handler
    where
        F: Fn(Arc<dyn DaemonControl>) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<Value>> + Send + 'static,
    {
        let daemon = Arc::clone(&self.daemon);
        Handler::new(move |_| call(Arc::clone(&daemon)))
    }
}
