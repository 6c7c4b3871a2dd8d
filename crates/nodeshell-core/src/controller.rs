// ABOUTME: Top-level shell controller: wires daemon supervision, command routing, windows, and tray.
// ABOUTME: Runs the single event loop that owns all registry state.

use std::sync::Arc;

use serde_json::{json, Value};
use tokio::sync::mpsc;
use tracing::{debug, info, warn};

use crate::commands::{CommandTable, Handler, Route, ShellCommand};
use crate::config::ShellConfig;
use crate::daemon::{DaemonControl, DaemonState, DaemonSupervisor, Sleeper};
use crate::error::{Result, ShellError};
use crate::event::{InboundMessage, OutboundEvent, ShellEvent, WindowEvent};
use crate::store::{ReadyQuery, Store};
use crate::tray::{TrayController, TrayFactory};
use crate::window::{SurfaceOptions, WindowConfig, WindowFactory, WindowId, WindowRegistry};

/// External collaborators the controller is built from.
pub struct ShellParts {
    pub daemon: Arc<dyn DaemonControl>,
    pub window_factory: Box<dyn WindowFactory>,
    pub tray_factory: Box<dyn TrayFactory>,
    pub store: Arc<dyn Store>,
    /// Replaces the real-time sleep between health checks.
    pub sleeper: Option<Arc<dyn Sleeper>>,
}

/// Whether the loop keeps going after an event.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Flow {
    Continue,
    Quit,
}

pub struct ShellController {
    config: ShellConfig,
    supervisor: DaemonSupervisor,
    commands: CommandTable,
    windows: WindowRegistry,
    store: Arc<dyn Store>,
    tray_factory: Box<dyn TrayFactory>,
    tray: Option<TrayController>,
    main_window: Option<WindowId>,
    /// Main window waiting for first paint before it is shown.
    pending_show: Option<WindowId>,
    /// Hidden child created by `createChildWindow`.
    settings_window: Option<WindowId>,
    session_open: bool,
    stopped: bool,
    events_tx: mpsc::UnboundedSender<ShellEvent>,
    events_rx: mpsc::UnboundedReceiver<ShellEvent>,
}

impl ShellController {
    /// `events_tx`/`events_rx` must be the two halves of one channel; hosts
    /// and the daemon report into `events_tx`.
    pub fn new(
        config: ShellConfig,
        parts: ShellParts,
        events_tx: mpsc::UnboundedSender<ShellEvent>,
        events_rx: mpsc::UnboundedReceiver<ShellEvent>,
    ) -> Self {
        let mut supervisor = DaemonSupervisor::new(parts.daemon, config.poll_interval());
        if let Some(sleeper) = parts.sleeper {
            supervisor = supervisor.with_sleeper(sleeper);
        }

        let ready_tx = events_tx.clone();
        let capabilities = supervisor.capabilities(move || {
            let _ = ready_tx.send(ShellEvent::DaemonReady);
        });
        let commands = CommandTable::builder()
            .with_shell_commands()
            .register(&capabilities)
            .build();

        let windows = WindowRegistry::new(parts.window_factory, config.window.native_modal_chrome);

        Self {
            config,
            supervisor,
            commands,
            windows,
            store: parts.store,
            tray_factory: parts.tray_factory,
            tray: None,
            main_window: None,
            pending_show: None,
            settings_window: None,
            session_open: false,
            stopped: false,
            events_tx,
            events_rx,
        }
    }

    /// Sender for hosts, sockets, and signal handlers.
    pub fn events(&self) -> mpsc::UnboundedSender<ShellEvent> {
        self.events_tx.clone()
    }

    pub fn windows(&self) -> &WindowRegistry {
        &self.windows
    }

    pub fn commands(&self) -> &CommandTable {
        &self.commands
    }

    pub fn main_window(&self) -> Option<WindowId> {
        self.main_window
    }

    pub fn settings_window(&self) -> Option<WindowId> {
        self.settings_window
    }

    pub fn tray_window(&self) -> Option<WindowId> {
        self.tray.as_ref().map(TrayController::bound)
    }

    pub fn daemon_state(&self) -> DaemonState {
        self.supervisor.state()
    }

    /// Start the daemon, begin polling, and open the main window.
    pub fn startup(&mut self) {
        self.supervisor.start();
        let ready_tx = self.events_tx.clone();
        self.supervisor.poll_until_online(move || {
            let _ = ready_tx.send(ShellEvent::DaemonReady);
        });

        if let Err(e) = self.create_main_window() {
            warn!(error = %e, "Failed to create main window");
        }
    }

    /// Run until a quit event, then stop the daemon.
    pub async fn run(mut self) {
        self.startup();
        while let Some(flow) = self.step().await {
            if flow == Flow::Quit {
                break;
            }
        }
        self.shutdown();
    }

    /// Wait for the next event and handle it.
    pub async fn step(&mut self) -> Option<Flow> {
        let event = self.events_rx.recv().await?;
        Some(self.handle_event(event))
    }

    /// Handle every event already queued without waiting for more.
    pub fn drain(&mut self) -> Flow {
        while let Ok(event) = self.events_rx.try_recv() {
            if self.handle_event(event) == Flow::Quit {
                return Flow::Quit;
            }
        }
        Flow::Continue
    }

    /// Stop the daemon once. Does not wait for it to exit.
    pub fn shutdown(&mut self) {
        if self.stopped {
            return;
        }
        self.stopped = true;
        info!("Shell shutting down");
        self.supervisor.stop();
    }

    pub fn handle_event(&mut self, event: ShellEvent) -> Flow {
        match event {
            ShellEvent::Inbound(msg) => self.dispatch(msg),
            ShellEvent::Window { id, event } => return self.on_window_event(id, event),
            ShellEvent::TrayClicked => {
                if let Some(tray) = self.tray.as_mut() {
                    if let Err(e) = tray.on_click(&mut self.windows) {
                        debug!(error = %e, "Tray click ignored");
                    }
                }
            }
            ShellEvent::DaemonLog(line) => {
                let delivered = self.windows.publish_log(&line);
                debug!(delivered, "Daemon log fanned out");
            }
            ShellEvent::DaemonReady => self.issue_ready_queries(),
            ShellEvent::Reply { to, event } => match self.windows.sink(to) {
                Some(sink) => {
                    sink.send(event);
                }
                None => debug!(window_id = %to, channel = %event.channel, "Reply for closed window dropped"),
            },
            ShellEvent::Activate {
                has_visible_windows,
            } => {
                if !self.windows.has_windows() {
                    if let Err(e) = self.create_main_window() {
                        warn!(error = %e, "Failed to recreate main window");
                    }
                } else if has_visible_windows {
                    debug!("Activate with visible windows, nothing to do");
                }
            }
            ShellEvent::AllWindowsClosed => return self.on_all_windows_closed(),
            ShellEvent::Quit => return Flow::Quit,
        }
        Flow::Continue
    }

    /// Create the main window, bind the tray, and load the start page.
    /// The window is shown once the host reports first paint.
    pub fn create_main_window(&mut self) -> Result<WindowId> {
        let config = WindowConfig {
            surface: SurfaceOptions {
                show: false,
                ..self.config.base_surface()
            },
            has_ipfs_logging: self.config.window.main_receives_logs,
        };
        let id = self.windows.create_window(config)?;
        self.bind_tray(id);
        self.windows.load_url(id, &self.config.window.start_page)?;

        self.main_window = Some(id);
        self.pending_show = Some(id);
        self.session_open = true;
        info!(window_id = %id, "Main window created");
        Ok(id)
    }

    fn bind_tray(&mut self, id: WindowId) {
        let visible = self.windows.is_visible(id);
        if let Some(tray) = self.tray.as_mut() {
            // Keep pointing at a main window that is still open.
            if !self.windows.is_live(tray.bound()) {
                tray.rebind(id, visible);
            }
            return;
        }

        let icon_path = self.config.base_surface().icon;
        match self.tray_factory.create(icon_path.as_deref()) {
            Ok(icon) => self.tray = Some(TrayController::new(icon, id, visible)),
            Err(e) => warn!(error = %e, "Tray unavailable, continuing without it"),
        }
    }

    fn on_window_event(&mut self, id: WindowId, event: WindowEvent) -> Flow {
        match event {
            WindowEvent::Closed => {
                if !self.windows.on_closed(id) {
                    return Flow::Continue;
                }
                if self.main_window == Some(id) {
                    self.main_window = None;
                }
                if self.settings_window == Some(id) {
                    self.settings_window = None;
                }
                if self.pending_show == Some(id) {
                    self.pending_show = None;
                }
                if !self.windows.has_windows() {
                    return self.on_all_windows_closed();
                }
            }
            WindowEvent::ReadyToShow => {
                if self.pending_show == Some(id) {
                    self.pending_show = None;
                    if let Err(e) = self.windows.show_window(id) {
                        debug!(error = %e, "Main window gone before first paint");
                    }
                }
            }
            WindowEvent::DidFinishLoad | WindowEvent::DomReady => {
                self.windows.on_page_event(id, event);
            }
            WindowEvent::Shown | WindowEvent::Hidden => {
                if let Some(tray) = self.tray.as_mut() {
                    tray.on_window_event(id, event);
                }
            }
        }
        Flow::Continue
    }

    fn on_all_windows_closed(&mut self) -> Flow {
        if self.config.window.keep_running_without_windows {
            debug!("All windows closed, staying resident");
            Flow::Continue
        } else {
            info!("All windows closed, quitting");
            Flow::Quit
        }
    }

    fn dispatch(&mut self, msg: InboundMessage) {
        let Some(route) = self.commands.get(&msg.channel).cloned() else {
            warn!(channel = %msg.channel, "{}", ShellError::UnknownChannel(msg.channel.clone()));
            return;
        };

        match route {
            Route::Shell(cmd) => {
                if let Err(e) = self.run_shell_command(cmd, msg.payload) {
                    if e.is_stale_reference() {
                        debug!(channel = cmd.channel(), error = %e, "Stale window reference ignored");
                    } else {
                        warn!(channel = cmd.channel(), error = %e, "Inbound command failed");
                    }
                }
            }
            Route::Capability(handler) => self.spawn_capability(msg.channel, handler, msg.payload, msg.sender),
        }
    }

    fn run_shell_command(&mut self, cmd: ShellCommand, payload: Value) -> Result<()> {
        if cmd.needs_session() && !self.session_open {
            return Err(ShellError::NoSession(cmd.channel().to_string()));
        }

        match cmd {
            ShellCommand::ReduxAction => {
                self.store.dispatch(payload);
            }
            ShellCommand::CreateAndShowChildWindow => {
                let id = self.create_child(cmd, &payload)?;
                self.windows.show_window(id)?;
            }
            ShellCommand::CreateChildWindow => {
                let id = self.create_child(cmd, &payload)?;
                self.settings_window = Some(id);
            }
            ShellCommand::ShowChildWindow => match self.settings_window {
                Some(id) => self.windows.show_window(id)?,
                None => debug!("No child window to show"),
            },
            ShellCommand::ClosePage => {
                let id: WindowId = serde_json::from_value(payload).map_err(|e| {
                    ShellError::invalid_payload(cmd.channel(), format!("expected a window id: {e}"))
                })?;
                self.windows.close_window(id)?;
            }
        }
        Ok(())
    }

    fn create_child(&mut self, cmd: ShellCommand, payload: &Value) -> Result<WindowId> {
        let url = payload
            .as_str()
            .ok_or_else(|| ShellError::invalid_payload(cmd.channel(), "expected a URL string"))?;
        let parent = self
            .main_window
            .ok_or_else(|| ShellError::NoSession(cmd.channel().to_string()))?;
        self.windows
            .create_child_window(parent, url, &self.config.base_surface())
    }

    /// Run the handler off-loop. The result comes back as a reply event so
    /// the sender's liveness is checked when it lands.
    fn spawn_capability(
        &self,
        channel: String,
        handler: Handler,
        payload: Value,
        sender: Option<WindowId>,
    ) {
        let events = self.events_tx.clone();
        tokio::spawn(async move {
            match handler.call(payload).await {
                Ok(value) => {
                    if let Some(to) = sender {
                        let event = OutboundEvent::new(format!("{channel}:reply"), value);
                        let _ = events.send(ShellEvent::Reply { to, event });
                    }
                }
                Err(e) => warn!(channel = %channel, error = %e, "Capability call failed"),
            }
        });
    }

    /// One read per query, each dispatched to the store when it lands.
    fn issue_ready_queries(&self) {
        for query in ReadyQuery::ALL {
            let daemon = self.supervisor.daemon();
            let store = Arc::clone(&self.store);
            tokio::spawn(async move {
                let action = match read_query(daemon.as_ref(), query).await {
                    Ok(value) => query.action(value),
                    Err(e) => {
                        warn!(query = ?query, error = %e, "Daemon read failed");
                        query.failed(&e.to_string())
                    }
                };
                store.dispatch(action);
            });
        }
    }
}

async fn read_query(daemon: &dyn DaemonControl, query: ReadyQuery) -> Result<Value> {
    Ok(match query {
        ReadyQuery::PeerId => json!(daemon.peer_id().await?),
        ReadyQuery::GatewayAddress => json!(daemon.gateway_address().await?),
        ReadyQuery::ApiAddress => json!(daemon.api_address().await?),
        ReadyQuery::DatastorePath => json!(daemon.datastore_path().await?.to_string_lossy()),
        ReadyQuery::Log => json!(daemon.current_log().await?),
        ReadyQuery::Online => json!(daemon.is_online().await),
    })
}
