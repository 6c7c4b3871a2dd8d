// ABOUTME: In-process host for running the shell without a graphical UI.
// ABOUTME: Records window, tray, and store activity and can report lifecycle events back to the controller.

use std::collections::{BTreeMap, HashMap};
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, MutexGuard};

use serde_json::Value;
use tokio::sync::mpsc;
use tracing::info;

use crate::error::Result;
use crate::event::{EventSink, OutboundEvent, ShellEvent, WindowEvent};
use crate::store::Store;
use crate::tray::{TrayFactory, TrayIcon};
use crate::window::{SurfaceOptions, WindowFactory, WindowId, WindowSurface};

/// Observable state of one headless window.
#[derive(Debug, Clone, Default)]
pub struct HeadlessWindow {
    pub options: SurfaceOptions,
    pub visible: bool,
    pub url: Option<String>,
    pub loads: usize,
    pub close_requested: bool,
    pub close_controls: usize,
    pub listeners_removed: bool,
}

#[derive(Debug, Clone, Default)]
pub struct HeadlessTray {
    pub icon: Option<PathBuf>,
    pub highlighted: bool,
}

#[derive(Default)]
struct HostState {
    windows: BTreeMap<WindowId, HeadlessWindow>,
    outbound: HashMap<WindowId, mpsc::UnboundedReceiver<OutboundEvent>>,
    tray: Option<HeadlessTray>,
    trays_created: usize,
    actions: Vec<Value>,
}

/// Window, tray, and store host that keeps everything in memory.
///
/// Cloning shares the same state, so one host can serve as window factory,
/// tray factory, and store at once.
#[derive(Clone, Default)]
pub struct HeadlessHost {
    state: Arc<Mutex<HostState>>,
    events: Option<mpsc::UnboundedSender<ShellEvent>>,
    log_outbound: bool,
}

impl HeadlessHost {
    pub fn new() -> Self {
        Self::default()
    }

    /// Report window lifecycle events into the controller's inbox, the way a
    /// real UI host would.
    pub fn with_events(mut self, events: mpsc::UnboundedSender<ShellEvent>) -> Self {
        self.events = Some(events);
        self
    }

    /// Write outbound window events to the log instead of buffering them.
    /// Needs a running tokio runtime when windows are created.
    pub fn logging_outbound(mut self) -> Self {
        self.log_outbound = true;
        self
    }

    pub fn window(&self, id: WindowId) -> Option<HeadlessWindow> {
        self.lock().windows.get(&id).cloned()
    }

    pub fn window_count(&self) -> usize {
        self.lock().windows.len()
    }

    pub fn tray(&self) -> Option<HeadlessTray> {
        self.lock().tray.clone()
    }

    pub fn trays_created(&self) -> usize {
        self.lock().trays_created
    }

    pub fn actions(&self) -> Vec<Value> {
        self.lock().actions.clone()
    }

    /// Drain outbound events buffered for a window.
    pub fn take_events(&self, id: WindowId) -> Vec<OutboundEvent> {
        let mut state = self.lock();
        let mut drained = Vec::new();
        if let Some(rx) = state.outbound.get_mut(&id) {
            while let Ok(event) = rx.try_recv() {
                drained.push(event);
            }
        }
        drained
    }

    /// Simulate the page going away: the window's sink turns invalid.
    pub fn drop_page(&self, id: WindowId) {
        self.lock().outbound.remove(&id);
    }

    fn lock(&self) -> MutexGuard<'_, HostState> {
        self.state.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

impl WindowFactory for HeadlessHost {
    fn create(&mut self, id: WindowId, options: &SurfaceOptions) -> Result<Box<dyn WindowSurface>> {
        let (sink, rx) = EventSink::channel();
        {
            let mut state = self.lock();
            state.windows.insert(
                id,
                HeadlessWindow {
                    options: options.clone(),
                    visible: options.show,
                    ..Default::default()
                },
            );
            if self.log_outbound {
                tokio::spawn(log_outbound(id, rx));
            } else {
                state.outbound.insert(id, rx);
            }
        }
        info!(window_id = %id, width = options.width, height = options.height, modal = options.modal, "Headless window created");
        Ok(Box::new(HeadlessSurface {
            id,
            state: Arc::clone(&self.state),
            sink,
            events: self.events.clone(),
        }))
    }
}

impl TrayFactory for HeadlessHost {
    fn create(&mut self, icon: Option<&Path>) -> Result<Box<dyn TrayIcon>> {
        let mut state = self.lock();
        state.trays_created += 1;
        state.tray = Some(HeadlessTray {
            icon: icon.map(Path::to_path_buf),
            highlighted: false,
        });
        Ok(Box::new(HeadlessTrayIcon {
            state: Arc::clone(&self.state),
        }))
    }
}

impl Store for HeadlessHost {
    fn dispatch(&self, action: Value) {
        info!(action = %action, "Store dispatch");
        self.lock().actions.push(action);
    }
}

async fn log_outbound(id: WindowId, mut rx: mpsc::UnboundedReceiver<OutboundEvent>) {
    while let Some(event) = rx.recv().await {
        info!(window_id = %id, channel = %event.channel, payload = %event.payload, "Outbound event");
    }
}

struct HeadlessSurface {
    id: WindowId,
    state: Arc<Mutex<HostState>>,
    sink: EventSink,
    events: Option<mpsc::UnboundedSender<ShellEvent>>,
}

impl HeadlessSurface {
    fn update<R>(&self, f: impl FnOnce(&mut HeadlessWindow) -> R) -> Option<R> {
        let mut state = self.state.lock().unwrap_or_else(|poisoned| poisoned.into_inner());
        state.windows.get_mut(&self.id).map(f)
    }

    fn report(&self, event: WindowEvent) {
        if let Some(tx) = &self.events {
            let _ = tx.send(ShellEvent::Window { id: self.id, event });
        }
    }
}

impl WindowSurface for HeadlessSurface {
    fn load_url(&mut self, url: &str) {
        let loads = self.update(|w| {
            w.url = Some(url.to_string());
            w.loads += 1;
            w.loads
        });
        self.report(WindowEvent::DidFinishLoad);
        self.report(WindowEvent::DomReady);
        if loads == Some(1) {
            self.report(WindowEvent::ReadyToShow);
        }
    }

    fn show(&mut self) {
        let changed = self.update(|w| !std::mem::replace(&mut w.visible, true));
        if changed == Some(true) {
            self.report(WindowEvent::Shown);
        }
    }

    fn hide(&mut self) {
        let changed = self.update(|w| std::mem::replace(&mut w.visible, false));
        if changed == Some(true) {
            self.report(WindowEvent::Hidden);
        }
    }

    fn is_visible(&self) -> bool {
        self.update(|w| w.visible).unwrap_or(false)
    }

    fn close(&mut self) {
        self.update(|w| {
            w.close_requested = true;
            w.visible = false;
        });
        self.report(WindowEvent::Closed);
    }

    fn inject_close_affordance(&mut self) {
        self.update(|w| w.close_controls += 1);
    }

    fn remove_listeners(&mut self) {
        self.update(|w| w.listeners_removed = true);
        self.events = None;
    }

    fn sink(&self) -> EventSink {
        self.sink.clone()
    }
}

struct HeadlessTrayIcon {
    state: Arc<Mutex<HostState>>,
}

impl TrayIcon for HeadlessTrayIcon {
    fn set_highlighted(&mut self, highlighted: bool) {
        let mut state = self.state.lock().unwrap_or_else(|poisoned| poisoned.into_inner());
        if let Some(tray) = state.tray.as_mut() {
            tray.highlighted = highlighted;
        }
    }
}
