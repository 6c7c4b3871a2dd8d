// ABOUTME: Window registry: creates, tracks, and tears down host windows.
// ABOUTME: Owns the log subscriber set so close handling clears both in one step.

use std::collections::BTreeMap;
use std::fmt;
use std::path::PathBuf;

use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::error::{Result, ShellError};
use crate::event::{EventSink, WindowEvent};
use crate::fanout::LogFanout;

/// Registry-assigned window identifier. Never reused within a registry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct WindowId(u32);

impl WindowId {
    pub fn new(raw: u32) -> Self {
        Self(raw)
    }

    pub fn get(self) -> u32 {
        self.0
    }
}

impl fmt::Display for WindowId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Placement and appearance handed to the host's window constructor.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SurfaceOptions {
    pub width: u32,
    pub height: u32,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub icon: Option<PathBuf>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub parent: Option<WindowId>,
    #[serde(default)]
    pub modal: bool,
    #[serde(default = "default_show")]
    pub show: bool,
}

fn default_show() -> bool {
    true
}

impl Default for SurfaceOptions {
    fn default() -> Self {
        Self {
            width: 800,
            height: 600,
            icon: None,
            parent: None,
            modal: false,
            show: true,
        }
    }
}

/// Options accepted by [`WindowRegistry::create_window`].
///
/// `has_ipfs_logging` is consumed by the registry; only `surface` reaches
/// the host.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct WindowConfig {
    #[serde(flatten)]
    pub surface: SurfaceOptions,
    #[serde(rename = "hasIpfsLogging", default)]
    pub has_ipfs_logging: bool,
}

impl WindowConfig {
    pub fn new(surface: SurfaceOptions) -> Self {
        Self {
            surface,
            has_ipfs_logging: false,
        }
    }

    pub fn with_logging(mut self) -> Self {
        self.has_ipfs_logging = true;
        self
    }
}

/// A native window owned by the host UI layer.
pub trait WindowSurface: Send {
    fn load_url(&mut self, url: &str);

    fn show(&mut self);

    fn hide(&mut self);

    fn is_visible(&self) -> bool;

    /// Ask the host to close the window. The host answers with
    /// [`WindowEvent::Closed`].
    fn close(&mut self);

    /// Add an in-page control that requests `closePage` for this window.
    fn inject_close_affordance(&mut self);

    /// Drop every event binding the host holds for this window.
    fn remove_listeners(&mut self);

    /// Capability for pushing outbound events into the page.
    fn sink(&self) -> EventSink;
}

/// Host-side window constructor.
pub trait WindowFactory: Send {
    fn create(&mut self, id: WindowId, options: &SurfaceOptions) -> Result<Box<dyn WindowSurface>>;
}

/// Progress of a modal child towards its injected close control.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CloseAffordance {
    /// The host draws its own modal chrome.
    NotNeeded,
    AwaitingLoad,
    AwaitingReady,
    Injected,
}

impl CloseAffordance {
    /// Feed one page event. Returns true exactly once: when the control
    /// should be injected.
    fn advance(&mut self, event: WindowEvent) -> bool {
        match (*self, event) {
            (CloseAffordance::AwaitingLoad, WindowEvent::DidFinishLoad) => {
                *self = CloseAffordance::AwaitingReady;
                false
            }
            (CloseAffordance::AwaitingReady, WindowEvent::DomReady) => {
                *self = CloseAffordance::Injected;
                true
            }
            _ => false,
        }
    }
}

pub struct WindowRecord {
    id: WindowId,
    surface: Box<dyn WindowSurface>,
    parent: Option<WindowId>,
    is_log_subscriber: bool,
    affordance: CloseAffordance,
}

impl WindowRecord {
    pub fn id(&self) -> WindowId {
        self.id
    }

    pub fn parent(&self) -> Option<WindowId> {
        self.parent
    }

    pub fn is_log_subscriber(&self) -> bool {
        self.is_log_subscriber
    }

    pub fn affordance(&self) -> CloseAffordance {
        self.affordance
    }

    pub fn is_visible(&self) -> bool {
        self.surface.is_visible()
    }
}

impl fmt::Debug for WindowRecord {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("WindowRecord")
            .field("id", &self.id)
            .field("parent", &self.parent)
            .field("is_log_subscriber", &self.is_log_subscriber)
            .field("affordance", &self.affordance)
            .finish_non_exhaustive()
    }
}

/// Live windows by id. Closed windows keep their key with an empty slot.
pub struct WindowRegistry {
    factory: Box<dyn WindowFactory>,
    slots: BTreeMap<WindowId, Option<WindowRecord>>,
    next_id: u32,
    fanout: LogFanout,
    native_modal_chrome: bool,
}

impl WindowRegistry {
    pub fn new(factory: Box<dyn WindowFactory>, native_modal_chrome: bool) -> Self {
        Self {
            factory,
            slots: BTreeMap::new(),
            next_id: 1,
            fanout: LogFanout::new(),
            native_modal_chrome,
        }
    }

    /// Create a window. Logging windows join the subscriber set before this returns.
    pub fn create_window(&mut self, config: WindowConfig) -> Result<WindowId> {
        let WindowConfig {
            surface: options,
            has_ipfs_logging,
        } = config;

        let id = WindowId(self.next_id);
        let surface = self.factory.create(id, &options)?;
        self.next_id += 1;

        if has_ipfs_logging {
            self.fanout.subscribe(id, surface.sink());
        }

        let affordance = if options.modal && options.parent.is_some() && !self.native_modal_chrome
        {
            CloseAffordance::AwaitingLoad
        } else {
            CloseAffordance::NotNeeded
        };

        self.slots.insert(
            id,
            Some(WindowRecord {
                id,
                surface,
                parent: options.parent,
                is_log_subscriber: has_ipfs_logging,
                affordance,
            }),
        );
        info!(window_id = %id, parent = ?options.parent, logging = has_ipfs_logging, "Window created");
        Ok(id)
    }

    /// Create a hidden modal child of `parent` and load `url` into it.
    pub fn create_child_window(&mut self, parent: WindowId, url: &str, base: &SurfaceOptions) -> Result<WindowId> {
        if self.get(parent).is_none() {
            return Err(ShellError::WindowNotFound(parent));
        }
        let options = SurfaceOptions {
            parent: Some(parent),
            modal: true,
            show: false,
            ..base.clone()
        };
        let id = self.create_window(WindowConfig::new(options))?;
        self.surface_mut(id)?.load_url(url);
        debug!(window_id = %id, parent = %parent, url, "Child window loading");
        Ok(id)
    }

    pub fn load_url(&mut self, id: WindowId, url: &str) -> Result<()> {
        self.surface_mut(id)?.load_url(url);
        Ok(())
    }

    pub fn show_window(&mut self, id: WindowId) -> Result<()> {
        self.surface_mut(id)?.show();
        Ok(())
    }

    pub fn hide_window(&mut self, id: WindowId) -> Result<()> {
        self.surface_mut(id)?.hide();
        Ok(())
    }

    /// Request close of a live window. Unknown or closed ids change nothing.
    pub fn close_window(&mut self, id: WindowId) -> Result<()> {
        self.surface_mut(id)?.close();
        debug!(window_id = %id, "Close requested");
        Ok(())
    }

    /// Close handling: detach listeners, leave the subscriber set, empty the slot.
    ///
    /// Returns false if the window was already gone.
    pub fn on_closed(&mut self, id: WindowId) -> bool {
        let Some(mut record) = self.slots.get_mut(&id).and_then(Option::take) else {
            return false;
        };
        record.surface.remove_listeners();
        self.fanout.unsubscribe(id);
        info!(window_id = %id, "Window closed");
        true
    }

    /// Route a page event to the child close-control sequence.
    ///
    /// Returns true when the control was injected by this event.
    pub fn on_page_event(&mut self, id: WindowId, event: WindowEvent) -> bool {
        let Some(record) = self.slots.get_mut(&id).and_then(Option::as_mut) else {
            return false;
        };
        if !record.affordance.advance(event) {
            return false;
        }
        record.surface.inject_close_affordance();
        debug!(window_id = %id, "Close control injected");
        true
    }

    pub fn get(&self, id: WindowId) -> Option<&WindowRecord> {
        self.slots.get(&id).and_then(Option::as_ref)
    }

    pub fn is_live(&self, id: WindowId) -> bool {
        self.get(id).is_some()
    }

    pub fn is_visible(&self, id: WindowId) -> bool {
        self.get(id).is_some_and(WindowRecord::is_visible)
    }

    pub fn sink(&self, id: WindowId) -> Option<EventSink> {
        self.get(id).map(|record| record.surface.sink())
    }

    pub fn has_windows(&self) -> bool {
        self.slots.values().any(Option::is_some)
    }

    pub fn live_ids(&self) -> impl Iterator<Item = WindowId> + '_ {
        self.slots
            .iter()
            .filter(|(_, slot)| slot.is_some())
            .map(|(id, _)| *id)
    }

    /// Number of ids ever handed out, live or closed.
    pub fn issued(&self) -> usize {
        self.slots.len()
    }

    pub fn fanout(&self) -> &LogFanout {
        &self.fanout
    }

    /// Deliver a daemon log line to every subscribed window.
    pub fn publish_log(&self, line: &str) -> usize {
        self.fanout.publish(line)
    }

    fn surface_mut(&mut self, id: WindowId) -> Result<&mut Box<dyn WindowSurface>> {
        self.slots
            .get_mut(&id)
            .and_then(Option::as_mut)
            .map(|record| &mut record.surface)
            .ok_or(ShellError::WindowNotFound(id))
    }
}
