// ABOUTME: Tray icon singleton bound to the main window's visibility.
// ABOUTME: Clicks toggle the window; show/hide events drive the icon highlight.

use std::path::Path;

use tracing::debug;

use crate::error::Result;
use crate::event::WindowEvent;
use crate::window::{WindowId, WindowRegistry};

/// Host-drawn tray icon.
pub trait TrayIcon: Send {
    fn set_highlighted(&mut self, highlighted: bool);
}

/// Host-side tray constructor. Called at most once per process.
pub trait TrayFactory: Send {
    fn create(&mut self, icon: Option<&Path>) -> Result<Box<dyn TrayIcon>>;
}

pub struct TrayController {
    icon: Box<dyn TrayIcon>,
    bound: WindowId,
}

impl TrayController {
    pub fn new(icon: Box<dyn TrayIcon>, bound: WindowId, visible: bool) -> Self {
        let mut tray = Self { icon, bound };
        tray.icon.set_highlighted(visible);
        tray
    }

    pub fn bound(&self) -> WindowId {
        self.bound
    }

    /// Point the tray at a replacement main window.
    pub fn rebind(&mut self, id: WindowId, visible: bool) {
        self.bound = id;
        self.icon.set_highlighted(visible);
    }

    /// Toggle the bound window between shown and hidden.
    pub fn on_click(&mut self, windows: &mut WindowRegistry) -> Result<()> {
        if windows.is_visible(self.bound) {
            debug!(window_id = %self.bound, "Tray click hides main window");
            windows.hide_window(self.bound)
        } else {
            debug!(window_id = %self.bound, "Tray click shows main window");
            windows.show_window(self.bound)
        }
    }

    /// Mirror show/hide of the bound window. Other windows are ignored.
    pub fn on_window_event(&mut self, id: WindowId, event: WindowEvent) {
        if id != self.bound {
            return;
        }
        match event {
            WindowEvent::Shown => self.icon.set_highlighted(true),
            WindowEvent::Hidden => self.icon.set_highlighted(false),
            _ => {}
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::headless::HeadlessHost;
    use crate::window::WindowConfig;

    fn setup() -> (WindowRegistry, TrayController, WindowId, HeadlessHost) {
        let mut host = HeadlessHost::new();
        let mut windows = WindowRegistry::new(Box::new(host.clone()), true);
        let main = windows.create_window(WindowConfig::default()).unwrap();
        let icon = TrayFactory::create(&mut host, None).unwrap();
        let tray = TrayController::new(icon, main, windows.is_visible(main));
        (windows, tray, main, host)
    }

    #[test]
    fn test_click_toggles_bound_window() {
        let (mut windows, mut tray, main, _host) = setup();
        assert!(windows.is_visible(main));

        tray.on_click(&mut windows).unwrap();
        assert!(!windows.is_visible(main));

        tray.on_click(&mut windows).unwrap();
        assert!(windows.is_visible(main));
    }

    #[test]
    fn test_highlight_mirrors_bound_window() {
        let (_windows, mut tray, main, host) = setup();
        assert!(host.tray().unwrap().highlighted);

        tray.on_window_event(main, WindowEvent::Hidden);
        assert!(!host.tray().unwrap().highlighted);

        tray.on_window_event(main, WindowEvent::Shown);
        assert!(host.tray().unwrap().highlighted);
    }

    #[test]
    fn test_other_windows_do_not_touch_highlight() {
        let (_windows, mut tray, main, host) = setup();
        let other = WindowId::new(main.get() + 1);
        tray.on_window_event(other, WindowEvent::Hidden);
        assert!(host.tray().unwrap().highlighted);
    }

    #[test]
    fn test_click_after_main_window_closed_is_stale() {
        let (mut windows, mut tray, main, _host) = setup();
        windows.on_closed(main);
        let err = tray.on_click(&mut windows).unwrap_err();
        assert!(err.is_stale_reference());
    }
}
