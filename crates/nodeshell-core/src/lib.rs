// ABOUTME: Core library for nodeshell - the desktop control plane around a local IPFS node
// ABOUTME: Shared between the nodeshell binary and host integrations

pub mod commands;
pub mod config;
pub mod controller;
pub mod daemon;
pub mod error;
pub mod event;
pub mod fanout;
pub mod headless;
pub mod store;
pub mod tray;
pub mod window;

pub use commands::{CapabilityMap, CommandTable, Handler, Route, ShellCommand};
pub use config::ShellConfig;
pub use controller::{Flow, ShellController, ShellParts};
pub use daemon::{DaemonControl, DaemonState, DaemonSupervisor, ProcessDaemon};
pub use error::{Result, ShellError};
pub use event::{EventSink, InboundMessage, OutboundEvent, ShellEvent, WindowEvent, LOG_EVENT_CHANNEL};
pub use fanout::LogFanout;
pub use headless::HeadlessHost;
pub use store::{ReadyQuery, Store};
pub use tray::{TrayController, TrayFactory, TrayIcon};
pub use window::{SurfaceOptions, WindowConfig, WindowFactory, WindowId, WindowRegistry, WindowSurface};
