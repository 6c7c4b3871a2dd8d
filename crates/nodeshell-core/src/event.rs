// ABOUTME: Messages crossing the boundary between the shell core and the UI host.
// ABOUTME: Inbound messages, host lifecycle events, and outbound window events with their sinks.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use tokio::sync::mpsc;

use crate::window::WindowId;

/// Outbound channel carrying daemon log lines to subscribed windows.
pub const LOG_EVENT_CHANNEL: &str = "ipfs:logging";

/// A named one-way message from the UI layer into the core.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct InboundMessage {
    pub channel: String,
    #[serde(default)]
    pub payload: Value,
    /// Window that sent the message, when the host knows it.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sender: Option<WindowId>,
}

impl InboundMessage {
    pub fn new(channel: impl Into<String>, payload: Value) -> Self {
        Self {
            channel: channel.into(),
            payload,
            sender: None,
        }
    }

    pub fn from_window(mut self, sender: WindowId) -> Self {
        self.sender = Some(sender);
        self
    }
}

/// An event pushed from the core to one window.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OutboundEvent {
    pub channel: String,
    pub payload: Value,
}

impl OutboundEvent {
    pub fn new(channel: impl Into<String>, payload: Value) -> Self {
        Self {
            channel: channel.into(),
            payload,
        }
    }

    pub fn log_line(line: &str) -> Self {
        Self::new(LOG_EVENT_CHANNEL, Value::String(line.to_string()))
    }
}

/// Capability to push events into one window.
///
/// The host keeps the receiving half. Once the host drops it the sink turns
/// invalid and every send is a silent no-op.
#[derive(Debug, Clone)]
pub struct EventSink {
    tx: mpsc::UnboundedSender<OutboundEvent>,
}

impl EventSink {
    pub fn channel() -> (Self, mpsc::UnboundedReceiver<OutboundEvent>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (Self { tx }, rx)
    }

    pub fn is_valid(&self) -> bool {
        !self.tx.is_closed()
    }

    /// Returns false when the receiving window is gone.
    pub fn send(&self, event: OutboundEvent) -> bool {
        self.tx.send(event).is_ok()
    }
}

/// Lifecycle signals the host reports for a window.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WindowEvent {
    /// First paint is ready; the window may be shown without flicker.
    ReadyToShow,
    /// A page navigation finished loading.
    DidFinishLoad,
    /// The page's initial content is ready.
    DomReady,
    Shown,
    Hidden,
    Closed,
}

/// Everything the controller loop consumes.
#[derive(Debug, Clone, PartialEq)]
pub enum ShellEvent {
    Inbound(InboundMessage),
    Window { id: WindowId, event: WindowEvent },
    TrayClicked,
    /// One line of daemon output.
    DaemonLog(String),
    /// The health poll saw the daemon online.
    DaemonReady,
    /// A capability result for the window that asked for it.
    Reply { to: WindowId, event: OutboundEvent },
    /// App re-activated (dock click on macOS).
    Activate { has_visible_windows: bool },
    AllWindowsClosed,
    Quit,
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_inbound_message_parses_without_sender() {
        let msg: InboundMessage =
            serde_json::from_str(r#"{"channel":"closePage","payload":3}"#).unwrap();
        assert_eq!(msg.channel, "closePage");
        assert_eq!(msg.payload, json!(3));
        assert_eq!(msg.sender, None);
    }

    #[test]
    fn test_inbound_message_defaults_payload_to_null() {
        let msg: InboundMessage = serde_json::from_str(r#"{"channel":"showChildWindow"}"#).unwrap();
        assert_eq!(msg.payload, Value::Null);
    }

    #[test]
    fn test_sink_invalid_after_receiver_dropped() {
        let (sink, rx) = EventSink::channel();
        assert!(sink.is_valid());
        assert!(sink.send(OutboundEvent::log_line("hello")));
        drop(rx);
        assert!(!sink.is_valid());
        assert!(!sink.send(OutboundEvent::log_line("lost")));
    }

    #[test]
    fn test_log_line_uses_logging_channel() {
        let event = OutboundEvent::log_line("Daemon is ready");
        assert_eq!(event.channel, LOG_EVENT_CHANNEL);
        assert_eq!(event.payload, json!("Daemon is ready"));
    }
}
