// ABOUTME: Error types for nodeshell-core.
// ABOUTME: Covers daemon collaborator failures, stale window references, and bad inbound payloads.

use thiserror::Error;

use crate::window::WindowId;

#[derive(Error, Debug)]
pub enum ShellError {
    /// A window id that never existed or whose window has closed.
    #[error("window {0} not found")]
    WindowNotFound(WindowId),

    /// A session command arrived before any main window existed.
    #[error("no main window session for channel '{0}'")]
    NoSession(String),

    /// Inbound channel with no route in the command table.
    #[error("no route for channel '{0}'")]
    UnknownChannel(String),

    /// Inbound payload did not have the shape the route expects.
    #[error("invalid payload for '{channel}': {reason}")]
    InvalidPayload { channel: String, reason: String },

    /// The daemon process could not be launched or signalled.
    #[error("daemon error: {0}")]
    Daemon(String),

    /// A read from the daemon failed.
    #[error("daemon query '{query}' failed: {reason}")]
    DaemonQuery { query: String, reason: String },

    /// Host integration (tray, socket, protocol handler) failed.
    #[error("integration '{name}' unavailable: {reason}")]
    Integration { name: String, reason: String },

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

impl ShellError {
    pub fn invalid_payload(channel: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::InvalidPayload {
            channel: channel.into(),
            reason: reason.into(),
        }
    }

    pub fn query(query: impl Into<String>, reason: impl std::fmt::Display) -> Self {
        Self::DaemonQuery {
            query: query.into(),
            reason: reason.to_string(),
        }
    }

    /// Stale references are expected traffic, not faults.
    pub fn is_stale_reference(&self) -> bool {
        matches!(self, Self::WindowNotFound(_))
    }
}

pub type Result<T> = std::result::Result<T, ShellError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = ShellError::WindowNotFound(WindowId::new(7));
        assert_eq!(err.to_string(), "window 7 not found");

        let err = ShellError::invalid_payload("closePage", "expected a window id");
        assert_eq!(
            err.to_string(),
            "invalid payload for 'closePage': expected a window id"
        );

        let err = ShellError::query("getPeerId", "exit status 1");
        assert!(err.to_string().contains("getPeerId"));
        assert!(err.to_string().contains("exit status 1"));
    }

    #[test]
    fn test_only_missing_windows_are_stale() {
        assert!(ShellError::WindowNotFound(WindowId::new(1)).is_stale_reference());
        assert!(!ShellError::UnknownChannel("x".into()).is_stale_reference());
        assert!(!ShellError::Daemon("boom".into()).is_stale_reference());
    }

    #[test]
    fn test_from_io_error() {
        let io = std::io::Error::new(std::io::ErrorKind::NotFound, "no such file");
        let err: ShellError = io.into();
        assert!(matches!(err, ShellError::Io(_)));
    }
}
