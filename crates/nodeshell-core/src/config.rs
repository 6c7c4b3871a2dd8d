// ABOUTME: Configuration for the shell: daemon process, window defaults, and inbound socket.
// ABOUTME: Loaded from TOML with defaults for every field.

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::daemon::ProcessDaemonConfig;
use crate::window::SurfaceOptions;

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ShellConfig {
    /// Unix socket accepting inbound messages as JSON lines.
    #[serde(default = "default_socket_path")]
    pub socket_path: String,

    #[serde(default)]
    pub daemon: DaemonSection,

    #[serde(default)]
    pub window: WindowSection,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct DaemonSection {
    /// Node binary (looked up on PATH when not absolute)
    #[serde(default = "default_binary")]
    pub binary: String,

    /// Arguments that start the long-running daemon
    #[serde(default = "default_args")]
    pub args: Vec<String>,

    /// Node repository directory (exported as IPFS_PATH)
    #[serde(default = "default_repo_path")]
    pub repo_path: String,

    /// Run `<binary> init` when the repo does not exist yet
    #[serde(default = "default_true")]
    pub init_if_missing: bool,

    /// API address used when the repo config names none
    #[serde(default = "default_api_address")]
    pub api_address: String,

    /// Gateway address used when the repo config names none
    #[serde(default = "default_gateway_address")]
    pub gateway_address: String,

    /// Fixed delay between health checks
    #[serde(default = "default_poll_interval_ms")]
    pub poll_interval_ms: u64,

    /// Per-check connect timeout
    #[serde(default = "default_health_timeout_ms")]
    pub health_timeout_ms: u64,

    /// Daemon output lines kept for `getLog`
    #[serde(default = "default_log_buffer_lines")]
    pub log_buffer_lines: usize,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct WindowSection {
    #[serde(default = "default_width")]
    pub width: u32,

    #[serde(default = "default_height")]
    pub height: u32,

    /// Page loaded into the main window
    #[serde(default = "default_start_page")]
    pub start_page: String,

    #[serde(default)]
    pub icon_path: Option<String>,

    /// Main window subscribes to daemon log lines
    #[serde(default = "default_true")]
    pub main_receives_logs: bool,

    /// Host draws its own close control on modal children
    #[serde(default = "default_native_modal_chrome")]
    pub native_modal_chrome: bool,

    /// Keep running after the last window closes
    #[serde(default = "default_keep_running")]
    pub keep_running_without_windows: bool,
}

fn default_socket_path() -> String {
    "/tmp/nodeshell.sock".to_string()
}

fn default_binary() -> String {
    "ipfs".to_string()
}

fn default_args() -> Vec<String> {
    vec!["daemon".to_string()]
}

fn default_repo_path() -> String {
    "~/.ipfs".to_string()
}

fn default_true() -> bool {
    true
}

fn default_api_address() -> String {
    "127.0.0.1:5001".to_string()
}

fn default_gateway_address() -> String {
    "127.0.0.1:8080".to_string()
}

fn default_poll_interval_ms() -> u64 {
    2000
}

fn default_health_timeout_ms() -> u64 {
    1000
}

fn default_log_buffer_lines() -> usize {
    500
}

fn default_width() -> u32 {
    1024
}

fn default_height() -> u32 {
    768
}

fn default_start_page() -> String {
    "file://./app/index.html".to_string()
}

// macOS sheets have no close button of their own.
fn default_native_modal_chrome() -> bool {
    !cfg!(target_os = "macos")
}

fn default_keep_running() -> bool {
    cfg!(target_os = "macos")
}

impl Default for ShellConfig {
    fn default() -> Self {
        Self {
            socket_path: default_socket_path(),
            daemon: DaemonSection::default(),
            window: WindowSection::default(),
        }
    }
}

impl Default for DaemonSection {
    fn default() -> Self {
        Self {
            binary: default_binary(),
            args: default_args(),
            repo_path: default_repo_path(),
            init_if_missing: true,
            api_address: default_api_address(),
            gateway_address: default_gateway_address(),
            poll_interval_ms: default_poll_interval_ms(),
            health_timeout_ms: default_health_timeout_ms(),
            log_buffer_lines: default_log_buffer_lines(),
        }
    }
}

impl Default for WindowSection {
    fn default() -> Self {
        Self {
            width: default_width(),
            height: default_height(),
            start_page: default_start_page(),
            icon_path: None,
            main_receives_logs: true,
            native_modal_chrome: default_native_modal_chrome(),
            keep_running_without_windows: default_keep_running(),
        }
    }
}

impl ShellConfig {
    /// Load config from a TOML file
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config from {}", path.display()))?;
        let config: ShellConfig = toml::from_str(&content)
            .with_context(|| format!("Failed to parse config from {}", path.display()))?;
        Ok(config)
    }

    /// Load config, or defaults if the file does not exist
    pub fn load_or_default(path: &Path) -> Result<Self> {
        if path.exists() {
            Self::load(path)
        } else {
            tracing::debug!(path = %path.display(), "No config file, using defaults");
            Ok(Self::default())
        }
    }

    /// Save config to a TOML file
    pub fn save(&self, path: &Path) -> Result<()> {
        let content = toml::to_string_pretty(self).context("Failed to serialize config")?;
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).with_context(|| {
                format!("Failed to create config directory {}", parent.display())
            })?;
        }
        std::fs::write(path, content)
            .with_context(|| format!("Failed to write config to {}", path.display()))?;
        Ok(())
    }

    /// Get the default config file path (~/.config/nodeshell/shell.toml)
    pub fn default_path() -> PathBuf {
        std::env::var("XDG_CONFIG_HOME")
            .map(PathBuf::from)
            .unwrap_or_else(|_| {
                dirs::home_dir()
                    .map(|h| h.join(".config"))
                    .unwrap_or_else(|| PathBuf::from("."))
            })
            .join("nodeshell")
            .join("shell.toml")
    }

    pub fn socket_path_expanded(&self) -> PathBuf {
        expand(&self.socket_path)
    }

    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.daemon.poll_interval_ms)
    }

    pub fn process_daemon(&self) -> ProcessDaemonConfig {
        ProcessDaemonConfig {
            binary: expand(&self.daemon.binary),
            args: self.daemon.args.clone(),
            repo_path: expand(&self.daemon.repo_path),
            init_if_missing: self.daemon.init_if_missing,
            api_address: self.daemon.api_address.clone(),
            gateway_address: self.daemon.gateway_address.clone(),
            health_timeout: Duration::from_millis(self.daemon.health_timeout_ms),
            log_buffer_lines: self.daemon.log_buffer_lines,
        }
    }

    /// Surface options shared by the main window and its children.
    pub fn base_surface(&self) -> SurfaceOptions {
        SurfaceOptions {
            width: self.window.width,
            height: self.window.height,
            icon: self.window.icon_path.as_deref().map(expand),
            ..SurfaceOptions::default()
        }
    }
}

/// Expand ~ in a configured path
fn expand(path: &str) -> PathBuf {
    shellexpand::tilde(path).into_owned().into()
}
