// ABOUTME: Tracing setup for the nodeshell binary
// ABOUTME: Shell crates log at INFO, dependencies at WARN, to stderr or the data-dir log file

use std::path::PathBuf;
use tracing_subscriber::EnvFilter;

/// Default directives when `RUST_LOG` is unset. The `nodeshell` target prefix
/// also covers `nodeshell_core`, so controller and daemon events show at INFO
/// while dependencies stay at WARN. Daemon output lines are DEBUG; use
/// `RUST_LOG=nodeshell_core=debug` to see them.
pub const DEFAULT_DIRECTIVES: &str = "warn,nodeshell=info";

fn filter() -> EnvFilter {
    EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(DEFAULT_DIRECTIVES))
}

/// Log to stderr.
pub fn init() {
    tracing_subscriber::fmt().with_env_filter(filter()).init();
}

/// Log file used when the shell runs detached from a terminal.
/// `~/.local/share/nodeshell/nodeshell.log` on Linux.
pub fn log_file_path() -> Option<PathBuf> {
    Some(dirs::data_local_dir()?.join("nodeshell").join("nodeshell.log"))
}

/// Append to [`log_file_path`] with the same filter as [`init`].
///
/// Nothing is installed on error, so the caller can still fall back to
/// [`init`]. Returns the path being written.
pub fn init_file() -> Result<PathBuf, Box<dyn std::error::Error>> {
    let path = log_file_path().ok_or("no local data directory")?;
    if let Some(dir) = path.parent() {
        std::fs::create_dir_all(dir)?;
    }

    let log_file = std::fs::OpenOptions::new()
        .create(true)
        .append(true)
        .open(&path)?;

    tracing_subscriber::fmt()
        .with_writer(log_file)
        .with_env_filter(filter())
        .with_ansi(false)
        .try_init()
        .map_err(|e| -> Box<dyn std::error::Error> { e })?;

    Ok(path)
}
