// ABOUTME: nodeshell binary entry point.
// ABOUTME: Loads config, sets up logging, and runs the shell controller until quit.

mod socket;

use anyhow::Result;
use clap::Parser;
use nodeshell_core::{
    HeadlessHost, ProcessDaemon, ShellConfig, ShellController, ShellEvent, ShellParts,
};
use std::path::PathBuf;
use std::sync::Arc;
use tokio::sync::mpsc;
use tracing::{error, info, warn};

#[derive(Parser)]
#[command(name = "nodeshell")]
#[command(about = "Desktop control plane for a local IPFS node")]
struct Cli {
    /// Load configuration from a file (default: ~/.config/nodeshell/shell.toml)
    #[arg(long, env = "NODESHELL_CONFIG")]
    config: Option<PathBuf>,

    /// Inbound message socket (overrides socket_path from the config)
    #[arg(long)]
    socket: Option<PathBuf>,

    /// Log to nodeshell.log under the local data directory instead of stderr
    #[arg(long)]
    log_file: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let log_file = if cli.log_file {
        match nodeshell_log::init_file() {
            Ok(path) => Some(path),
            Err(e) => {
                nodeshell_log::init();
                warn!(error = %e, "File logging unavailable, logging to stderr");
                None
            }
        }
    } else {
        nodeshell_log::init();
        None
    };

    let config_path = cli.config.unwrap_or_else(ShellConfig::default_path);
    let config = ShellConfig::load_or_default(&config_path)?;
    let socket_path = cli
        .socket
        .unwrap_or_else(|| config.socket_path_expanded());
    info!(
        config = %config_path.display(),
        log_file = ?log_file,
        "nodeshell starting"
    );

    let (events_tx, events_rx) = mpsc::unbounded_channel();
    let host = HeadlessHost::new()
        .with_events(events_tx.clone())
        .logging_outbound();
    let daemon = Arc::new(ProcessDaemon::new(config.process_daemon()).with_events(events_tx.clone()));
    info!(
        binary = %daemon.config().binary.display(),
        repo = %daemon.config().repo_path.display(),
        "Supervising IPFS daemon"
    );

    let controller = ShellController::new(
        config,
        ShellParts {
            daemon: daemon.clone(),
            window_factory: Box::new(host.clone()),
            tray_factory: Box::new(host.clone()),
            store: Arc::new(host),
            sleeper: None,
        },
        events_tx.clone(),
        events_rx,
    );

    match socket::bind(&socket_path) {
        Ok(listener) => {
            let events = events_tx.clone();
            tokio::spawn(async move {
                if let Err(e) = socket::serve(listener, events).await {
                    error!(error = %e, "Socket server stopped");
                }
            });
        }
        Err(e) => warn!(error = %e, "Inbound socket unavailable, continuing without it"),
    }

    tokio::spawn(forward_shutdown_signals(events_tx));

    controller.run().await;

    if let Err(e) = daemon.stop_and_wait().await {
        warn!(error = %e, "Daemon did not stop cleanly");
    }
    let _ = std::fs::remove_file(&socket_path);
    info!("nodeshell stopped");
    Ok(())
}

/// Turn Ctrl+C and SIGTERM into a quit event for the controller loop.
async fn forward_shutdown_signals(events: mpsc::UnboundedSender<ShellEvent>) {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            warn!(error = %e, "Failed to install Ctrl+C handler");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(e) => {
                warn!(error = %e, "Failed to install signal handler");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => info!("Received Ctrl+C, shutting down"),
        _ = terminate => info!("Received terminate signal, shutting down"),
    }
    let _ = events.send(ShellEvent::Quit);
}
