// ABOUTME: Integration tests for nodeshell-core.
// ABOUTME: Drives the controller end to end against the headless host and a scripted daemon.

use std::collections::HashSet;
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use nodeshell_core::{
    DaemonControl, DaemonState, Flow, HeadlessHost, InboundMessage, ReadyQuery, Result,
    ShellConfig, ShellController, ShellEvent, ShellParts, WindowId, LOG_EVENT_CHANNEL,
};
use serde_json::{json, Value};
use tokio::sync::mpsc;

#[derive(Default)]
struct FakeDaemon {
    starts: AtomicUsize,
    stops: AtomicUsize,
    offline: AtomicBool,
}

#[async_trait]
impl DaemonControl for FakeDaemon {
    async fn start(&self) -> Result<()> {
        self.starts.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    async fn stop(&self) -> Result<()> {
        self.stops.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    async fn is_online(&self) -> bool {
        !self.offline.load(Ordering::SeqCst)
    }

    async fn peer_id(&self) -> Result<String> {
        Ok("12D3KooWIntegrationPeer".to_string())
    }

    async fn gateway_address(&self) -> Result<String> {
        Ok("127.0.0.1:8080".to_string())
    }

    async fn api_address(&self) -> Result<String> {
        Ok("127.0.0.1:5001".to_string())
    }

    async fn datastore_path(&self) -> Result<PathBuf> {
        Ok(PathBuf::from("/tmp/ipfs-repo"))
    }

    async fn current_log(&self) -> Result<Vec<String>> {
        Ok(vec!["Daemon is ready".to_string()])
    }
}

fn test_config() -> ShellConfig {
    let mut config = ShellConfig::default();
    config.window.native_modal_chrome = false;
    config.window.keep_running_without_windows = false;
    config
}

fn shell(config: ShellConfig) -> (ShellController, HeadlessHost, Arc<FakeDaemon>) {
    let (tx, rx) = mpsc::unbounded_channel();
    let host = HeadlessHost::new().with_events(tx.clone());
    let daemon = Arc::new(FakeDaemon::default());
    let parts = ShellParts {
        daemon: daemon.clone(),
        window_factory: Box::new(host.clone()),
        tray_factory: Box::new(host.clone()),
        store: Arc::new(host.clone()),
        sleeper: None,
    };
    (ShellController::new(config, parts, tx, rx), host, daemon)
}

/// Let spawned tasks run and handle whatever they queued.
async fn settle(ctl: &mut ShellController) -> Flow {
    let mut flow = Flow::Continue;
    for _ in 0..32 {
        tokio::task::yield_now().await;
        if ctl.drain() == Flow::Quit {
            flow = Flow::Quit;
        }
    }
    flow
}

fn inbound(channel: &str, payload: Value) -> ShellEvent {
    ShellEvent::Inbound(InboundMessage::new(channel, payload))
}

fn started(config: ShellConfig) -> (ShellController, HeadlessHost, Arc<FakeDaemon>, WindowId) {
    let (mut ctl, host, daemon) = shell(config);
    ctl.startup();
    let main = ctl.main_window().expect("main window");
    ctl.drain();
    (ctl, host, daemon, main)
}

#[tokio::test]
async fn test_main_window_shown_after_first_paint() {
    let (mut ctl, host, _daemon) = shell(test_config());
    ctl.startup();
    let main = ctl.main_window().unwrap();

    let window = host.window(main).unwrap();
    assert!(!window.visible);
    assert_eq!(window.url.as_deref(), Some("file://./app/index.html"));
    assert!(window.options.parent.is_none());

    ctl.drain();
    assert!(host.window(main).unwrap().visible);
    assert_eq!(host.trays_created(), 1);
    assert!(host.tray().unwrap().highlighted);
    assert_eq!(ctl.tray_window(), Some(main));
}

#[tokio::test]
async fn test_daemon_ready_dispatches_every_read() {
    let (mut ctl, host, daemon, _main) = started(test_config());
    settle(&mut ctl).await;

    assert_eq!(ctl.daemon_state(), DaemonState::Online);
    assert_eq!(daemon.starts.load(Ordering::SeqCst), 1);

    let actions = host.actions();
    let types: HashSet<_> = actions
        .iter()
        .filter_map(|a| a["type"].as_str().map(str::to_string))
        .collect();
    let expected: HashSet<_> = ReadyQuery::ALL
        .iter()
        .map(|q| q.action_type().to_string())
        .collect();
    assert_eq!(actions.len(), 6);
    assert_eq!(types, expected);

    let peer = actions.iter().find(|a| a["type"] == "IPFS_PEER_ID").unwrap();
    assert_eq!(peer["payload"], "12D3KooWIntegrationPeer");
    let online = actions.iter().find(|a| a["type"] == "IPFS_ONLINE").unwrap();
    assert_eq!(online["payload"], true);
    let path = actions.iter().find(|a| a["type"] == "IPFS_DATASTORE_PATH").unwrap();
    assert_eq!(path["payload"], "/tmp/ipfs-repo");
}

#[tokio::test]
async fn test_hidden_child_shown_without_second_create() {
    let (mut ctl, host, _daemon, main) = started(test_config());

    ctl.handle_event(inbound("createChildWindow", json!("file://./app/settings.html")));
    let child = ctl.settings_window().unwrap();
    let window = host.window(child).unwrap();
    assert!(!window.visible);
    assert!(window.options.modal);
    assert_eq!(window.options.parent, Some(main));
    assert_eq!(window.url.as_deref(), Some("file://./app/settings.html"));

    ctl.drain();
    assert_eq!(host.window(child).unwrap().close_controls, 1);

    ctl.handle_event(inbound("showChildWindow", Value::Null));
    ctl.drain();
    assert!(host.window(child).unwrap().visible);
    assert_eq!(host.window_count(), 2);
    assert_eq!(ctl.windows().issued(), 2);
    // main stays visible; the child sits on top of it
    assert!(host.window(main).unwrap().visible);
}

#[tokio::test]
async fn test_create_and_show_child() {
    let (mut ctl, host, _daemon, main) = started(test_config());

    ctl.handle_event(inbound("createAndShowChildWindow", json!("file://./app/about.html")));
    ctl.drain();

    let child = WindowId::new(2);
    let window = host.window(child).unwrap();
    assert!(window.visible);
    assert_eq!(window.options.parent, Some(main));
    assert_eq!(window.close_controls, 1);
    assert!(ctl.settings_window().is_none());
}

#[tokio::test]
async fn test_native_modal_chrome_skips_close_control() {
    let mut config = test_config();
    config.window.native_modal_chrome = true;
    let (mut ctl, host, _daemon, _main) = started(config);

    ctl.handle_event(inbound("createAndShowChildWindow", json!("file://./app/about.html")));
    ctl.drain();
    assert_eq!(host.window(WindowId::new(2)).unwrap().close_controls, 0);
}

#[tokio::test]
async fn test_close_page_with_unknown_id_changes_nothing() {
    let (mut ctl, host, _daemon, main) = started(test_config());
    let before: Vec<_> = ctl.windows().live_ids().collect();

    assert_eq!(ctl.handle_event(inbound("closePage", json!(99))), Flow::Continue);
    assert_eq!(ctl.handle_event(inbound("closePage", json!("not-an-id"))), Flow::Continue);
    assert_eq!(ctl.drain(), Flow::Continue);

    assert_eq!(ctl.windows().live_ids().collect::<Vec<_>>(), before);
    assert!(!host.window(main).unwrap().close_requested);
}

#[tokio::test]
async fn test_closed_ids_are_never_reused() {
    let (mut ctl, host, _daemon, main) = started(test_config());

    ctl.handle_event(inbound("createChildWindow", json!("file://./app/settings.html")));
    let child = ctl.settings_window().unwrap();
    ctl.drain();

    ctl.handle_event(inbound("closePage", json!(child.get())));
    ctl.drain();
    assert!(!ctl.windows().is_live(child));
    assert!(ctl.windows().is_live(main));
    assert!(ctl.settings_window().is_none());
    assert!(host.window(child).unwrap().listeners_removed);

    // the child is gone, so showing it is a no-op
    ctl.handle_event(inbound("showChildWindow", Value::Null));

    ctl.handle_event(inbound("createChildWindow", json!("file://./app/settings.html")));
    assert_eq!(ctl.settings_window(), Some(WindowId::new(3)));
    assert_eq!(ctl.windows().issued(), 3);
}

#[tokio::test]
async fn test_log_lines_reach_logging_windows_until_closed() {
    let mut config = test_config();
    config.window.keep_running_without_windows = true;
    let (mut ctl, host, _daemon, main) = started(config);

    ctl.handle_event(inbound("createAndShowChildWindow", json!("file://./app/about.html")));
    let child = WindowId::new(2);
    ctl.drain();
    host.take_events(main);

    ctl.handle_event(ShellEvent::DaemonLog("Swarm listening on /ip4/0.0.0.0/tcp/4001".into()));
    let main_events = host.take_events(main);
    assert_eq!(main_events.len(), 1);
    assert_eq!(main_events[0].channel, LOG_EVENT_CHANNEL);
    assert_eq!(main_events[0].payload, "Swarm listening on /ip4/0.0.0.0/tcp/4001");
    assert!(host.take_events(child).is_empty());

    ctl.handle_event(inbound("closePage", json!(main.get())));
    ctl.drain();
    ctl.handle_event(ShellEvent::DaemonLog("API server listening".into()));
    assert!(host.take_events(main).is_empty());
    assert!(ctl.windows().fanout().is_empty());
}

#[tokio::test]
async fn test_dropped_page_is_skipped() {
    let (mut ctl, host, _daemon, main) = started(test_config());
    host.drop_page(main);
    // no panic, no delivery
    ctl.handle_event(ShellEvent::DaemonLog("Daemon is ready".into()));
    assert!(ctl.windows().is_live(main));
}

#[tokio::test]
async fn test_redux_action_forwarded_without_session() {
    let (mut ctl, host, _daemon) = shell(test_config());

    ctl.handle_event(inbound("redux-action", json!({"type": "SET_THEME", "payload": "dark"})));
    ctl.handle_event(inbound("createChildWindow", json!("file://./app/settings.html")));

    assert_eq!(host.actions(), vec![json!({"type": "SET_THEME", "payload": "dark"})]);
    assert_eq!(host.window_count(), 0);
}

#[tokio::test]
async fn test_capability_reply_goes_to_sender() {
    let (mut ctl, host, _daemon, main) = started(test_config());
    settle(&mut ctl).await;
    host.take_events(main);

    ctl.handle_event(ShellEvent::Inbound(
        InboundMessage::new("ipfs:getPeerId", Value::Null).from_window(main),
    ));
    settle(&mut ctl).await;

    let replies: Vec<_> = host
        .take_events(main)
        .into_iter()
        .filter(|e| e.channel == "ipfs:getPeerId:reply")
        .collect();
    assert_eq!(replies.len(), 1);
    assert_eq!(replies[0].payload, "12D3KooWIntegrationPeer");
}

#[tokio::test]
async fn test_reply_for_closed_window_is_dropped() {
    let (mut ctl, host, _daemon, _main) = started(test_config());
    settle(&mut ctl).await;

    ctl.handle_event(inbound("createAndShowChildWindow", json!("file://./app/about.html")));
    let child = WindowId::new(2);
    ctl.drain();

    ctl.handle_event(ShellEvent::Inbound(
        InboundMessage::new("ipfs:getApiAddress", Value::Null).from_window(child),
    ));
    ctl.handle_event(inbound("closePage", json!(child.get())));
    ctl.drain();
    settle(&mut ctl).await;

    assert!(!ctl.windows().is_live(child));
    assert!(host
        .take_events(child)
        .iter()
        .all(|e| e.channel != "ipfs:getApiAddress:reply"));
}

#[tokio::test(start_paused = true)]
async fn test_restart_before_online_dispatches_reads_once() {
    let (mut ctl, host, daemon) = shell(test_config());
    daemon.offline.store(true, Ordering::SeqCst);
    ctl.startup();
    settle(&mut ctl).await;

    ctl.handle_event(inbound("ipfs:stop", Value::Null));
    settle(&mut ctl).await;
    ctl.handle_event(inbound("ipfs:start", Value::Null));
    settle(&mut ctl).await;
    assert_eq!(ctl.daemon_state(), DaemonState::Polling);

    daemon.offline.store(false, Ordering::SeqCst);
    tokio::time::sleep(Duration::from_millis(4500)).await;
    settle(&mut ctl).await;

    assert_eq!(ctl.daemon_state(), DaemonState::Online);
    let peer_reads = host
        .actions()
        .iter()
        .filter(|a| a["type"] == "IPFS_PEER_ID")
        .count();
    assert_eq!(peer_reads, 1);
    assert_eq!(host.actions().len(), 6);
}

#[tokio::test]
async fn test_ui_start_while_online_does_not_relaunch() {
    let (mut ctl, _host, daemon, _main) = started(test_config());
    settle(&mut ctl).await;

    ctl.handle_event(inbound("ipfs:start", Value::Null));
    settle(&mut ctl).await;
    assert_eq!(daemon.starts.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn test_unknown_channel_is_ignored() {
    let (mut ctl, host, _daemon, _main) = started(test_config());
    assert_eq!(ctl.handle_event(inbound("openDevTools", Value::Null)), Flow::Continue);
    assert_eq!(host.window_count(), 1);
}

#[tokio::test]
async fn test_tray_click_toggles_main_window() {
    let (mut ctl, host, _daemon, main) = started(test_config());

    ctl.handle_event(ShellEvent::TrayClicked);
    ctl.drain();
    assert!(!host.window(main).unwrap().visible);
    assert!(!host.tray().unwrap().highlighted);

    ctl.handle_event(ShellEvent::TrayClicked);
    ctl.drain();
    assert!(host.window(main).unwrap().visible);
    assert!(host.tray().unwrap().highlighted);
}

#[tokio::test]
async fn test_last_window_closed_quits() {
    let (mut ctl, _host, daemon, main) = started(test_config());
    settle(&mut ctl).await;

    ctl.handle_event(inbound("closePage", json!(main.get())));
    assert_eq!(ctl.drain(), Flow::Quit);

    ctl.shutdown();
    ctl.shutdown();
    settle(&mut ctl).await;
    assert_eq!(daemon.stops.load(Ordering::SeqCst), 1);
    assert_eq!(ctl.daemon_state(), DaemonState::Stopped);
}

#[tokio::test]
async fn test_activate_recreates_main_window() {
    let mut config = test_config();
    config.window.keep_running_without_windows = true;
    let (mut ctl, host, _daemon, main) = started(config);

    ctl.handle_event(inbound("closePage", json!(main.get())));
    assert_eq!(ctl.drain(), Flow::Continue);
    assert!(ctl.main_window().is_none());

    // clicking a tray bound to a closed window does nothing
    ctl.handle_event(ShellEvent::TrayClicked);

    ctl.handle_event(ShellEvent::Activate {
        has_visible_windows: false,
    });
    ctl.drain();

    let replacement = ctl.main_window().unwrap();
    assert_eq!(replacement, WindowId::new(2));
    assert!(host.window(replacement).unwrap().visible);
    assert_eq!(ctl.tray_window(), Some(replacement));
    assert_eq!(host.trays_created(), 1);
    assert!(host.tray().unwrap().highlighted);
}

#[tokio::test]
async fn test_activate_with_windows_does_nothing() {
    let (mut ctl, host, _daemon, _main) = started(test_config());
    ctl.handle_event(ShellEvent::Activate {
        has_visible_windows: true,
    });
    ctl.drain();
    assert_eq!(host.window_count(), 1);
}

#[tokio::test]
async fn test_quit_event_stops_loop() {
    let (mut ctl, _host, _daemon, _main) = started(test_config());
    assert_eq!(ctl.handle_event(ShellEvent::Quit), Flow::Quit);
}
