//! End-to-end session tests: `SessionManager` + `GrpcTransport` + daemon.

mod common;

use std::sync::Arc;
use std::time::Duration;

use djtool_core::server::EmbeddedDaemon;
use djtool_core::{
    ConnectionState, GrpcTransport, SessionConfig, SessionError, SessionEvent, SessionManager,
    Subscription, Update,
};

const EVENT_TIMEOUT: Duration = Duration::from_secs(10);

fn manager() -> SessionManager {
    SessionManager::new(Arc::new(GrpcTransport::new()), common::fast_session_config())
}

/// Next state transition, skipping updates.
async fn next_state(events: &mut Subscription) -> (ConnectionState, Option<SessionError>) {
    tokio::time::timeout(EVENT_TIMEOUT, async {
        loop {
            match events.recv().await.expect("feed open") {
                SessionEvent::StateChanged { to, error, .. } => return (to, error),
                SessionEvent::Update { .. } => {}
            }
        }
    })
    .await
    .expect("state change in time")
}

async fn wait_for_state(events: &mut Subscription, state: ConnectionState) {
    loop {
        if next_state(events).await.0 == state {
            return;
        }
    }
}

#[tokio::test]
async fn test_session_connects_and_tracks_heartbeats() {
    let mut daemon = common::start_test_daemon().await;
    let manager = manager();
    let mut events = manager.subscribe();

    manager.connect(daemon.endpoint().unwrap()).await.unwrap();
    assert_eq!(next_state(&mut events).await.0, ConnectionState::Connecting);
    assert_eq!(next_state(&mut events).await.0, ConnectionState::Connected);

    // Heartbeats keep arriving and the recorded sequence only grows.
    let mut last = 0;
    let mut seen = 0;
    while seen < 3 {
        let event = tokio::time::timeout(EVENT_TIMEOUT, events.recv()).await.unwrap().unwrap();
        if let SessionEvent::Update { update: Update::Heartbeat { seq } } = event {
            assert!(seq > last);
            last = seq;
            seen += 1;
        }
    }
    assert!(manager.snapshot().last_seq.unwrap() >= last);
    assert_eq!(manager.state(), ConnectionState::Connected);

    manager.shutdown().await;
    daemon.shutdown().await.unwrap();
}

#[tokio::test]
async fn test_disconnect_reaches_daemon() {
    let mut daemon = common::start_test_daemon().await;
    let manager = manager();
    let mut events = manager.subscribe();

    manager.connect(daemon.endpoint().unwrap()).await.unwrap();
    wait_for_state(&mut events, ConnectionState::Connected).await;

    manager.disconnect().await.unwrap();
    assert_eq!(manager.state(), ConnectionState::Disconnected);
    assert_eq!(next_state(&mut events).await, (ConnectionState::Disconnected, None));

    // Idempotent.
    manager.disconnect().await.unwrap();
    assert_eq!(manager.state(), ConnectionState::Disconnected);

    daemon.shutdown().await.unwrap();
}

#[tokio::test]
async fn test_disconnect_does_not_end_other_sessions() {
    let mut daemon = common::start_test_daemon().await;
    let ui = manager();
    let status_check = manager();
    let mut ui_events = ui.subscribe();
    let mut other_events = status_check.subscribe();

    ui.connect(daemon.endpoint().unwrap()).await.unwrap();
    status_check.connect(daemon.endpoint().unwrap()).await.unwrap();
    wait_for_state(&mut ui_events, ConnectionState::Connected).await;
    wait_for_state(&mut other_events, ConnectionState::Connected).await;

    status_check.disconnect().await.unwrap();
    assert_eq!(status_check.state(), ConnectionState::Disconnected);

    // Longer than the liveness window: the remaining session keeps its stream.
    let watched = tokio::time::timeout(Duration::from_millis(800), async {
        loop {
            match ui_events.recv().await.expect("feed open") {
                SessionEvent::StateChanged { to, .. } => return to,
                SessionEvent::Update { .. } => {}
            }
        }
    })
    .await;
    assert!(watched.is_err(), "unexpected transition to {:?}", watched.ok());
    assert_eq!(ui.state(), ConnectionState::Connected);

    ui.shutdown().await;
    status_check.shutdown().await;
    daemon.shutdown().await.unwrap();
}

#[tokio::test]
async fn test_daemon_restart_triggers_reconnect() {
    let mut daemon = common::start_test_daemon().await;
    let address = daemon.address();
    let manager = SessionManager::new(
        Arc::new(GrpcTransport::new()),
        SessionConfig { max_retries: 20, ..common::fast_session_config() },
    );
    let mut events = manager.subscribe();

    manager.connect(daemon.endpoint().unwrap()).await.unwrap();
    wait_for_state(&mut events, ConnectionState::Connected).await;

    daemon.shutdown().await.unwrap();
    let (state, error) = next_state(&mut events).await;
    assert_eq!(state, ConnectionState::Reconnecting);
    assert!(matches!(error, Some(SessionError::Unavailable(_) | SessionError::Timeout(_))));

    // Same port, fresh daemon: the session comes back with a new counter.
    let mut restarted = common::start_test_daemon_with(|config| {
        config.server.address = address;
    })
    .await;
    wait_for_state(&mut events, ConnectionState::Connected).await;
    assert_eq!(manager.snapshot().retries, 0);

    manager.shutdown().await;
    restarted.shutdown().await.unwrap();
}

#[tokio::test]
async fn test_unreachable_daemon_exhausts_retries() {
    let manager = manager();
    let mut events = manager.subscribe();

    manager.connect(common::closed_endpoint()).await.unwrap();
    wait_for_state(&mut events, ConnectionState::Failed).await;

    let snapshot = manager.snapshot();
    assert_eq!(snapshot.state, ConnectionState::Failed);
    assert!(matches!(
        snapshot.last_error,
        Some(SessionError::RetriesExhausted { retries: 3, .. })
    ));

    manager.disconnect().await.unwrap();
    assert_eq!(manager.state(), ConnectionState::Disconnected);
}

#[tokio::test]
async fn test_silent_daemon_is_detected_as_stale() {
    // Heartbeats far slower than the liveness window.
    let mut daemon = common::start_test_daemon_with(|config| {
        config.server.heartbeat_interval_ms = 60_000;
    })
    .await;
    let manager = manager();
    let mut events = manager.subscribe();

    manager.connect(daemon.endpoint().unwrap()).await.unwrap();
    // The first heartbeat is immediate, the second never comes in time.
    wait_for_state(&mut events, ConnectionState::Connected).await;
    let (state, error) = next_state(&mut events).await;
    assert_eq!(state, ConnectionState::Reconnecting);
    assert!(matches!(error, Some(SessionError::Timeout(_))));

    manager.shutdown().await;
    daemon.shutdown().await.unwrap();
}

#[tokio::test]
async fn test_connect_other_endpoint_while_active_is_rejected() {
    let mut daemon = common::start_test_daemon().await;
    let manager = manager();
    let mut events = manager.subscribe();

    manager.connect(daemon.endpoint().unwrap()).await.unwrap();
    wait_for_state(&mut events, ConnectionState::Connected).await;

    let err = manager.connect(common::closed_endpoint()).await.unwrap_err();
    assert!(matches!(err, SessionError::EndpointInUse(_)));
    assert_eq!(manager.state(), ConnectionState::Connected);

    manager.shutdown().await;
    daemon.shutdown().await.unwrap();
}

#[tokio::test]
async fn test_grpc_web_enabled_daemon_serves_native_clients() {
    let mut daemon: EmbeddedDaemon = common::start_test_daemon_with(|config| {
        config.server.enable_grpc_web = true;
    })
    .await;
    let manager = manager();
    let mut events = manager.subscribe();

    manager.connect(daemon.endpoint().unwrap()).await.unwrap();
    wait_for_state(&mut events, ConnectionState::Connected).await;

    manager.shutdown().await;
    daemon.shutdown().await.unwrap();
}
