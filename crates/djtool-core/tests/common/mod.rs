//! Shared test utilities for djtool core integration tests.

#![allow(dead_code)]

use std::time::Duration;

use djtool_core::config::{BackoffConfig, Config, SessionConfig};
use djtool_core::server::EmbeddedDaemon;
use djtool_core::transport::Endpoint;

/// Heartbeat cadence used by test daemons.
pub const HEARTBEAT_INTERVAL: Duration = Duration::from_millis(100);

/// Starts a daemon on an ephemeral port and waits until it accepts connections.
///
/// # Panics
/// Panics if the daemon fails to start.
pub async fn start_test_daemon() -> EmbeddedDaemon {
    start_test_daemon_with(|_| {}).await
}

/// Like [`start_test_daemon`], with a hook to adjust the configuration.
///
/// # Panics
/// Panics if the daemon fails to start.
pub async fn start_test_daemon_with(adjust: impl FnOnce(&mut Config)) -> EmbeddedDaemon {
    let mut config = Config::default();
    config.server.address = "127.0.0.1:0".parse().unwrap();
    config.server.heartbeat_interval_ms = HEARTBEAT_INTERVAL.as_millis() as u64;
    adjust(&mut config);

    let mut daemon = EmbeddedDaemon::new(config);
    daemon.start().await.expect("Daemon failed to start");
    daemon.wait_for_ready(Duration::from_secs(5)).await.expect("Daemon not ready");
    daemon
}

/// Session settings scaled to the test heartbeat cadence.
pub fn fast_session_config() -> SessionConfig {
    SessionConfig {
        liveness_window_ms: 500,
        backoff: BackoffConfig { base_ms: 50, multiplier: 2.0, max_delay_ms: 200 },
        max_retries: 3,
        unary_timeout_ms: 1_000,
        ..SessionConfig::default()
    }
}

/// Endpoint on which nothing listens.
pub fn closed_endpoint() -> Endpoint {
    let listener = std::net::TcpListener::bind("127.0.0.1:0").expect("Failed to bind to port 0");
    let port = listener.local_addr().unwrap().port();
    drop(listener);
    Endpoint::parse(format!("http://127.0.0.1:{port}")).unwrap()
}
