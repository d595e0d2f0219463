//! Embedded daemon for automatic server lifecycle management.
//!
//! Runs the djtool daemon inside the current process, so tools and tests can
//! start a real endpoint, wait until it accepts connections and stop it again.

use std::net::SocketAddr;
use std::time::Duration;

use tokio::sync::oneshot;
use tokio::task::JoinHandle;
use tokio::time::interval;
use tracing::{debug, info, warn};

use crate::config::Config;
use crate::error::{DjtoolError, Result};
use crate::server;
use crate::transport::Endpoint;

/// Manages an embedded djtool daemon running in a background task.
pub struct EmbeddedDaemon {
    /// Daemon configuration
    config: Config,
    /// Shutdown signal sender
    shutdown_tx: Option<oneshot::Sender<()>>,
    /// Server task handle
    server_handle: Option<JoinHandle<Result<()>>>,
    /// Bound gRPC address (differs from the config when port 0 was requested)
    address: SocketAddr,
}

impl EmbeddedDaemon {
    /// Create a new embedded daemon with the given configuration (not started yet).
    #[must_use]
    pub fn new(config: Config) -> Self {
        let address = config.server.address;
        Self { config, shutdown_tx: None, server_handle: None, address }
    }

    /// Bind the configured listeners and serve in a background task.
    ///
    /// # Errors
    ///
    /// Returns an error if the daemon is already running or an address cannot be bound.
    pub async fn start(&mut self) -> Result<()> {
        if self.is_running() {
            return Err(DjtoolError::Config("Daemon is already running".to_string()));
        }

        let (grpc, web) = server::bind(&self.config.server).await?;
        self.address = grpc.local_addr()?;
        info!(address = %self.address, "Starting embedded djtool daemon");

        let (shutdown_tx, shutdown_rx) = oneshot::channel::<()>();
        let server_config = self.config.server.clone();
        let server_handle = tokio::spawn(async move {
            server::serve_with_shutdown(grpc, web, &server_config, async {
                let _ = shutdown_rx.await;
            })
            .await
        });

        self.shutdown_tx = Some(shutdown_tx);
        self.server_handle = Some(server_handle);
        Ok(())
    }

    /// Wait until the daemon accepts connections.
    ///
    /// # Errors
    ///
    /// Returns an error if the daemon is not running, its task ended, or it did
    /// not become ready within `timeout`.
    pub async fn wait_for_ready(&self, timeout: Duration) -> Result<()> {
        let start_time = std::time::Instant::now();
        let mut poll_interval = interval(Duration::from_millis(50));
        poll_interval.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);

        if self.server_handle.is_none() {
            return Err(DjtoolError::Config("Daemon is not running".to_string()));
        }

        let endpoint = tonic::transport::Endpoint::from_shared(self.url())
            .map_err(|e| DjtoolError::Config(format!("Invalid daemon address: {e}")))?;

        loop {
            if start_time.elapsed() > timeout {
                return Err(DjtoolError::Config(format!(
                    "Daemon did not become ready within {timeout:?}"
                )));
            }

            if !self.is_running() {
                return Err(DjtoolError::Config(
                    "Daemon task completed unexpectedly while waiting for ready".to_string(),
                ));
            }

            match endpoint.connect().await {
                Ok(_) => {
                    info!(
                        address = %self.address,
                        elapsed_ms = start_time.elapsed().as_millis(),
                        "Embedded daemon is ready"
                    );
                    return Ok(());
                }
                Err(e) => debug!(error = %e, "Daemon not ready yet, retrying"),
            }

            poll_interval.tick().await;
        }
    }

    /// Check if the daemon task exists and is still running.
    #[must_use]
    pub fn is_running(&self) -> bool {
        self.server_handle.as_ref().is_some_and(|handle| !handle.is_finished())
    }

    /// The bound gRPC address.
    #[must_use]
    pub fn address(&self) -> SocketAddr {
        self.address
    }

    /// Base URL of the daemon, e.g. `http://127.0.0.1:50051`.
    #[must_use]
    pub fn url(&self) -> String {
        format!("http://{}", self.address)
    }

    /// Session endpoint pointing at this daemon.
    ///
    /// # Errors
    ///
    /// Returns [`DjtoolError::InvalidEndpoint`] if the address does not form a valid URL.
    pub fn endpoint(&self) -> Result<Endpoint> {
        Endpoint::parse(self.url())
    }

    /// Gracefully shut down the daemon.
    ///
    /// # Errors
    ///
    /// Returns an error if the server task failed or did not stop in time.
    pub async fn shutdown(&mut self) -> Result<()> {
        if let Some(shutdown_tx) = self.shutdown_tx.take()
            && shutdown_tx.send(()).is_err()
        {
            debug!("Daemon task already gone");
        }

        let Some(handle) = self.server_handle.take() else {
            return Ok(());
        };

        info!(address = %self.address, "Shutting down embedded daemon");
        match tokio::time::timeout(Duration::from_secs(5), handle).await {
            Ok(Ok(result)) => {
                info!("Embedded daemon stopped");
                result
            }
            Ok(Err(e)) => {
                warn!(error = %e, "Daemon task panicked during shutdown");
                Err(DjtoolError::Config(format!("Daemon shutdown error: {e}")))
            }
            Err(_) => {
                warn!("Daemon shutdown timed out, task may still be running");
                Err(DjtoolError::Config("Daemon shutdown timed out".to_string()))
            }
        }
    }
}

impl Drop for EmbeddedDaemon {
    fn drop(&mut self) {
        if let Some(shutdown_tx) = self.shutdown_tx.take() {
            if self.is_running() {
                warn!("EmbeddedDaemon dropped while running, signalling shutdown");
            }
            let _ = shutdown_tx.send(());
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ephemeral_config() -> Config {
        let mut config = Config::default();
        config.server.address = "127.0.0.1:0".parse().unwrap();
        config
    }

    #[test]
    fn test_embedded_daemon_new() {
        let daemon = EmbeddedDaemon::new(Config::default());
        assert!(!daemon.is_running());
        assert_eq!(daemon.address().port(), 50051);
        assert_eq!(daemon.url(), "http://127.0.0.1:50051");
    }

    #[tokio::test]
    async fn test_embedded_daemon_start_and_ready() {
        let mut daemon = EmbeddedDaemon::new(ephemeral_config());
        daemon.start().await.unwrap();
        assert!(daemon.is_running());
        assert_ne!(daemon.address().port(), 0);

        daemon.wait_for_ready(Duration::from_secs(5)).await.unwrap();
        daemon.shutdown().await.unwrap();
        assert!(!daemon.is_running());
    }

    #[tokio::test]
    async fn test_embedded_daemon_double_start() {
        let mut daemon = EmbeddedDaemon::new(ephemeral_config());
        daemon.start().await.unwrap();

        let result = daemon.start().await;
        assert!(result.unwrap_err().to_string().contains("already running"));

        daemon.shutdown().await.unwrap();
    }

    #[tokio::test]
    async fn test_wait_for_ready_requires_start() {
        let daemon = EmbeddedDaemon::new(ephemeral_config());
        let err = daemon.wait_for_ready(Duration::from_millis(100)).await.unwrap_err();
        assert!(err.to_string().contains("not running"));
    }

    #[tokio::test]
    async fn test_shutdown_when_not_started() {
        let mut daemon = EmbeddedDaemon::new(ephemeral_config());
        assert!(daemon.shutdown().await.is_ok());
    }

    #[tokio::test]
    async fn test_start_fails_on_taken_port() {
        let taken = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
        let mut config = Config::default();
        config.server.address = taken.local_addr().unwrap();

        let mut daemon = EmbeddedDaemon::new(config);
        let err = daemon.start().await.unwrap_err();
        assert!(matches!(err, DjtoolError::Io(_)));
        assert!(!daemon.is_running());
    }
}
