//! Server module for djtool core.
//!
//! This module contains the daemon endpoint: the gRPC server, the
//! `proto.djtool.Djtool` service and an embeddable daemon for tests and tools.

mod djtool_service;
pub mod logging;
pub mod manager;

pub use djtool_service::DjtoolService;
pub use manager::EmbeddedDaemon;

use std::future::Future;
use std::net::SocketAddr;

use tokio::net::TcpListener;
use tokio::sync::watch;
use tokio_stream::wrappers::TcpListenerStream;
use tonic::transport::Server;
use tonic_web::GrpcWebLayer;
use tower::ServiceBuilder;
use tracing::{info, warn};

use crate::config::{Config, ServerConfig};
use crate::error::{DjtoolError, Result};
use crate::proto::djtool_server::DjtoolServer;
use logging::RequestLoggerLayer;

/// Start the djtool daemon and serve until Ctrl-C.
///
/// If gRPC-Web is enabled it is served on the main address, or on
/// `web_address` when that names a different socket.
///
/// # Errors
///
/// Returns an error if the server fails to start or bind to the configured address.
pub async fn run(config: &Config) -> Result<()> {
    run_with_shutdown(config, async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            warn!(error = %e, "Failed to listen for Ctrl-C");
            std::future::pending::<()>().await;
        }
        info!("Shutdown signal received");
    })
    .await
}

/// Start the djtool daemon and serve until `signal` completes.
///
/// # Errors
///
/// Returns an error if the server fails to start or bind to the configured address.
pub async fn run_with_shutdown<F>(config: &Config, signal: F) -> Result<()>
where
    F: Future<Output = ()> + Send + 'static,
{
    let (grpc, web) = bind(&config.server).await?;
    serve_with_shutdown(grpc, web, &config.server, signal).await
}

/// Bind the main listener and, if configured separately, the gRPC-Web listener.
///
/// # Errors
///
/// Returns [`DjtoolError::Io`] if an address cannot be bound.
pub async fn bind(config: &ServerConfig) -> Result<(TcpListener, Option<TcpListener>)> {
    let grpc = TcpListener::bind(config.address).await?;
    let web = match separate_web_address(config) {
        Some(web_addr) => Some(TcpListener::bind(web_addr).await?),
        None => None,
    };
    Ok((grpc, web))
}

fn separate_web_address(config: &ServerConfig) -> Option<SocketAddr> {
    config.web_address.filter(|web_addr| config.enable_grpc_web && *web_addr != config.address)
}

/// Serve the daemon on already bound listeners until `signal` completes.
///
/// With a `web` listener, the main listener serves plain gRPC and `web`
/// serves gRPC-Web. Without one, the main listener serves gRPC-Web too when
/// it is enabled.
///
/// # Errors
///
/// Returns an error if the configuration is invalid or either server fails.
pub async fn serve_with_shutdown<F>(
    grpc: TcpListener,
    web: Option<TcpListener>,
    config: &ServerConfig,
    signal: F,
) -> Result<()>
where
    F: Future<Output = ()> + Send + 'static,
{
    config.validate()?;
    let service = DjtoolService::new(config.heartbeat_interval());
    let (stop_tx, stop_rx) = watch::channel(());
    tokio::spawn(async move {
        signal.await;
        let _ = stop_tx.send(());
    });

    let grpc_addr = grpc.local_addr()?;
    match web {
        Some(web) => {
            let web_addr = web.local_addr()?;
            info!(
                grpc_addr = %grpc_addr,
                grpc_web_addr = %web_addr,
                heartbeat_interval_ms = config.heartbeat_interval_ms,
                "Starting daemon with separate gRPC-Web listener"
            );

            let grpc_web_handle = tokio::spawn(serve_on(
                web,
                service.clone(),
                true,
                stopped(stop_rx.clone(), service.clone()),
            ));
            let grpc_handle =
                tokio::spawn(serve_on(grpc, service.clone(), false, stopped(stop_rx, service)));

            let (grpc_result, web_result) = tokio::join!(grpc_handle, grpc_web_handle);
            grpc_result.map_err(|e| DjtoolError::Io(std::io::Error::other(e)))??;
            web_result.map_err(|e| DjtoolError::Io(std::io::Error::other(e)))??;
        }
        None => {
            info!(
                grpc_addr = %grpc_addr,
                grpc_web = config.enable_grpc_web,
                heartbeat_interval_ms = config.heartbeat_interval_ms,
                "Starting daemon"
            );
            let shutdown = stopped(stop_rx, service.clone());
            serve_on(grpc, service, config.enable_grpc_web, shutdown).await?;
        }
    }

    info!("Daemon stopped");
    Ok(())
}

/// Completes once shutdown is requested or the requester is gone.
///
/// Heartbeat streams never finish on their own, so they are closed here to
/// let the graceful shutdown complete.
async fn stopped(mut stop: watch::Receiver<()>, service: DjtoolService) {
    let _ = stop.changed().await;
    let closed = service.close_streams();
    info!(closed, "Closing session streams for shutdown");
}

async fn serve_on(
    listener: TcpListener,
    service: DjtoolService,
    grpc_web: bool,
    shutdown: impl Future<Output = ()> + Send,
) -> Result<()> {
    let incoming = TcpListenerStream::new(listener);
    if grpc_web {
        Server::builder()
            .accept_http1(true)
            .layer(ServiceBuilder::new().layer(RequestLoggerLayer).layer(GrpcWebLayer::new()))
            .add_service(DjtoolServer::new(service))
            .serve_with_incoming_shutdown(incoming, shutdown)
            .await?;
    } else {
        Server::builder()
            .layer(RequestLoggerLayer)
            .add_service(DjtoolServer::new(service))
            .serve_with_incoming_shutdown(incoming, shutdown)
            .await?;
    }
    Ok(())
}
