//! djtool core: the session channel between the DJ tool UI and its local daemon.
//!
//! This crate provides:
//! - the wire messages and codec for the `Connect`/`Disconnect` RPC surface
//! - a transport adapter over gRPC
//! - the client-side session manager (liveness, backoff, event feed)
//! - the daemon endpoint that serves heartbeats
//! - configuration and error handling
//!
//! # Example
//!
//! ```rust,no_run
//! use std::sync::Arc;
//!
//! use djtool_core::{Config, Endpoint, GrpcTransport, SessionEvent, SessionManager};
//!
//! #[tokio::main]
//! async fn main() -> djtool_core::Result<()> {
//!     let config = Config::load()?;
//!     let manager = SessionManager::new(Arc::new(GrpcTransport::new()), config.session);
//!     let mut events = manager.subscribe();
//!
//!     manager.connect(Endpoint::parse("http://127.0.0.1:50051")?).await?;
//!     while let Some(event) = events.recv().await {
//!         if let SessionEvent::StateChanged { to, .. } = event {
//!             println!("state: {to}");
//!         }
//!     }
//!     Ok(())
//! }
//! ```

pub mod codec;
pub mod config;
pub mod error;
pub mod proto;
pub mod server;
pub mod session;
pub mod transport;

pub use codec::{CodecError, Update, UpdateCase};
pub use config::{BackoffConfig, Config, ServerConfig, SessionConfig};
pub use error::{DjtoolError, Result};
pub use proto::{djtool_client, djtool_server};
pub use session::{
    Backoff, ConnectionState, SessionError, SessionEvent, SessionManager, SessionSnapshot,
    Subscription,
};
pub use transport::{Endpoint, GrpcTransport, Transport, TransportError, UpdateStream};
