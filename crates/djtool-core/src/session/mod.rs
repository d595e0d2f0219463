//! Client-side session with the djtool daemon.
//!
//! A [`SessionManager`] owns one logical session per daemon endpoint. It opens
//! the `Connect` stream, watches the heartbeat sequence for staleness,
//! reconnects with exponential backoff, and publishes a single ordered feed of
//! [`SessionEvent`]s plus a [`SessionSnapshot`] of the current state.

pub mod backoff;
pub mod error;
pub mod manager;
pub mod state;

pub use backoff::Backoff;
pub use error::SessionError;
pub use manager::{SessionManager, Subscription};
pub use state::{ConnectionState, SessionEvent, SessionSnapshot};
