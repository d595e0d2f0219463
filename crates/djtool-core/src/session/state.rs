//! Session state definitions.

use std::fmt;

use chrono::{DateTime, Utc};
use serde::Serialize;
use tokio::time::Instant;

use crate::codec::Update;
use crate::session::SessionError;
use crate::transport::Endpoint;

/// Connection state enumeration.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum ConnectionState {
    /// No session has been started.
    #[default]
    Idle,
    /// A stream is being opened; no heartbeat seen yet.
    Connecting,
    /// Heartbeats are arriving within the liveness window.
    Connected,
    /// Waiting out the backoff before the next attempt.
    Reconnecting,
    /// Closed on request, or cancelled.
    Disconnected,
    /// Reconnection gave up. Only an explicit `connect()` leaves this state.
    Failed,
}

impl ConnectionState {
    /// Whether a session is running (a stream is open or about to be).
    #[must_use]
    pub const fn is_active(self) -> bool {
        matches!(self, Self::Connecting | Self::Connected | Self::Reconnecting)
    }
}

impl fmt::Display for ConnectionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Idle => "IDLE",
            Self::Connecting => "CONNECTING",
            Self::Connected => "CONNECTED",
            Self::Reconnecting => "RECONNECTING",
            Self::Disconnected => "DISCONNECTED",
            Self::Failed => "FAILED",
        };
        f.write_str(name)
    }
}

/// One item of the ordered feed published to subscribers.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum SessionEvent {
    /// The connection state changed. `error` explains reconnects and failures.
    StateChanged {
        from: ConnectionState,
        to: ConnectionState,
        error: Option<SessionError>,
    },
    /// An update arrived from the daemon.
    Update { update: Update },
}

/// Read-only view of the session for consumers.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct SessionSnapshot {
    pub endpoint: Option<Endpoint>,
    pub state: ConnectionState,
    /// Highest heartbeat sequence seen on the current connection.
    pub last_seq: Option<u64>,
    /// Wall-clock receipt time of `last_seq`.
    pub last_seen_at: Option<DateTime<Utc>>,
    /// Reconnection attempts since the last successful connect.
    pub retries: u32,
    /// Error attached to the latest transition, if any.
    pub last_error: Option<SessionError>,
}

/// Runtime aggregate owned by the session task.
#[derive(Debug, Default)]
pub(crate) struct Session {
    pub(crate) endpoint: Option<Endpoint>,
    pub(crate) state: ConnectionState,
    pub(crate) last_seq: Option<u64>,
    pub(crate) last_seen_at: Option<DateTime<Utc>>,
    /// Monotonic receipt time of `last_seq`, drives the liveness window.
    pub(crate) last_seen: Option<Instant>,
    pub(crate) retries: u32,
    pub(crate) last_error: Option<SessionError>,
}

impl Session {
    /// Start over against `endpoint`.
    pub(crate) fn reset(&mut self, endpoint: Endpoint) {
        *self = Self { endpoint: Some(endpoint), state: self.state, ..Self::default() };
    }

    /// Forget heartbeat bookkeeping; the daemon restarts its counter on every `Connect`.
    pub(crate) fn clear_heartbeat(&mut self) {
        self.last_seq = None;
        self.last_seen_at = None;
        self.last_seen = None;
    }

    /// Record a heartbeat if it advances the sequence.
    ///
    /// Returns `false` for duplicates and out-of-order heartbeats, which
    /// leave the recorded values untouched.
    pub(crate) fn record_heartbeat(&mut self, seq: u64, now: Instant) -> bool {
        if self.last_seq.is_some_and(|last| seq <= last) {
            return false;
        }
        self.last_seq = Some(seq);
        self.last_seen = Some(now);
        self.last_seen_at = Some(Utc::now());
        true
    }

    pub(crate) fn snapshot(&self) -> SessionSnapshot {
        SessionSnapshot {
            endpoint: self.endpoint.clone(),
            state: self.state,
            last_seq: self.last_seq,
            last_seen_at: self.last_seen_at,
            retries: self.retries,
            last_error: self.last_error.clone(),
        }
    }
}
