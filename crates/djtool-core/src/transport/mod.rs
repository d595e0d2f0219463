//! Transport adapter for the session protocol.
//!
//! The session manager talks to the daemon only through [`Transport`]: one
//! server-streaming call that yields [`Update`]s and one unary call used for
//! teardown. Concrete transports map their own failures into the small
//! [`TransportError`] taxonomy and know nothing about liveness.

pub mod grpc;

pub use grpc::GrpcTransport;

use std::collections::BTreeMap;
use std::fmt;
use std::time::Duration;

use futures::stream::BoxStream;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tonic::{Code, Status};

use crate::codec::{CodecError, Update};
use crate::error::{DjtoolError, Result};
use crate::proto::{ConnectRequest, DisconnectRequest, Empty};

/// Endpoint option: connect timeout in milliseconds.
pub const OPTION_CONNECT_TIMEOUT_MS: &str = "connect_timeout_ms";

/// Endpoint option: user agent sent with every call.
pub const OPTION_USER_AGENT: &str = "user_agent";

/// Failures reported by a [`Transport`].
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum TransportError {
    /// The endpoint could not be reached, or the connection dropped.
    #[error("Endpoint unavailable: {0}")]
    Unavailable(String),

    /// No response before the deadline.
    #[error("Deadline exceeded: {0}")]
    Timeout(String),

    /// The call was cancelled.
    #[error("Call cancelled: {0}")]
    Cancelled(String),

    /// A frame could not be decoded.
    #[error("Malformed message: {0}")]
    Malformed(String),

    /// Anything else the transport could not classify.
    #[error("Internal transport error: {0}")]
    Internal(String),
}

impl From<Status> for TransportError {
    fn from(status: Status) -> Self {
        let message = status.message().to_string();
        match status.code() {
            // h2 resets and broken connections surface as `Unknown`
            Code::Unavailable | Code::Unknown => Self::Unavailable(message),
            Code::DeadlineExceeded => Self::Timeout(message),
            Code::Cancelled => Self::Cancelled(message),
            Code::DataLoss => Self::Malformed(message),
            code => Self::Internal(format!("{code:?}: {message}")),
        }
    }
}

impl From<CodecError> for TransportError {
    fn from(err: CodecError) -> Self {
        match err {
            CodecError::MalformedMessage(message) => Self::Malformed(message),
        }
    }
}

/// Lazy, unbounded, non-restartable sequence of updates.
///
/// Dropping the stream cancels the call and releases its resources.
pub type UpdateStream = BoxStream<'static, std::result::Result<Update, TransportError>>;

/// Identifies a daemon: base URL plus free-form options.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Endpoint {
    url: String,
    #[serde(default)]
    options: BTreeMap<String, String>,
}

impl Endpoint {
    /// Parse a daemon URL such as `http://127.0.0.1:50051`.
    ///
    /// # Errors
    ///
    /// Returns [`DjtoolError::InvalidEndpoint`] unless the URL is an absolute
    /// `http`/`https` URI with a host.
    pub fn parse(url: impl Into<String>) -> Result<Self> {
        let url = url.into();
        let uri: http::Uri = url
            .parse()
            .map_err(|e| DjtoolError::InvalidEndpoint(format!("{url}: {e}")))?;
        match uri.scheme_str() {
            Some("http" | "https") => {}
            _ => {
                return Err(DjtoolError::InvalidEndpoint(format!(
                    "{url}: scheme must be http or https"
                )));
            }
        }
        if uri.host().is_none() {
            return Err(DjtoolError::InvalidEndpoint(format!("{url}: missing host")));
        }
        Ok(Self { url, options: BTreeMap::new() })
    }

    /// Attach an option. Unknown keys are kept and ignored by the transports.
    #[must_use]
    pub fn with_option(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.options.insert(key.into(), value.into());
        self
    }

    #[must_use]
    pub fn url(&self) -> &str {
        &self.url
    }

    #[must_use]
    pub fn options(&self) -> &BTreeMap<String, String> {
        &self.options
    }

    #[must_use]
    pub fn option(&self, key: &str) -> Option<&str> {
        self.options.get(key).map(String::as_str)
    }

    /// `connect_timeout_ms` option, if present and numeric.
    #[must_use]
    pub fn connect_timeout(&self) -> Option<Duration> {
        self.option(OPTION_CONNECT_TIMEOUT_MS)
            .and_then(|value| value.parse::<u64>().ok())
            .map(Duration::from_millis)
    }

    #[must_use]
    pub fn user_agent(&self) -> Option<&str> {
        self.option(OPTION_USER_AGENT)
    }
}

impl fmt::Display for Endpoint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.url)
    }
}

/// The two calls the session manager needs from the daemon.
#[async_trait::async_trait]
pub trait Transport: Send + Sync + 'static {
    /// Open the `Connect` stream.
    ///
    /// The returned stream ends on error or when the daemon closes it; it
    /// never reopens itself.
    async fn open_stream(
        &self,
        endpoint: &Endpoint,
        request: ConnectRequest,
    ) -> std::result::Result<UpdateStream, TransportError>;

    /// Issue the unary `Disconnect` call with an explicit deadline.
    ///
    /// Safe to call when no stream is open.
    async fn call_unary(
        &self,
        endpoint: &Endpoint,
        request: DisconnectRequest,
        timeout: Duration,
    ) -> std::result::Result<Empty, TransportError>;
}
