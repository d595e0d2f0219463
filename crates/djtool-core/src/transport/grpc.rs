//! gRPC transport over tonic.

use std::time::Duration;

use futures::StreamExt;
use tonic::transport::Channel;
use tracing::debug;

use super::{Endpoint, Transport, TransportError, UpdateStream};
use crate::codec::Update;
use crate::proto::djtool_client::DjtoolClient;
use crate::proto::{ConnectRequest, DisconnectRequest, Empty};

/// Connect timeout used when the endpoint does not set one.
const DEFAULT_CONNECT_TIMEOUT: Duration = Duration::from_secs(5);

/// [`Transport`] speaking the `proto.djtool.Djtool` gRPC service.
///
/// Every call dials its own channel, so a stream that was torn down leaves
/// nothing behind that a later attempt could trip over.
#[derive(Debug, Clone)]
pub struct GrpcTransport {
    connect_timeout: Duration,
}

impl GrpcTransport {
    #[must_use]
    pub fn new() -> Self {
        Self { connect_timeout: DEFAULT_CONNECT_TIMEOUT }
    }

    /// Use `timeout` for endpoints without a `connect_timeout_ms` option.
    #[must_use]
    pub fn with_connect_timeout(timeout: Duration) -> Self {
        Self { connect_timeout: timeout }
    }

    async fn client(&self, endpoint: &Endpoint) -> Result<DjtoolClient<Channel>, TransportError> {
        let mut builder = tonic::transport::Endpoint::from_shared(endpoint.url().to_string())
            .map_err(|e| TransportError::Internal(format!("invalid endpoint {endpoint}: {e}")))?
            .connect_timeout(endpoint.connect_timeout().unwrap_or(self.connect_timeout));

        if let Some(user_agent) = endpoint.user_agent() {
            builder = builder.user_agent(user_agent.to_string()).map_err(|e| {
                TransportError::Internal(format!("invalid user agent {user_agent:?}: {e}"))
            })?;
        }

        let channel = builder.connect().await.map_err(|e| {
            debug!(endpoint = %endpoint, error = %e, "Failed to dial daemon");
            TransportError::Unavailable(format!("failed to connect to {endpoint}: {e}"))
        })?;

        Ok(DjtoolClient::new(channel))
    }
}

impl Default for GrpcTransport {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait::async_trait]
impl Transport for GrpcTransport {
    async fn open_stream(
        &self,
        endpoint: &Endpoint,
        request: ConnectRequest,
    ) -> Result<UpdateStream, TransportError> {
        let mut client = self.client(endpoint).await?;
        let response = client.connect(tonic::Request::new(request)).await?;

        debug!(endpoint = %endpoint, "Connect stream opened");

        let updates = response
            .into_inner()
            .map(|frame| frame.map(Update::from).map_err(TransportError::from));
        Ok(updates.boxed())
    }

    async fn call_unary(
        &self,
        endpoint: &Endpoint,
        request: DisconnectRequest,
        timeout: Duration,
    ) -> Result<Empty, TransportError> {
        let call = async {
            let mut client = self.client(endpoint).await?;
            let mut request = tonic::Request::new(request);
            request.set_timeout(timeout);
            let response = client.disconnect(request).await?;
            Ok::<_, TransportError>(response.into_inner())
        };

        tokio::time::timeout(timeout, call).await.map_err(|_| {
            TransportError::Timeout(format!("Disconnect to {endpoint} took longer than {timeout:?}"))
        })?
    }
}
