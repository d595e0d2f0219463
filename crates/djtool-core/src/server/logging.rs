//! Request logging middleware: request IDs, RPC names and timing.

use std::task::{Context, Poll};
use std::time::Instant;

use http::{HeaderValue, Request};
use tower::{Layer, Service};
use tracing::{Instrument, info, info_span, warn};
use uuid::Uuid;

/// Header name for request ID
pub const REQUEST_ID_HEADER: &str = "x-request-id";

/// A `Layer` that tags each RPC with a request ID and logs its duration.
#[derive(Debug, Clone, Copy, Default)]
pub struct RequestLoggerLayer;

impl<S> Layer<S> for RequestLoggerLayer {
    type Service = RequestLoggerService<S>;

    fn layer(&self, service: S) -> Self::Service {
        RequestLoggerService { service }
    }
}

/// A `Service` that logs request information with request IDs and timing.
#[derive(Debug, Clone)]
pub struct RequestLoggerService<S> {
    service: S,
}

/// RPC name from a gRPC path such as `/proto.djtool.Djtool/Connect`.
fn rpc_name(path: &str) -> &str {
    path.rsplit('/').find(|segment| !segment.is_empty()).unwrap_or(path)
}

/// Reuse the caller's request ID, or assign a fresh one.
fn ensure_request_id<B>(request: &mut Request<B>) -> String {
    if let Some(existing) = request.headers().get(REQUEST_ID_HEADER).and_then(|v| v.to_str().ok())
    {
        return existing.to_string();
    }

    let request_id = Uuid::new_v4().to_string();
    if let Ok(value) = HeaderValue::from_str(&request_id) {
        request.headers_mut().insert(REQUEST_ID_HEADER, value);
    }
    request_id
}

impl<S, B> Service<Request<B>> for RequestLoggerService<S>
where
    S: Service<Request<B>> + Clone + Send + 'static,
    S::Future: Send + 'static,
    B: Send + 'static,
{
    type Response = S::Response;
    type Error = S::Error;
    type Future = std::pin::Pin<
        Box<dyn std::future::Future<Output = Result<Self::Response, Self::Error>> + Send>,
    >;

    fn poll_ready(&mut self, cx: &mut Context<'_>) -> Poll<Result<(), Self::Error>> {
        self.service.poll_ready(cx)
    }

    fn call(&mut self, mut request: Request<B>) -> Self::Future {
        let request_id = ensure_request_id(&mut request);
        let rpc = rpc_name(request.uri().path()).to_string();
        let content_type = request
            .headers()
            .get(http::header::CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .unwrap_or("")
            .to_string();
        let start_time = Instant::now();

        let span = info_span!("rpc", request_id = %request_id, rpc = %rpc);
        span.in_scope(|| info!(content_type = %content_type, "Received request"));

        let future = self.service.call(request);
        Box::pin(
            async move {
                let result = future.await;
                let duration_ms = start_time.elapsed().as_millis();
                // For streaming RPCs this measures time to response headers.
                match &result {
                    Ok(_) => info!(duration_ms, "Request completed"),
                    Err(_) => warn!(duration_ms, "Request failed"),
                }
                result
            }
            .instrument(span),
        )
    }
}
