//! `proto.djtool.Djtool` service implementation.

use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use tokio::sync::{broadcast, mpsc};
use tokio::time::MissedTickBehavior;
use tokio_stream::wrappers::ReceiverStream;
use tonic::{Request, Response, Status};
use tracing::{debug, info};

use crate::proto::djtool_server::Djtool;
use crate::proto::{ConnectRequest, DisconnectRequest, Empty, Heartbeat, Update, update};

/// Frames buffered per stream before the heartbeat task waits on the client.
const STREAM_BUFFER: usize = 16;

/// Daemon side of the session channel.
///
/// Every `Connect` gets its own heartbeat task with a counter starting at 1.
/// A stream ends when its client goes away or the daemon shuts down.
/// `Disconnect` is an acknowledgement only: other consumers keep their streams.
#[derive(Debug, Clone)]
pub struct DjtoolService {
    heartbeat_interval: Duration,
    shutdown: broadcast::Sender<()>,
    open_streams: Arc<AtomicUsize>,
}

impl DjtoolService {
    /// Create a service that sends a heartbeat every `heartbeat_interval`.
    #[must_use]
    pub fn new(heartbeat_interval: Duration) -> Self {
        let (shutdown, _) = broadcast::channel(1);
        Self { heartbeat_interval, shutdown, open_streams: Arc::new(AtomicUsize::new(0)) }
    }

    /// End every open `Connect` stream for daemon shutdown. Returns how many
    /// were signalled.
    pub fn close_streams(&self) -> usize {
        // No open streams is fine.
        self.shutdown.send(()).unwrap_or(0)
    }

    /// Number of `Connect` streams currently open.
    #[must_use]
    pub fn open_streams(&self) -> usize {
        self.open_streams.load(Ordering::SeqCst)
    }
}

fn heartbeat(seq: u64) -> Update {
    Update { update: Some(update::Update::Heartbeat(Heartbeat { seq })) }
}

/// Decrements the open stream count when the heartbeat task ends.
struct StreamGuard(Arc<AtomicUsize>);

impl Drop for StreamGuard {
    fn drop(&mut self) {
        self.0.fetch_sub(1, Ordering::SeqCst);
    }
}

#[tonic::async_trait]
impl Djtool for DjtoolService {
    type ConnectStream = ReceiverStream<Result<Update, Status>>;

    async fn connect(
        &self,
        _request: Request<ConnectRequest>,
    ) -> Result<Response<Self::ConnectStream>, Status> {
        let (tx, rx) = mpsc::channel(STREAM_BUFFER);
        let mut shutdown = self.shutdown.subscribe();
        let mut ticker = tokio::time::interval(self.heartbeat_interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        self.open_streams.fetch_add(1, Ordering::SeqCst);
        let guard = StreamGuard(Arc::clone(&self.open_streams));
        info!(open_streams = self.open_streams(), "Session stream opened");

        tokio::spawn(async move {
            let _guard = guard;
            let mut seq: u64 = 0;
            loop {
                tokio::select! {
                    _ = ticker.tick() => {
                        seq += 1;
                        if tx.send(Ok(heartbeat(seq))).await.is_err() {
                            debug!(seq, "Client went away, ending session stream");
                            break;
                        }
                        debug!(seq, "Heartbeat sent");
                    }
                    _ = shutdown.recv() => {
                        info!(seq, "Session stream closed for shutdown");
                        break;
                    }
                }
            }
        });

        Ok(Response::new(ReceiverStream::new(rx)))
    }

    async fn disconnect(
        &self,
        _request: Request<DisconnectRequest>,
    ) -> Result<Response<Empty>, Status> {
        // The client releases its own stream by dropping it.
        info!(open_streams = self.open_streams(), "Disconnect acknowledged");
        Ok(Response::new(Empty {}))
    }
}
