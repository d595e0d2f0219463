//! Session manager: connection lifecycle, liveness and reconnection.
//!
//! All state lives in one background task. Consumer commands, stream events,
//! the liveness deadline and the backoff deadline meet in a single `select!`
//! loop, so they are applied one at a time in arrival order. Each connection
//! attempt gets its own listener task; the previous listener is aborted and
//! awaited before a new one starts, and events tagged with an older attempt
//! number are dropped.

use std::sync::Arc;

use futures::{Stream, StreamExt};
use tokio::sync::{broadcast, mpsc, oneshot, watch};
use tokio::task::JoinHandle;
use tokio::time::{Instant, Sleep, sleep_until};
use tokio_stream::wrappers::BroadcastStream;
use tokio_stream::wrappers::errors::BroadcastStreamRecvError;
use tracing::{debug, info, warn};

use crate::codec::Update;
use crate::config::SessionConfig;
use crate::proto::{ConnectRequest, DisconnectRequest};
use crate::session::backoff::Backoff;
use crate::session::state::{ConnectionState, Session, SessionEvent, SessionSnapshot};
use crate::session::SessionError;
use crate::transport::{Endpoint, Transport, TransportError};

/// Capacity of the listener → session channel.
const LISTENER_BUFFER: usize = 64;

/// Capacity of the consumer → session command channel.
const COMMAND_BUFFER: usize = 16;

enum Command {
    Connect { endpoint: Endpoint, reply: oneshot::Sender<Result<(), SessionError>> },
    Disconnect { reply: oneshot::Sender<()> },
}

#[derive(Debug)]
enum ListenerEvent {
    Opened,
    Frame(Update),
    Failed(TransportError),
    Closed,
}

/// Handle to a session with one daemon endpoint.
///
/// Dropping the handle stops the session task, which cancels the stream and
/// every timer it owns.
pub struct SessionManager {
    commands: mpsc::Sender<Command>,
    events: broadcast::Sender<SessionEvent>,
    snapshot: watch::Receiver<SessionSnapshot>,
    task: JoinHandle<()>,
}

impl SessionManager {
    /// Spawn the session task. The session starts `Idle`.
    ///
    /// Must be called from within a tokio runtime.
    pub fn new(transport: Arc<dyn Transport>, config: SessionConfig) -> Self {
        let (commands, command_rx) = mpsc::channel(COMMAND_BUFFER);
        let (events, _) = broadcast::channel(config.event_buffer.max(1));
        let (snapshot_tx, snapshot) = watch::channel(SessionSnapshot::default());
        let (listener_tx, listener_rx) = mpsc::channel(LISTENER_BUFFER);

        let actor = SessionActor {
            transport,
            backoff: Backoff::from(&config.backoff),
            config,
            session: Session::default(),
            attempt: 0,
            listener: None,
            listener_tx,
            liveness_deadline: None,
            retry_at: None,
            pending_requests: Vec::new(),
            events: events.clone(),
            snapshot: snapshot_tx,
        };
        let task = tokio::spawn(actor.run(command_rx, listener_rx));

        Self { commands, events, snapshot, task }
    }

    /// Start a session against `endpoint`.
    ///
    /// From `Idle`, `Disconnected` or `Failed` this starts a fresh session
    /// with the retry counter at zero. While a session with the same endpoint
    /// is active it does nothing.
    ///
    /// # Errors
    ///
    /// [`SessionError::EndpointInUse`] if an active session is bound to a
    /// different endpoint, [`SessionError::Closed`] if the session task is gone.
    pub async fn connect(&self, endpoint: Endpoint) -> Result<(), SessionError> {
        let (reply, response) = oneshot::channel();
        self.commands
            .send(Command::Connect { endpoint, reply })
            .await
            .map_err(|_| SessionError::Closed)?;
        response.await.map_err(|_| SessionError::Closed)?
    }

    /// End the session.
    ///
    /// Idempotent: from `Idle` or `Disconnected` it does nothing. Returns once
    /// the stream is released and the state is `Disconnected`. The
    /// `DisconnectRequest` to the daemon is sent in the background and never
    /// delays the transition.
    ///
    /// # Errors
    ///
    /// [`SessionError::Closed`] if the session task is gone.
    pub async fn disconnect(&self) -> Result<(), SessionError> {
        let (reply, response) = oneshot::channel();
        self.commands.send(Command::Disconnect { reply }).await.map_err(|_| SessionError::Closed)?;
        response.await.map_err(|_| SessionError::Closed)
    }

    /// Subscribe to the event feed from this point on.
    #[must_use]
    pub fn subscribe(&self) -> Subscription {
        Subscription { receiver: self.events.subscribe() }
    }

    /// Current connection state.
    #[must_use]
    pub fn state(&self) -> ConnectionState {
        self.snapshot.borrow().state
    }

    /// Current session snapshot.
    #[must_use]
    pub fn snapshot(&self) -> SessionSnapshot {
        self.snapshot.borrow().clone()
    }

    /// Receiver that is notified on every snapshot change.
    #[must_use]
    pub fn watch(&self) -> watch::Receiver<SessionSnapshot> {
        self.snapshot.clone()
    }

    /// Disconnect and wait for the session task to finish.
    ///
    /// The task finishes once in-flight `DisconnectRequest`s have been
    /// answered or hit the unary timeout.
    pub async fn shutdown(self) {
        let Self { commands, task, .. } = self;
        let (reply, response) = oneshot::channel();
        if commands.send(Command::Disconnect { reply }).await.is_ok() {
            let _ = response.await;
        }
        drop(commands);
        let _ = task.await;
    }
}

impl std::fmt::Debug for SessionManager {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SessionManager").field("snapshot", &*self.snapshot.borrow()).finish()
    }
}

/// Cancellable subscription to a session's event feed.
///
/// Dropping it unsubscribes.
#[derive(Debug)]
pub struct Subscription {
    receiver: broadcast::Receiver<SessionEvent>,
}

impl Subscription {
    /// Next event, or `None` once the session task has stopped.
    ///
    /// A subscriber that falls more than `event_buffer` events behind loses
    /// the oldest ones; that is logged and skipped.
    pub async fn recv(&mut self) -> Option<SessionEvent> {
        loop {
            match self.receiver.recv().await {
                Ok(event) => return Some(event),
                Err(broadcast::error::RecvError::Lagged(skipped)) => {
                    warn!(skipped, "Session subscriber lagged, events dropped");
                }
                Err(broadcast::error::RecvError::Closed) => return None,
            }
        }
    }

    /// Stop receiving events.
    pub fn cancel(self) {}

    /// Turn the subscription into a stream of events.
    pub fn into_stream(self) -> impl Stream<Item = SessionEvent> + Send + 'static {
        BroadcastStream::new(self.receiver).filter_map(|item| async move {
            match item {
                Ok(event) => Some(event),
                Err(BroadcastStreamRecvError::Lagged(skipped)) => {
                    warn!(skipped, "Session subscriber lagged, events dropped");
                    None
                }
            }
        })
    }
}

struct SessionActor {
    transport: Arc<dyn Transport>,
    config: SessionConfig,
    backoff: Backoff,
    session: Session,
    /// Number of the current connection attempt.
    attempt: u64,
    listener: Option<JoinHandle<()>>,
    listener_tx: mpsc::Sender<(u64, ListenerEvent)>,
    liveness_deadline: Option<Instant>,
    retry_at: Option<Instant>,
    /// Background `DisconnectRequest`s, drained on teardown.
    pending_requests: Vec<JoinHandle<()>>,
    events: broadcast::Sender<SessionEvent>,
    snapshot: watch::Sender<SessionSnapshot>,
}

/// Sleep until `deadline`; callers disable the branch when it is `None`.
fn sleep_until_deadline(deadline: Option<Instant>) -> Sleep {
    sleep_until(deadline.unwrap_or_else(Instant::now))
}

impl SessionActor {
    async fn run(
        mut self,
        mut commands: mpsc::Receiver<Command>,
        mut listener_rx: mpsc::Receiver<(u64, ListenerEvent)>,
    ) {
        loop {
            let liveness_deadline = self.liveness_deadline;
            let retry_at = self.retry_at;

            tokio::select! {
                command = commands.recv() => match command {
                    Some(command) => self.handle_command(command).await,
                    None => break,
                },
                Some((attempt, event)) = listener_rx.recv() => {
                    self.handle_listener_event(attempt, event).await;
                }
                () = sleep_until_deadline(liveness_deadline), if liveness_deadline.is_some() => {
                    self.on_liveness_timeout().await;
                }
                () = sleep_until_deadline(retry_at), if retry_at.is_some() => {
                    self.on_retry_timer().await;
                }
            }
        }

        self.teardown().await;
    }

    async fn handle_command(&mut self, command: Command) {
        match command {
            Command::Connect { endpoint, reply } => {
                let result = self.connect(endpoint).await;
                let _ = reply.send(result);
            }
            Command::Disconnect { reply } => {
                self.disconnect().await;
                let _ = reply.send(());
            }
        }
    }

    async fn connect(&mut self, endpoint: Endpoint) -> Result<(), SessionError> {
        if self.session.state.is_active() {
            return match &self.session.endpoint {
                Some(current) if *current == endpoint => {
                    debug!(endpoint = %endpoint, state = %self.session.state, "Already connected");
                    Ok(())
                }
                Some(current) => Err(SessionError::EndpointInUse(current.to_string())),
                None => Err(SessionError::Internal("active session without endpoint".into())),
            };
        }

        info!(endpoint = %endpoint, "Starting session");
        self.session.reset(endpoint);
        self.start_attempt().await;
        Ok(())
    }

    async fn disconnect(&mut self) {
        let state = self.session.state;
        if matches!(state, ConnectionState::Idle | ConnectionState::Disconnected) {
            debug!(state = %state, "Disconnect ignored, no session");
            return;
        }

        self.stop_listener().await;
        self.liveness_deadline = None;
        self.retry_at = None;
        self.session.clear_heartbeat();
        self.session.retries = 0;
        self.transition(ConnectionState::Disconnected, None);
        info!("Session disconnected");

        if matches!(state, ConnectionState::Connecting | ConnectionState::Connected) {
            self.spawn_disconnect_request();
        }
    }

    /// Best-effort `Disconnect` in the background; failures are logged and
    /// never escalated.
    fn spawn_disconnect_request(&mut self) {
        let Some(endpoint) = self.session.endpoint.clone() else {
            return;
        };
        let transport = Arc::clone(&self.transport);
        let timeout = self.config.unary_timeout();

        self.pending_requests.retain(|request| !request.is_finished());
        self.pending_requests.push(tokio::spawn(async move {
            let call = transport.call_unary(&endpoint, DisconnectRequest {}, timeout);
            match tokio::time::timeout(timeout, call).await {
                Ok(Ok(_)) => debug!(endpoint = %endpoint, "Daemon acknowledged disconnect"),
                Ok(Err(e)) => {
                    warn!(endpoint = %endpoint, error = %e, "Disconnect request not delivered");
                }
                Err(_) => warn!(endpoint = %endpoint, ?timeout, "Disconnect request timed out"),
            }
        }));
    }

    /// Open a fresh stream. The previous listener, if any, is gone before this returns.
    async fn start_attempt(&mut self) {
        self.stop_listener().await;
        self.retry_at = None;

        let Some(endpoint) = self.session.endpoint.clone() else {
            return;
        };

        self.attempt += 1;
        self.session.clear_heartbeat();
        self.liveness_deadline = Some(Instant::now() + self.config.liveness_window());
        self.transition(ConnectionState::Connecting, None);

        debug!(endpoint = %endpoint, attempt = self.attempt, "Opening session stream");
        let listener = listen(
            Arc::clone(&self.transport),
            endpoint,
            self.attempt,
            self.listener_tx.clone(),
        );
        self.listener = Some(tokio::spawn(listener));
    }

    /// Cancel the listener and wait until its stream has been dropped.
    async fn stop_listener(&mut self) {
        if let Some(listener) = self.listener.take() {
            listener.abort();
            let _ = listener.await;
        }
    }

    async fn handle_listener_event(&mut self, attempt: u64, event: ListenerEvent) {
        if attempt != self.attempt || self.listener.is_none() {
            debug!(attempt, current = self.attempt, ?event, "Dropping event from stale listener");
            return;
        }

        match event {
            ListenerEvent::Opened => {
                debug!(attempt, "Session stream open, waiting for first heartbeat");
            }
            ListenerEvent::Frame(update) => self.on_update(update),
            ListenerEvent::Failed(err) => self.fail_attempt(err.into()).await,
            ListenerEvent::Closed => {
                self.fail_attempt(SessionError::Unavailable("stream closed by daemon".into()))
                    .await;
            }
        }
    }

    fn on_update(&mut self, update: Update) {
        if let Update::Heartbeat { seq } = update {
            let now = Instant::now();
            match self.session.state {
                ConnectionState::Connecting => {
                    self.session.record_heartbeat(seq, now);
                    self.session.retries = 0;
                    self.liveness_deadline = Some(now + self.config.liveness_window());
                    self.transition(ConnectionState::Connected, None);
                }
                ConnectionState::Connected => {
                    if self.session.record_heartbeat(seq, now) {
                        self.liveness_deadline = Some(now + self.config.liveness_window());
                        self.publish_snapshot();
                    } else {
                        debug!(seq, last_seq = ?self.session.last_seq, "Ignoring stale heartbeat");
                    }
                }
                _ => return,
            }
        }

        if self.session.state.is_active() {
            self.emit(SessionEvent::Update { update });
        }
    }

    async fn on_liveness_timeout(&mut self) {
        self.liveness_deadline = None;
        let window = self.config.liveness_window();
        let error = match self.session.state {
            ConnectionState::Connected => {
                SessionError::Timeout(format!("no heartbeat within {window:?}"))
            }
            ConnectionState::Connecting => {
                SessionError::Timeout(format!("no first heartbeat within {window:?}"))
            }
            _ => return,
        };
        self.fail_attempt(error).await;
    }

    async fn on_retry_timer(&mut self) {
        self.retry_at = None;
        if self.session.state == ConnectionState::Reconnecting {
            self.start_attempt().await;
        }
    }

    /// The current attempt is over: retry, give up, or stop.
    async fn fail_attempt(&mut self, error: SessionError) {
        self.stop_listener().await;
        self.liveness_deadline = None;

        if !error.is_retryable() {
            info!(error = %error, "Session stream ended without retry");
            self.transition(ConnectionState::Disconnected, Some(error));
            return;
        }

        if let SessionError::MalformedMessage(detail) = &error {
            warn!(detail = %detail, "Corrupt frame on session stream, reconnecting");
        }

        if self.session.retries >= self.config.max_retries {
            warn!(retries = self.session.retries, error = %error, "Reconnection attempts exhausted");
            let exhausted = SessionError::RetriesExhausted {
                retries: self.session.retries,
                last_error: error.to_string(),
            };
            self.retry_at = None;
            self.transition(ConnectionState::Failed, Some(exhausted));
            return;
        }

        self.session.retries += 1;
        let delay = self.backoff.delay(self.session.retries);
        self.retry_at = Some(Instant::now() + delay);
        warn!(
            retry = self.session.retries,
            max_retries = self.config.max_retries,
            delay_ms = delay.as_millis(),
            error = %error,
            "Session interrupted, reconnecting"
        );
        self.transition(ConnectionState::Reconnecting, Some(error));
    }

    fn transition(&mut self, to: ConnectionState, error: Option<SessionError>) {
        let from = self.session.state;
        if from == to {
            return;
        }
        self.session.state = to;
        self.session.last_error.clone_from(&error);
        info!(from = %from, to = %to, "Session state changed");
        self.publish_snapshot();
        self.emit(SessionEvent::StateChanged { from, to, error });
    }

    fn publish_snapshot(&self) {
        self.snapshot.send_replace(self.session.snapshot());
    }

    fn emit(&self, event: SessionEvent) {
        // No subscribers is fine.
        let _ = self.events.send(event);
    }

    async fn teardown(&mut self) {
        let state = self.session.state;
        self.stop_listener().await;
        self.liveness_deadline = None;
        self.retry_at = None;

        if matches!(state, ConnectionState::Connecting | ConnectionState::Connected) {
            self.spawn_disconnect_request();
        }
        for request in self.pending_requests.drain(..) {
            let _ = request.await;
        }
        debug!("Session task stopped");
    }
}

/// Listener for one connection attempt: opens the stream and forwards it.
async fn listen(
    transport: Arc<dyn Transport>,
    endpoint: Endpoint,
    attempt: u64,
    events: mpsc::Sender<(u64, ListenerEvent)>,
) {
    let mut stream = match transport.open_stream(&endpoint, ConnectRequest {}).await {
        Ok(stream) => stream,
        Err(e) => {
            let _ = events.send((attempt, ListenerEvent::Failed(e))).await;
            return;
        }
    };

    if events.send((attempt, ListenerEvent::Opened)).await.is_err() {
        return;
    }

    while let Some(frame) = stream.next().await {
        let event = match frame {
            Ok(update) => ListenerEvent::Frame(update),
            Err(e) => {
                let _ = events.send((attempt, ListenerEvent::Failed(e))).await;
                return;
            }
        };
        if events.send((attempt, event)).await.is_err() {
            return;
        }
    }

    let _ = events.send((attempt, ListenerEvent::Closed)).await;
}
