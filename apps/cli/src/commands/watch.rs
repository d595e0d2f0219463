//! Watch command implementation.
//!
//! Runs a session against the daemon and prints every event of its feed.

use std::sync::Arc;

use anyhow::anyhow;
use djtool_core::{
    Config, ConnectionState, GrpcTransport, SessionEvent, SessionManager, Subscription,
};
use tracing::debug;

use super::render;

/// Options of the watch command.
#[derive(Debug, Default)]
pub struct WatchOptions {
    pub url: Option<String>,
    pub options: Vec<(String, String)>,
    pub count: Option<usize>,
    pub liveness_window_ms: Option<u64>,
    pub max_retries: Option<u32>,
    pub json: bool,
}

/// Parse a `key=value` endpoint option.
pub fn parse_option(raw: &str) -> Result<(String, String), String> {
    match raw.split_once('=') {
        Some((key, value)) if !key.is_empty() => Ok((key.to_string(), value.to_string())),
        _ => Err(format!("expected key=value, got {raw:?}")),
    }
}

/// Execute the watch command.
pub async fn execute(config: Config, options: WatchOptions) -> anyhow::Result<()> {
    let mut session = config.session.clone();
    if let Some(window) = options.liveness_window_ms {
        session.liveness_window_ms = window;
    }
    if let Some(max_retries) = options.max_retries {
        session.max_retries = max_retries;
    }
    session.validate()?;

    let mut endpoint = super::resolve_endpoint(&config, options.url.as_deref())?;
    for (key, value) in options.options {
        endpoint = endpoint.with_option(key, value);
    }

    let manager = SessionManager::new(Arc::new(GrpcTransport::new()), session);
    let mut events = manager.subscribe();
    manager.connect(endpoint).await?;

    let outcome = follow(&mut events, options.count, options.json).await;
    manager.shutdown().await;
    outcome
}

/// Print events until the session ends, `count` updates were seen, or Ctrl-C.
async fn follow(events: &mut Subscription, count: Option<usize>, json: bool) -> anyhow::Result<()> {
    let ctrl_c = tokio::signal::ctrl_c();
    tokio::pin!(ctrl_c);
    let mut updates = 0usize;

    loop {
        let event = tokio::select! {
            event = events.recv() => event,
            _ = &mut ctrl_c => {
                debug!("Interrupted");
                return Ok(());
            }
        };
        let Some(event) = event else {
            return Ok(());
        };

        print_event(&event, json)?;

        match event {
            SessionEvent::Update { .. } => {
                updates += 1;
                if count.is_some_and(|count| updates >= count) {
                    return Ok(());
                }
            }
            SessionEvent::StateChanged { to: ConnectionState::Failed, error, .. } => {
                let reason = error.map_or_else(|| "unknown error".to_string(), |e| e.to_string());
                return Err(anyhow!("session failed: {reason}"));
            }
            SessionEvent::StateChanged { to: ConnectionState::Disconnected, .. } => return Ok(()),
            SessionEvent::StateChanged { .. } => {}
        }
    }
}

fn print_event(event: &SessionEvent, json: bool) -> anyhow::Result<()> {
    if json {
        println!("{}", serde_json::to_string(event)?);
    } else {
        println!("{}", render::event_line(event));
    }
    Ok(())
}
