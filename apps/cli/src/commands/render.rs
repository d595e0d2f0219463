//! Human-readable rendering of session events and snapshots.

use colored::{ColoredString, Colorize};
use djtool_core::{ConnectionState, SessionEvent, SessionSnapshot, Update};

/// Colored state label.
pub fn state_label(state: ConnectionState) -> ColoredString {
    let label = state.to_string();
    match state {
        ConnectionState::Connected => label.green().bold(),
        ConnectionState::Connecting | ConnectionState::Reconnecting => label.yellow(),
        ConnectionState::Failed => label.red().bold(),
        ConnectionState::Idle | ConnectionState::Disconnected => label.dimmed(),
    }
}

/// One line describing `event`.
pub fn event_line(event: &SessionEvent) -> String {
    match event {
        SessionEvent::StateChanged { from, to, error } => {
            let mut line = format!("{} -> {}", state_label(*from), state_label(*to));
            if let Some(error) = error {
                line.push_str(&format!("  ({})", error.to_string().red()));
            }
            line
        }
        SessionEvent::Update { update: Update::Heartbeat { seq } } => {
            format!("{} seq={}", "heartbeat".cyan(), seq)
        }
        SessionEvent::Update { update: Update::NotSet } => {
            format!("{}", "update (no payload)".dimmed())
        }
    }
}

/// Multi-line summary of a snapshot.
pub fn snapshot_lines(snapshot: &SessionSnapshot) -> Vec<String> {
    let endpoint = snapshot.endpoint.as_ref().map_or_else(|| "-".to_string(), ToString::to_string);
    let mut lines = vec![
        format!("  Endpoint: {}", endpoint),
        format!("  State: {}", state_label(snapshot.state)),
        format!(
            "  Last heartbeat: {}",
            snapshot.last_seq.map_or_else(|| "-".to_string(), |seq| seq.to_string())
        ),
    ];
    if let Some(seen) = snapshot.last_seen_at {
        lines.push(format!("  Seen at: {}", seen.to_rfc3339()));
    }
    lines.push(format!("  Retries: {}", snapshot.retries));
    if let Some(error) = &snapshot.last_error {
        lines.push(format!("  Last error: {}", error.to_string().red()));
    }
    lines
}
