//! Status command implementation.

use std::sync::Arc;
use std::time::Duration;

use colored::Colorize;
use djtool_core::{Config, ConnectionState, GrpcTransport, SessionManager, SessionSnapshot};

use super::render;

/// Execute the status command.
///
/// Opens a session, waits for the first heartbeat (or a definitive failure),
/// reports the snapshot and disconnects. Fails unless the daemon answered.
pub async fn execute(
    config: Config,
    url: Option<String>,
    timeout_ms: u64,
    json_output: bool,
) -> anyhow::Result<()> {
    let endpoint = super::resolve_endpoint(&config, url.as_deref())?;
    let manager = SessionManager::new(Arc::new(GrpcTransport::new()), config.session.clone());
    let mut watch = manager.watch();
    manager.connect(endpoint).await?;

    let settled = tokio::time::timeout(Duration::from_millis(timeout_ms), async {
        loop {
            let state = watch.borrow_and_update().state;
            if matches!(state, ConnectionState::Connected | ConnectionState::Failed) {
                return;
            }
            if watch.changed().await.is_err() {
                return;
            }
        }
    })
    .await;

    let snapshot = manager.snapshot();
    manager.shutdown().await;

    if json_output {
        println!("{}", serde_json::to_string_pretty(&snapshot)?);
    } else {
        print_human(&snapshot, settled.is_err());
    }

    anyhow::ensure!(
        snapshot.state == ConnectionState::Connected,
        "daemon did not answer with a heartbeat (state {})",
        snapshot.state
    );
    Ok(())
}

fn print_human(snapshot: &SessionSnapshot, timed_out: bool) {
    println!("{}", "djtool Status".bold().cyan());
    println!();
    for line in render::snapshot_lines(snapshot) {
        println!("{line}");
    }
    if timed_out {
        println!("  {}", "Timed out waiting for the first heartbeat".yellow());
    }
}
