//! Command implementations for the djtool CLI.

pub mod render;
pub mod serve;
pub mod show_config;
pub mod status;
pub mod watch;

use djtool_core::{Config, Endpoint};

/// Daemon endpoint from an explicit URL, or the configured server address.
pub fn resolve_endpoint(config: &Config, url: Option<&str>) -> anyhow::Result<Endpoint> {
    let url = url.map_or_else(|| format!("http://{}", config.server.address), ToString::to_string);
    Ok(Endpoint::parse(url)?)
}
