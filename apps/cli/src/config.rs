//! CLI configuration loading.

use std::path::Path;

use anyhow::Context;
use djtool_core::Config;

/// Load the effective configuration.
///
/// Precedence:
/// 1. CLI arguments (applied by each command)
/// 2. `--config <path>`
/// 3. `DJTOOL_CONFIG` and `DJTOOL_ADDRESS`
/// 4. Defaults
pub fn load_config(path: Option<&Path>) -> anyhow::Result<Config> {
    match path {
        Some(path) => Config::from_file(path)
            .with_context(|| format!("failed to load config from {}", path.display())),
        None => Config::load().context("failed to load configuration"),
    }
}
