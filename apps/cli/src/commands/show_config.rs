//! Config command implementation.

use djtool_core::Config;

/// Print the effective configuration as TOML or JSON.
pub fn execute(config: &Config, json_output: bool) -> anyhow::Result<()> {
    let rendered = if json_output {
        serde_json::to_string_pretty(config)?
    } else {
        toml::to_string_pretty(config)?
    };
    println!("{rendered}");
    Ok(())
}
