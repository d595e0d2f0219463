//! Serve command implementation.

use std::net::SocketAddr;

use colored::Colorize;
use djtool_core::{Config, server};

/// Command-line overrides for `[server]`.
#[derive(Debug, Default)]
pub struct ServeOverrides {
    pub address: Option<SocketAddr>,
    pub web_address: Option<SocketAddr>,
    pub no_grpc_web: bool,
    pub heartbeat_interval_ms: Option<u64>,
}

impl ServeOverrides {
    fn apply(self, config: &mut Config) -> anyhow::Result<()> {
        if let Some(address) = self.address {
            config.server.address = address;
        }
        if let Some(web_address) = self.web_address {
            config.server.web_address = Some(web_address);
        }
        if self.no_grpc_web {
            config.server.enable_grpc_web = false;
        }
        if let Some(interval) = self.heartbeat_interval_ms {
            anyhow::ensure!(interval > 0, "--heartbeat-interval-ms must be non-zero");
            config.server.heartbeat_interval_ms = interval;
        }
        Ok(())
    }
}

/// Execute the serve command: run the daemon until Ctrl-C.
pub async fn execute(mut config: Config, overrides: ServeOverrides) -> anyhow::Result<()> {
    overrides.apply(&mut config)?;

    println!("{}", "djtool daemon".bold().cyan());
    println!("  gRPC: {}", config.server.address.to_string().green());
    if config.server.enable_grpc_web {
        let web = config.server.web_address.unwrap_or(config.server.address);
        println!("  gRPC-Web: {}", web.to_string().green());
    }
    println!("  Heartbeat: every {} ms", config.server.heartbeat_interval_ms);
    println!();

    server::run(&config).await?;
    Ok(())
}
