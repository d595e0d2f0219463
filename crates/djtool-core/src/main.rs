//! djtool daemon - Entry Point
//!
//! This binary starts the djtool daemon endpoint.

use tracing::error;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use djtool_core::{config::Config, server};

#[tokio::main]
async fn main() {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "djtool_core=debug,info".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let config = match Config::load() {
        Ok(config) => config,
        Err(e) => {
            error!(error = %e, "Failed to load configuration");
            std::process::exit(1);
        }
    };

    if let Err(e) = server::run(&config).await {
        error!(error = %e, "Daemon error");
        std::process::exit(1);
    }
}
