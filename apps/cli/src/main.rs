//! djtool CLI - Command-line interface for the djtool daemon channel
//!
//! This CLI provides a `djtool` command that runs the daemon endpoint and
//! watches a session against it.

mod commands;
mod config;

use std::net::SocketAddr;
use std::path::PathBuf;

use clap::{Parser, Subcommand};
use tracing::Level;
use tracing_subscriber::FmtSubscriber;

use commands::{serve, show_config, status, watch};

/// djtool CLI - daemon endpoint and session monitor
#[derive(Parser, Debug)]
#[command(
    name = "djtool",
    author,
    version,
    about = "djtool - local daemon channel",
    long_about = "Runs the djtool daemon endpoint and watches the heartbeat session between the UI and the daemon."
)]
struct Args {
    /// Log level (trace, debug, info, warn, error)
    #[arg(short, long, default_value = "info", global = true)]
    log_level: String,

    /// Configuration file (overrides DJTOOL_CONFIG)
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Run the daemon endpoint
    ///
    /// Serves `Connect` heartbeat streams and `Disconnect` over gRPC (and
    /// gRPC-Web when enabled) until Ctrl-C.
    Serve {
        /// Address to bind (overrides server.address)
        #[arg(long)]
        address: Option<SocketAddr>,

        /// Separate gRPC-Web address (overrides server.web_address)
        #[arg(long)]
        web_address: Option<SocketAddr>,

        /// Disable gRPC-Web
        #[arg(long)]
        no_grpc_web: bool,

        /// Heartbeat interval in milliseconds
        #[arg(long)]
        heartbeat_interval_ms: Option<u64>,
    },

    /// Open a session and print its event feed
    ///
    /// Stops on Ctrl-C, after `--count` updates, or when the session ends.
    Watch {
        /// Daemon URL (defaults to the configured server address)
        url: Option<String>,

        /// Endpoint option as key=value (repeatable)
        #[arg(short = 'o', long = "option", value_parser = watch::parse_option)]
        options: Vec<(String, String)>,

        /// Stop after this many updates
        #[arg(long)]
        count: Option<usize>,

        /// Liveness window in milliseconds
        #[arg(long)]
        liveness_window_ms: Option<u64>,

        /// Reconnection attempts before giving up
        #[arg(long)]
        max_retries: Option<u32>,

        /// Output events as JSON lines
        #[arg(long)]
        json: bool,
    },

    /// Check that a daemon answers with heartbeats
    Status {
        /// Daemon URL (defaults to the configured server address)
        url: Option<String>,

        /// How long to wait for the first heartbeat
        #[arg(long, default_value_t = 5_000)]
        timeout_ms: u64,

        /// Output as JSON
        #[arg(long)]
        json: bool,
    },

    /// Print the effective configuration
    Config {
        /// Output as JSON instead of TOML
        #[arg(long)]
        json: bool,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();

    let level = match args.log_level.as_str() {
        "trace" => Level::TRACE,
        "debug" => Level::DEBUG,
        "warn" => Level::WARN,
        "error" => Level::ERROR,
        _ => Level::INFO,
    };

    // Events go to stdout, logs to stderr.
    let subscriber = FmtSubscriber::builder()
        .with_max_level(level)
        .with_target(false)
        .with_writer(std::io::stderr)
        .finish();
    tracing::subscriber::set_global_default(subscriber)?;

    let config = config::load_config(args.config.as_deref())?;

    match args.command {
        Command::Serve { address, web_address, no_grpc_web, heartbeat_interval_ms } => {
            let overrides =
                serve::ServeOverrides { address, web_address, no_grpc_web, heartbeat_interval_ms };
            serve::execute(config, overrides).await?;
        }
        Command::Watch { url, options, count, liveness_window_ms, max_retries, json } => {
            let options =
                watch::WatchOptions { url, options, count, liveness_window_ms, max_retries, json };
            watch::execute(config, options).await?;
        }
        Command::Status { url, timeout_ms, json } => {
            status::execute(config, url, timeout_ms, json).await?;
        }
        Command::Config { json } => {
            show_config::execute(&config, json)?;
        }
    }

    Ok(())
}
