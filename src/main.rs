//! Single-room WebSocket Chat Relay - Entry Point
//!
//! Loads configuration from flags and environment, then serves the relay.

use clap::Parser;
use tracing_subscriber::EnvFilter;

use chat_relay::{server, Config};

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Initialize logging with environment filter
    // Use RUST_LOG env var to control log level
    // e.g., RUST_LOG=debug or RUST_LOG=chat_relay=trace,tower_http=debug
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new("chat_relay=info,tower_http=info")),
        )
        .init();

    let config = Config::parse();
    tracing::debug!("Configuration: {:?}", config);

    server::run(config).await?;
    Ok(())
}
