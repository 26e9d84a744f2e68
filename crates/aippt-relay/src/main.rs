//! `aippt-relay` binary entrypoint.
//!
//! Resolves configuration from flags and environment variables, then starts
//! the Actix server.

use aippt_relay::{serve, RelayArgs};
use clap::Parser;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Respect `RUST_LOG` if set; otherwise default to relay-friendly info.
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .init();

    let config = RelayArgs::parse().into_config()?;
    serve(config).await
}
