//! llm-engineering CLI entry point.
//!
//! Initializes logging and delegates to the CLI module for pipeline dispatch.

use tracing_subscriber::{fmt, prelude::*, EnvFilter};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = llm_engineering::cli::parse_cli();

    // RUST_LOG takes precedence over --log-level
    let log_filter = std::env::var("RUST_LOG").unwrap_or_else(|_| cli.log_level.clone());

    tracing_subscriber::registry()
        .with(fmt::layer())
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&log_filter)))
        .init();

    llm_engineering::cli::run_with_cli(cli).await
}
