//! ELM327 Dashboard - Main Entry Point

use anyhow::Context;
use api::{init_logging, run_server, AppConfig};
use tracing::info;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let path = std::env::args().nth(1);
    let config = AppConfig::load(path.as_deref()).context("failed to load configuration")?;
    init_logging(&config.logging).context("failed to initialize logging")?;

    info!("=== ELM327 Dashboard v{} ===", env!("CARGO_PKG_VERSION"));
    run_server(config).await?;

    Ok(())
}
