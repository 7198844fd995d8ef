//! Retether console probe entry point.

mod app;

use clap::Parser;
use tracing_subscriber::EnvFilter;

fn main() -> anyhow::Result<()> {
    // Initialize structured logging.
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn")),
        )
        .init();

    let args = app::Args::parse();

    tracing::info!(
        version = env!("CARGO_PKG_VERSION"),
        "starting Retether probe"
    );

    // Build and run the tokio runtime.
    let rt = tokio::runtime::Runtime::new()?;
    rt.block_on(app::run(args))?;

    tracing::info!("probe shut down cleanly");
    Ok(())
}
