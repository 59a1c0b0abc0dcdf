//! Reconciler daemon binary

use reconciler::{Config, Reconciler};
use std::sync::Arc;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialize tracing
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive(tracing::Level::INFO.into()),
        )
        .init();

    tracing::info!("Starting credit ledger reconciler");

    // Load configuration
    let config = match std::env::var("RECONCILER_CONFIG") {
        Ok(path) => Config::from_file(path)?,
        Err(_) => Config::from_env()?,
    };

    let reconciler = Arc::new(Reconciler::open(config)?);

    tokio::select! {
        result = reconciler.start() => result?,
        _ = tokio::signal::ctrl_c() => {
            tracing::info!("Shutting down reconciler");
        }
    }

    Ok(())
}
