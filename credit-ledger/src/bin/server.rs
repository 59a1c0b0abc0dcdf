//! Credit ledger server binary

use credit_ledger::{Config, CreditLedger};
use std::error::Error;

#[tokio::main]
async fn main() -> Result<(), Box<dyn Error>> {
    // Initialize tracing
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive(tracing::Level::INFO.into()),
        )
        .init();

    tracing::info!("Starting Tessera credit ledger");

    // Load configuration
    let config = match std::env::var("CREDIT_LEDGER_CONFIG") {
        Ok(path) => Config::from_file(path)?,
        Err(_) => Config::from_env()?,
    };

    // Open ledger
    let _ledger = CreditLedger::open(config)?;
    tracing::info!("Ledger opened successfully");

    tokio::signal::ctrl_c().await?;

    tracing::info!("Shutting down credit ledger");
    Ok(())
}
