//! Error types for the reconciler

use thiserror::Error;

/// Result type for reconciler operations
pub type Result<T> = std::result::Result<T, Error>;

/// Reconciler errors
#[derive(Error, Debug)]
pub enum Error {
    /// Ledger error
    #[error("Ledger error: {0}")]
    Ledger(#[from] credit_ledger::Error),

    /// Invalid configuration
    #[error("Invalid configuration: {0}")]
    Config(String),

    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}
