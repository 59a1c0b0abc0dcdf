//! Error types for the credit ledger

use crate::types::{MicroUnits, ReservationStatus};
use thiserror::Error;

/// Result type for ledger operations
pub type Result<T> = std::result::Result<T, Error>;

/// Ledger errors
#[derive(Error, Debug)]
pub enum Error {
    /// No tenant bound before a ledger operation; fatal to the calling
    /// request, not retryable without rebinding
    #[error("No tenant context bound for this operation")]
    TenantContextMissing,

    /// Requested reserve amount exceeds summed available lots; no mutation
    /// occurred
    #[error("Insufficient balance: requested {requested}, available {available}")]
    InsufficientBalance {
        /// Amount the caller asked for
        requested: MicroUnits,
        /// Total available across lots at the time of the attempt
        available: MicroUnits,
    },

    /// Operation attempted against a reservation not in the required state;
    /// no mutation occurred
    #[error("Invalid reservation state: expected pending, found {0}")]
    InvalidState(ReservationStatus),

    /// Mint retried with a source already recorded under a different amount.
    /// (A retry with the same amount is an idempotent no-op, not an error.)
    #[error("Duplicate source {source_type}:{source_id}")]
    DuplicateSource {
        /// Source discriminator
        source_type: &'static str,
        /// External dedup key
        source_id: String,
    },

    /// Concurrent writers raced for the same rows; safe to retry the whole
    /// operation from scratch
    #[error("Write conflict: {0}")]
    Conflict(String),

    /// Finalize amount greater than what was reserved; no mutation occurred
    #[error("Finalize amount {requested} exceeds reserved {reserved}")]
    AmountExceedsReserved {
        /// Amount the caller tried to finalize
        requested: MicroUnits,
        /// Amount actually held by the reservation
        reserved: MicroUnits,
    },

    /// Negative mint or non-positive reserve/transfer amount
    #[error("Invalid amount: {0}")]
    InvalidAmount(String),

    /// Malformed pool or entity identifier
    #[error("Invalid identifier: {0}")]
    InvalidIdentifier(String),

    /// Account not found
    #[error("Account not found: {0}")]
    AccountNotFound(String),

    /// Reservation not found
    #[error("Reservation not found: {0}")]
    ReservationNotFound(String),

    /// Lot not found
    #[error("Lot not found: {0}")]
    LotNotFound(String),

    /// Ledger entry not found
    #[error("Ledger entry not found: {0}")]
    EntryNotFound(String),

    /// Invariant violation (lot conservation, journal continuity, etc.).
    /// Indicates a bug, never an expected outcome.
    #[error("Invariant violation: {0}")]
    InvariantViolation(String),

    /// Storage error (RocksDB)
    #[error("Storage error: {0}")]
    Storage(String),

    /// Serialization error
    #[error("Serialization error: {0}")]
    Serialization(#[from] bincode::Error),

    /// Configuration error
    #[error("Configuration error: {0}")]
    Config(String),

    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl From<rocksdb::Error> for Error {
    fn from(err: rocksdb::Error) -> Self {
        Error::Storage(err.to_string())
    }
}
