//! Tessera Credit Ledger
//!
//! Tenant-isolated, append-only accounting of fungible credit balances in
//! integer micro-units.
//!
//! # Architecture
//!
//! - **Lot-based balances**: every funding event is a lot, trisected into
//!   available / reserved / consumed portions
//! - **Reservation state machine**: reserve → finalize/release/expire, with
//!   terminal states that absorb
//! - **Append-only journal**: every partition change is explained by one
//!   immutable, hash-chained entry in the same commit
//! - **Explicit tenancy**: a tenant is a value threaded through every call,
//!   never ambient state; storage keys are tenant-prefixed
//!
//! # Invariants
//!
//! - Lot conservation: `available + reserved + consumed == original`, always
//! - Account/platform conservation: credit accounted never exceeds credit
//!   minted
//! - Journal continuity: per-(account, pool) sequences are gapless and the
//!   hash chain is intact
//! - Atomicity: balance-affecting operations fully succeed or leave no
//!   observable change

#![forbid(unsafe_code)]
#![warn(missing_docs, rust_2018_idioms, unused_qualifications)]

pub mod config;
pub mod crypto;
pub mod error;
pub mod journal;
pub mod ledger;
pub mod lots;
pub mod memory;
pub mod metrics;
pub mod registry;
pub mod reservation;
pub mod storage;
pub mod store;
pub mod tenant;
pub mod types;

// Re-exports
pub use config::Config;
pub use error::{Error, Result};
pub use ledger::CreditLedger;
pub use store::{JournalHead, LedgerStore, WriteSet};
pub use tenant::TenantLedger;
pub use types::{
    Account, AccountId, Balance, CreditLot, EntityRef, EntityType, EntryType, LedgerEntry,
    LotAllocation, LotId, MicroUnits, PoolId, Reservation, ReservationId, ReservationStatus,
    SourceType, TenantId, Transfer,
};
