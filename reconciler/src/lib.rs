//! Credit Ledger Reconciler
//!
//! Out-of-band verification and liveness for the credit ledger.
//!
//! # Architecture
//!
//! The reconciler runs on an interval (e.g. every 5 minutes), never inside a
//! live ledger transaction:
//!
//! 1. **Watchdog**: expire reservations left pending beyond the policy
//!    window
//! 2. **Conservation checks**: evaluate every cross-row invariant against
//!    current storage contents
//! 3. **Report**: named check results plus every divergence found; advisory
//!    only, nothing is mutated by the checks
//!
//! # Example
//!
//! ```no_run
//! use reconciler::{Config, Reconciler};
//!
//! fn main() -> reconciler::Result<()> {
//!     let reconciler = Reconciler::open(Config::default())?;
//!
//!     let report = reconciler.run_once()?;
//!     println!("passed: {}, divergences: {}",
//!              report.passed(), report.divergences.len());
//!
//!     Ok(())
//! }
//! ```

#![forbid(unsafe_code)]
#![warn(missing_docs, rust_2018_idioms, unused_qualifications)]

pub mod checker;
pub mod config;
pub mod engine;
pub mod error;
pub mod types;
pub mod watchdog;

// Re-exports
pub use checker::{ConservationChecker, CHECK_NAMES};
pub use config::Config;
pub use engine::Reconciler;
pub use error::{Error, Result};
pub use types::{CheckReport, CheckStatus, Divergence, ExpirySweep, ReconcileReport};
pub use watchdog::ExpiryWatchdog;
