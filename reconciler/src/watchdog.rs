//! Reservation expiry watchdog
//!
//! A reservation left pending beyond the policy window is orphaned (the
//! caller died without finalizing or releasing). This is the only path that
//! is allowed to call the engine's `expire`; caller-initiated cancellation
//! is the ordinary `release` operation.

use crate::{types::ExpirySweep, Result};
use chrono::{Duration, Utc};
use credit_ledger::{CreditLedger, Error as LedgerError, LedgerStore, ReservationStatus};
use std::sync::Arc;

/// Scans for orphaned pending reservations and expires them
pub struct ExpiryWatchdog {
    ledger: Arc<CreditLedger>,
    max_age: Duration,
}

impl ExpiryWatchdog {
    /// Create a watchdog with the given pending-age policy
    pub fn new(ledger: Arc<CreditLedger>, pending_max_age_secs: u64) -> Self {
        Self {
            ledger,
            max_age: Duration::seconds(pending_max_age_secs as i64),
        }
    }

    /// One sweep over every tenant's pending reservations
    pub fn run_once(&self) -> Result<ExpirySweep> {
        let store = self.ledger.store();
        let cutoff = Utc::now() - self.max_age;
        let mut sweep = ExpirySweep {
            scanned: 0,
            expired: 0,
        };

        for tenant in store.tenants()? {
            let scoped = self.ledger.tenant(tenant.clone());
            for reservation in store.reservations(&tenant)? {
                if reservation.status != ReservationStatus::Pending {
                    continue;
                }
                sweep.scanned += 1;
                if reservation.created_at > cutoff {
                    continue;
                }

                match scoped.expire(reservation.id) {
                    Ok(_) => {
                        sweep.expired += 1;
                        tracing::warn!(
                            tenant = %tenant,
                            reservation = %reservation.id,
                            age_secs = (Utc::now() - reservation.created_at).num_seconds(),
                            "Expired orphaned reservation"
                        );
                    }
                    // The caller resolved it between the scan and the expire
                    Err(LedgerError::InvalidState(_)) => {}
                    Err(e) => return Err(e.into()),
                }
            }
        }

        Ok(sweep)
    }
}
