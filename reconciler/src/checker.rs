//! Conservation checker
//!
//! Offline verifier of the ledger's cross-row invariants. Runs against
//! current storage contents, never inside a live transaction, and only
//! reports; it mutates nothing. Single-row invariants are enforced inline
//! at write time; the checks here are the ones that span lots, reservations
//! and the journal, which would serialize unrelated accounts if evaluated on
//! every write.

use crate::{
    types::{CheckReport, CheckStatus, Divergence, ReconcileReport},
    Result,
};
use chrono::Utc;
use credit_ledger::{crypto, AccountId, LedgerStore, LotId, PoolId, ReservationStatus, TenantId};
use std::collections::{HashMap, HashSet};
use std::sync::Arc;

/// Stable names of every check the reconciler runs
pub const CHECK_NAMES: &[&str] = &[
    "lot_conservation",
    "account_conservation",
    "platform_conservation",
    "reservation_allocations",
    "terminal_reservations",
    "minted_vs_journal",
    "journal_continuity",
    "idempotency_uniqueness",
];

/// Read-only invariant verifier
pub struct ConservationChecker {
    store: Arc<dyn LedgerStore>,
}

impl ConservationChecker {
    /// Create a checker over a ledger store
    pub fn new(store: Arc<dyn LedgerStore>) -> Self {
        Self { store }
    }

    /// Evaluate every check against current storage contents
    pub fn run(&self) -> Result<ReconcileReport> {
        let mut divergences = Vec::new();
        let mut platform_original: i128 = 0;
        let mut platform_accounted: i128 = 0;

        for tenant in self.store.tenants()? {
            self.check_tenant(
                &tenant,
                &mut divergences,
                &mut platform_original,
                &mut platform_accounted,
            )?;
        }

        if platform_accounted > platform_original {
            divergences.push(Divergence {
                check_name: "platform_conservation".to_string(),
                tenant: "*".to_string(),
                message: format!(
                    "platform accounted {} exceeds platform minted {}",
                    platform_accounted, platform_original
                ),
            });
        }

        let checks = CHECK_NAMES
            .iter()
            .map(|name| {
                let failures = divergences
                    .iter()
                    .filter(|d| d.check_name == *name)
                    .count();
                CheckReport {
                    check_name: name.to_string(),
                    status: if failures == 0 {
                        CheckStatus::Passed
                    } else {
                        CheckStatus::Failed
                    },
                    details: if failures == 0 {
                        "ok".to_string()
                    } else {
                        format!("{} divergences", failures)
                    },
                }
            })
            .collect();

        let report = ReconcileReport {
            checks,
            divergences,
            ran_at: Utc::now(),
        };

        tracing::info!(
            passed = report.passed(),
            divergences = report.divergences.len(),
            "Reconciliation run complete"
        );

        Ok(report)
    }

    fn check_tenant(
        &self,
        tenant: &TenantId,
        divergences: &mut Vec<Divergence>,
        platform_original: &mut i128,
        platform_accounted: &mut i128,
    ) -> Result<()> {
        let mut push = |check: &str, message: String| {
            divergences.push(Divergence {
                check_name: check.to_string(),
                tenant: tenant.to_string(),
                message,
            });
        };

        let lots = self.store.lots(tenant)?;
        let reservations = self.store.reservations(tenant)?;
        let heads = self.store.journal_heads(tenant)?;

        // Per-lot conservation, per-account and platform bounds
        let mut per_account: HashMap<AccountId, (i128, i128)> = HashMap::new();
        for lot in &lots {
            if let Err(e) = lot.validate() {
                push("lot_conservation", e.to_string());
            }
            let accounted =
                lot.available.raw() + lot.reserved.raw() + lot.consumed.raw();
            let entry = per_account.entry(lot.account_id).or_insert((0, 0));
            entry.0 += lot.original.raw();
            entry.1 += accounted;
            *platform_original += lot.original.raw();
            *platform_accounted += accounted;
        }
        for (account, (original, accounted)) in &per_account {
            // The bound is deliberately <=: a shortfall may be carried by a
            // receivable outside this ledger, an excess never may
            if accounted > original {
                push(
                    "account_conservation",
                    format!(
                        "account {} accounts for {} out of {} minted",
                        account, accounted, original
                    ),
                );
            }
        }

        // Reservation internals and the pending-hold / lot-reserved match
        let lots_by_id: HashMap<LotId, &credit_ledger::CreditLot> =
            lots.iter().map(|lot| (lot.id, lot)).collect();
        let mut pending_held: HashMap<LotId, i128> = HashMap::new();
        for reservation in &reservations {
            let allocated: i128 = reservation
                .allocations
                .iter()
                .map(|a| a.amount.raw())
                .sum();
            if allocated != reservation.amount.raw() {
                push(
                    "reservation_allocations",
                    format!(
                        "reservation {} allocates {} of {}",
                        reservation.id, allocated, reservation.amount
                    ),
                );
            }

            let terminal = reservation.status.is_terminal();
            if terminal && reservation.resolved_at.is_none() {
                push(
                    "terminal_reservations",
                    format!(
                        "reservation {} is {} but records no resolution time",
                        reservation.id, reservation.status
                    ),
                );
            }
            if !terminal && reservation.resolved_at.is_some() {
                push(
                    "terminal_reservations",
                    format!("reservation {} is pending but records a resolution", reservation.id),
                );
            }

            if reservation.status == ReservationStatus::Pending {
                for alloc in &reservation.allocations {
                    if !lots_by_id.contains_key(&alloc.lot_id) {
                        push(
                            "reservation_allocations",
                            format!(
                                "reservation {} holds against missing lot {}",
                                reservation.id, alloc.lot_id
                            ),
                        );
                    }
                    *pending_held.entry(alloc.lot_id).or_insert(0) += alloc.amount.raw();
                }
            }
        }
        for lot in &lots {
            let held = pending_held.get(&lot.id).copied().unwrap_or(0);
            if lot.reserved.raw() != held {
                push(
                    "reservation_allocations",
                    format!(
                        "lot {} reserves {} but pending holds sum to {}",
                        lot.id,
                        lot.reserved.raw(),
                        held
                    ),
                );
            }
        }

        // Journal: continuity, key uniqueness, and the mint record
        let mut seen_keys: HashSet<String> = HashSet::new();
        let mut minted_by_pool: HashMap<(AccountId, PoolId), i128> = HashMap::new();
        for (account, pool, head) in &heads {
            let entries = self.store.entries_for_pool(tenant, *account, pool)?;
            if let Err(message) = crypto::verify_chain(&entries, head) {
                push("journal_continuity", message);
            }
            for entry in &entries {
                if !seen_keys.insert(entry.idempotency_key.clone()) {
                    push(
                        "idempotency_uniqueness",
                        format!("idempotency key {} appears twice", entry.idempotency_key),
                    );
                }
                if entry.entry_type.is_mint() {
                    *minted_by_pool.entry((*account, pool.clone())).or_insert(0) +=
                        entry.amount.raw();
                }
            }
        }

        // Every pool's lot originals must equal what the journal says was
        // minted there; a mutated original surfaces here
        let mut original_by_pool: HashMap<(AccountId, PoolId), i128> = HashMap::new();
        for lot in &lots {
            *original_by_pool
                .entry((lot.account_id, lot.pool_id.clone()))
                .or_insert(0) += lot.original.raw();
        }
        let pools: HashSet<(AccountId, PoolId)> = original_by_pool
            .keys()
            .chain(minted_by_pool.keys())
            .cloned()
            .collect();
        for key in pools {
            let original = original_by_pool.get(&key).copied().unwrap_or(0);
            let minted = minted_by_pool.get(&key).copied().unwrap_or(0);
            if original != minted {
                push(
                    "minted_vs_journal",
                    format!(
                        "account {} pool {} holds lot originals of {} but the journal minted {}",
                        key.0, key.1, original, minted
                    ),
                );
            }
        }

        Ok(())
    }
}
