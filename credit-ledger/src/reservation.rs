//! Reservation engine
//!
//! The reserve → finalize/release/expire state machine. Every operation is
//! one atomic store commit: the lot partition moves, the reservation status
//! transition, and the journal append all land together or not at all.
//!
//! Concurrency: the engine holds a striped per-(tenant, account, pool) mutex
//! across each read-plan-commit cycle and carries expected row versions into
//! the commit, so two writers can never both observe and spend the same
//! available units. A conflicted attempt is retried from scratch a bounded
//! number of times, then surfaced as [`Error::Conflict`].

use crate::{
    journal::build_entry,
    store::{with_retry, Expected, LedgerStore, LockStripes, SourceClaim, WriteSet},
    types::{
        AccountId, CreditLot, EntryType, LotAllocation, LotId, MicroUnits, PoolId, Reservation,
        ReservationId, ReservationStatus, SourceType, TenantId, Transfer,
    },
    Error, Result,
};
use chrono::Utc;
use std::sync::Arc;
use uuid::Uuid;

/// Reserve / finalize / release / expire, plus account-to-account transfer
pub struct ReservationEngine {
    store: Arc<dyn LedgerStore>,
    stripes: Arc<LockStripes>,
    max_attempts: u32,
}

impl ReservationEngine {
    pub(crate) fn new(
        store: Arc<dyn LedgerStore>,
        stripes: Arc<LockStripes>,
        max_attempts: u32,
    ) -> Self {
        Self {
            store,
            stripes,
            max_attempts,
        }
    }

    /// Place a hold of `amount` against (account, pool), walking lots in
    /// FIFO order. Fails with [`Error::InsufficientBalance`] before any
    /// mutation if the summed available is short.
    pub fn reserve(
        &self,
        tenant: &TenantId,
        account: AccountId,
        pool: &PoolId,
        amount: MicroUnits,
    ) -> Result<Reservation> {
        if !amount.is_positive() {
            return Err(Error::InvalidAmount(format!(
                "reserve amount must be positive, got {}",
                amount
            )));
        }
        self.store
            .get_account(tenant, account)?
            .ok_or_else(|| Error::AccountNotFound(account.to_string()))?;

        let stripe = (tenant.clone(), account, pool.clone());
        with_retry(self.max_attempts, "reserve", || {
            self.stripes.with_locked(vec![stripe.clone()], || {
                let lots = self.store.lots_for_pool(tenant, account, pool)?;

                let mut total_available = MicroUnits::ZERO;
                for lot in &lots {
                    total_available = total_available
                        .checked_add(lot.available)
                        .ok_or_else(|| sum_overflow(account, pool))?;
                }
                if total_available < amount {
                    return Err(Error::InsufficientBalance {
                        requested: amount,
                        available: total_available,
                    });
                }

                let reservation_id = ReservationId::generate();
                let mut allocations = Vec::new();
                let mut lot_writes = Vec::new();
                let mut need = amount;

                for lot in lots {
                    if !need.is_positive() {
                        break;
                    }
                    if !lot.available.is_positive() {
                        continue;
                    }
                    let take = need.min(lot.available);
                    let prev_version = lot.version;

                    let mut next = lot;
                    next.available = next
                        .available
                        .checked_sub(take)
                        .ok_or_else(|| sum_overflow(account, pool))?;
                    next.reserved = next
                        .reserved
                        .checked_add(take)
                        .ok_or_else(|| sum_overflow(account, pool))?;
                    next.version += 1;
                    next.validate()?;

                    allocations.push(LotAllocation {
                        lot_id: next.id,
                        amount: take,
                    });
                    lot_writes.push((next, Expected::Version(prev_version)));
                    need = need
                        .checked_sub(take)
                        .ok_or_else(|| sum_overflow(account, pool))?;
                }

                debug_assert!(need.is_zero());

                let reservation = Reservation {
                    id: reservation_id,
                    account_id: account,
                    pool_id: pool.clone(),
                    amount,
                    status: ReservationStatus::Pending,
                    allocations,
                    version: 1,
                    created_at: Utc::now(),
                    resolved_at: None,
                };

                let head = self.store.journal_head(tenant, account, pool)?;
                let entry = build_entry(
                    &head,
                    account,
                    pool,
                    EntryType::Reserve,
                    negate(amount)?,
                    format!("reserve:{}", reservation_id),
                    Some(reservation_id.as_uuid()),
                );

                let writes = WriteSet {
                    lots: lot_writes,
                    reservations: vec![(reservation.clone(), Expected::Absent)],
                    entries: vec![entry],
                    ..WriteSet::default()
                };
                self.store.commit(tenant, writes)?;

                tracing::info!(
                    tenant = %tenant,
                    account = %account,
                    pool = %pool,
                    reservation = %reservation_id,
                    amount = %amount,
                    lots = reservation.allocations.len(),
                    "Reservation placed"
                );

                Ok(reservation)
            })
        })
    }

    /// Consume `amount` of a pending reservation. The consumed portion moves
    /// reserved → consumed proportionally across the allocated lots; any
    /// remainder moves back reserved → available. Transitions the
    /// reservation to `Finalized` (terminal).
    pub fn finalize(
        &self,
        tenant: &TenantId,
        reservation_id: ReservationId,
        amount: MicroUnits,
    ) -> Result<Reservation> {
        if amount.is_negative() {
            return Err(Error::InvalidAmount(format!(
                "finalize amount must be non-negative, got {}",
                amount
            )));
        }

        self.resolve(
            tenant,
            reservation_id,
            "finalize",
            move |reservation| {
                if amount > reservation.amount {
                    return Err(Error::AmountExceedsReserved {
                        requested: amount,
                        reserved: reservation.amount,
                    });
                }
                let shares = proportional_shares(&reservation.allocations, amount)?;
                Ok(Resolution {
                    status: ReservationStatus::Finalized,
                    entry_type: EntryType::Finalize,
                    entry_amount: negate(amount)?,
                    consumed_shares: shares,
                })
            },
        )
    }

    /// Return a pending reservation's entire hold to available (terminal
    /// `Released`). Caller-initiated cancellation is exactly this operation.
    pub fn release(&self, tenant: &TenantId, reservation_id: ReservationId) -> Result<Reservation> {
        self.resolve(tenant, reservation_id, "release", |reservation| {
            Ok(Resolution {
                status: ReservationStatus::Released,
                entry_type: EntryType::Release,
                entry_amount: MicroUnits::ZERO,
                consumed_shares: vec![MicroUnits::ZERO; reservation.allocations.len()],
            })
        })
    }

    /// Watchdog-driven variant of [`Self::release`]: identical lot movement,
    /// terminal status `Expired`.
    pub fn expire(&self, tenant: &TenantId, reservation_id: ReservationId) -> Result<Reservation> {
        self.resolve(tenant, reservation_id, "expire", |reservation| {
            Ok(Resolution {
                status: ReservationStatus::Expired,
                entry_type: EntryType::Expired,
                entry_amount: MicroUnits::ZERO,
                consumed_shares: vec![MicroUnits::ZERO; reservation.allocations.len()],
            })
        })
    }

    /// Shared terminal transition. `plan` inspects the pending reservation
    /// and decides how much of each allocation is consumed; everything not
    /// consumed returns to available.
    fn resolve(
        &self,
        tenant: &TenantId,
        reservation_id: ReservationId,
        op: &'static str,
        plan: impl Fn(&Reservation) -> Result<Resolution>,
    ) -> Result<Reservation> {
        let probe = self
            .store
            .get_reservation(tenant, reservation_id)?
            .ok_or_else(|| Error::ReservationNotFound(reservation_id.to_string()))?;
        let stripe = (tenant.clone(), probe.account_id, probe.pool_id.clone());

        with_retry(self.max_attempts, op, || {
            self.stripes.with_locked(vec![stripe.clone()], || {
                let reservation = self
                    .store
                    .get_reservation(tenant, reservation_id)?
                    .ok_or_else(|| Error::ReservationNotFound(reservation_id.to_string()))?;

                // Terminal states absorb: nothing transitions out of them
                if reservation.status.is_terminal() {
                    return Err(Error::InvalidState(reservation.status));
                }

                let resolution = plan(&reservation)?;
                debug_assert_eq!(
                    resolution.consumed_shares.len(),
                    reservation.allocations.len()
                );

                let mut lot_writes = Vec::new();
                for (alloc, consumed) in reservation
                    .allocations
                    .iter()
                    .zip(&resolution.consumed_shares)
                {
                    let lot = self
                        .store
                        .get_lot(tenant, alloc.lot_id)?
                        .ok_or_else(|| Error::LotNotFound(alloc.lot_id.to_string()))?;
                    let returned = alloc
                        .amount
                        .checked_sub(*consumed)
                        .ok_or_else(|| sum_overflow(lot.account_id, &lot.pool_id))?;
                    let prev_version = lot.version;

                    let mut next = lot;
                    next.reserved = next
                        .reserved
                        .checked_sub(alloc.amount)
                        .ok_or_else(|| sum_overflow(next.account_id, &next.pool_id))?;
                    next.consumed = next
                        .consumed
                        .checked_add(*consumed)
                        .ok_or_else(|| sum_overflow(next.account_id, &next.pool_id))?;
                    next.available = next
                        .available
                        .checked_add(returned)
                        .ok_or_else(|| sum_overflow(next.account_id, &next.pool_id))?;
                    next.version += 1;
                    next.validate()?;

                    lot_writes.push((next, Expected::Version(prev_version)));
                }

                let mut updated = reservation.clone();
                updated.status = resolution.status;
                updated.resolved_at = Some(Utc::now());
                updated.version += 1;

                let head = self
                    .store
                    .journal_head(tenant, reservation.account_id, &reservation.pool_id)?;
                let entry = build_entry(
                    &head,
                    reservation.account_id,
                    &reservation.pool_id,
                    resolution.entry_type,
                    resolution.entry_amount,
                    format!("{}:{}", op, reservation_id),
                    Some(reservation_id.as_uuid()),
                );

                let writes = WriteSet {
                    lots: lot_writes,
                    reservations: vec![(updated.clone(), Expected::Version(reservation.version))],
                    entries: vec![entry],
                    ..WriteSet::default()
                };
                self.store.commit(tenant, writes)?;

                tracing::info!(
                    tenant = %tenant,
                    reservation = %reservation_id,
                    status = %updated.status,
                    "Reservation resolved"
                );

                Ok(updated)
            })
        })
    }

    /// Move `amount` from one account's pool to another's in one commit:
    /// the source lots are debited FIFO (available → consumed), a fresh
    /// `TransferIn` lot is minted on the destination, and paired journal
    /// entries land on both sides.
    pub fn transfer(
        &self,
        tenant: &TenantId,
        from: AccountId,
        to: AccountId,
        pool: &PoolId,
        amount: MicroUnits,
    ) -> Result<Transfer> {
        if !amount.is_positive() {
            return Err(Error::InvalidAmount(format!(
                "transfer amount must be positive, got {}",
                amount
            )));
        }
        if from == to {
            return Err(Error::InvalidAmount(
                "transfer source and destination are the same account".to_string(),
            ));
        }
        for account in [from, to] {
            self.store
                .get_account(tenant, account)?
                .ok_or_else(|| Error::AccountNotFound(account.to_string()))?;
        }

        let stripes = vec![
            (tenant.clone(), from, pool.clone()),
            (tenant.clone(), to, pool.clone()),
        ];
        with_retry(self.max_attempts, "transfer", || {
            self.stripes.with_locked(stripes.clone(), || {
                let lots = self.store.lots_for_pool(tenant, from, pool)?;

                let mut total_available = MicroUnits::ZERO;
                for lot in &lots {
                    total_available = total_available
                        .checked_add(lot.available)
                        .ok_or_else(|| sum_overflow(from, pool))?;
                }
                if total_available < amount {
                    return Err(Error::InsufficientBalance {
                        requested: amount,
                        available: total_available,
                    });
                }

                let mut lot_writes = Vec::new();
                let mut need = amount;
                for lot in lots {
                    if !need.is_positive() {
                        break;
                    }
                    if !lot.available.is_positive() {
                        continue;
                    }
                    let take = need.min(lot.available);
                    let prev_version = lot.version;

                    let mut next = lot;
                    next.available = next
                        .available
                        .checked_sub(take)
                        .ok_or_else(|| sum_overflow(from, pool))?;
                    next.consumed = next
                        .consumed
                        .checked_add(take)
                        .ok_or_else(|| sum_overflow(from, pool))?;
                    next.version += 1;
                    next.validate()?;

                    lot_writes.push((next, Expected::Version(prev_version)));
                    need = need
                        .checked_sub(take)
                        .ok_or_else(|| sum_overflow(from, pool))?;
                }

                let transfer_id = Uuid::now_v7();
                let minted = CreditLot {
                    id: LotId::generate(),
                    account_id: to,
                    pool_id: pool.clone(),
                    source_type: SourceType::TransferIn,
                    source_id: transfer_id.to_string(),
                    original: amount,
                    available: amount,
                    reserved: MicroUnits::ZERO,
                    consumed: MicroUnits::ZERO,
                    version: 1,
                    created_at: Utc::now(),
                };
                minted.validate()?;
                let minted_id = minted.id;
                lot_writes.push((minted, Expected::Absent));

                let out_head = self.store.journal_head(tenant, from, pool)?;
                let out_entry = build_entry(
                    &out_head,
                    from,
                    pool,
                    EntryType::TransferOut,
                    negate(amount)?,
                    format!("transfer_out:{}", transfer_id),
                    Some(transfer_id),
                );
                let in_head = self.store.journal_head(tenant, to, pool)?;
                let in_entry = build_entry(
                    &in_head,
                    to,
                    pool,
                    EntryType::TransferIn,
                    amount,
                    format!("transfer_in:{}", transfer_id),
                    Some(transfer_id),
                );

                let writes = WriteSet {
                    lots: lot_writes,
                    entries: vec![out_entry, in_entry],
                    source_claims: vec![SourceClaim {
                        source_type: SourceType::TransferIn,
                        source_id: transfer_id.to_string(),
                        lot_id: minted_id,
                    }],
                    ..WriteSet::default()
                };
                self.store.commit(tenant, writes)?;

                tracing::info!(
                    tenant = %tenant,
                    from = %from,
                    to = %to,
                    pool = %pool,
                    amount = %amount,
                    "Transfer completed"
                );

                Ok(Transfer {
                    id: transfer_id,
                    from_account: from,
                    to_account: to,
                    pool_id: pool.clone(),
                    amount,
                    minted_lot: minted_id,
                })
            })
        })
    }
}

/// How a terminal transition distributes across the allocations
struct Resolution {
    status: ReservationStatus,
    entry_type: EntryType,
    entry_amount: MicroUnits,
    consumed_shares: Vec<MicroUnits>,
}

fn negate(amount: MicroUnits) -> Result<MicroUnits> {
    amount
        .checked_neg()
        .ok_or_else(|| Error::InvalidAmount(format!("cannot negate {}", amount)))
}

fn sum_overflow(account: AccountId, pool: &PoolId) -> Error {
    Error::InvariantViolation(format!(
        "amount overflow for account {} pool {}",
        account, pool
    ))
}

/// Split `amount` across allocations proportionally: floor shares first,
/// then the integer-division remainder one micro-unit at a time in FIFO
/// allocation order, never pushing a share above its allocation.
fn proportional_shares(
    allocations: &[LotAllocation],
    amount: MicroUnits,
) -> Result<Vec<MicroUnits>> {
    let mut total: i128 = 0;
    for alloc in allocations {
        total = total
            .checked_add(alloc.amount.raw())
            .ok_or_else(|| Error::InvalidAmount("allocation sum overflow".to_string()))?;
    }
    if total == 0 {
        return Ok(vec![MicroUnits::ZERO; allocations.len()]);
    }

    let mut shares: Vec<i128> = Vec::with_capacity(allocations.len());
    let mut assigned: i128 = 0;
    for alloc in allocations {
        let share = amount
            .raw()
            .checked_mul(alloc.amount.raw())
            .ok_or_else(|| Error::InvalidAmount("share product overflow".to_string()))?
            / total;
        shares.push(share);
        assigned += share;
    }

    let mut remainder = amount.raw() - assigned;
    for (i, alloc) in allocations.iter().enumerate() {
        if remainder == 0 {
            break;
        }
        let room = alloc.amount.raw() - shares[i];
        let add = remainder.min(room);
        shares[i] += add;
        remainder -= add;
    }
    if remainder != 0 {
        return Err(Error::InvariantViolation(format!(
            "proportional split left {} micro-units unassigned",
            remainder
        )));
    }

    Ok(shares.into_iter().map(MicroUnits::new).collect())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::lots::LotStore;
    use crate::memory::MemoryStore;
    use crate::registry::AccountRegistry;
    use crate::types::{EntityRef, EntityType};

    struct Fixture {
        store: Arc<dyn LedgerStore>,
        engine: ReservationEngine,
        lots: LotStore,
        registry: AccountRegistry,
        tenant: TenantId,
        pool: PoolId,
        account: AccountId,
    }

    fn fixture() -> Fixture {
        let store: Arc<dyn LedgerStore> = Arc::new(MemoryStore::new());
        let stripes = Arc::new(LockStripes::new());
        let tenant = TenantId::new("acme").unwrap();
        let registry = AccountRegistry::new(store.clone());
        let account = registry
            .create_account(&tenant, EntityRef::new(EntityType::Person, "user-1"))
            .unwrap();
        Fixture {
            engine: ReservationEngine::new(store.clone(), stripes.clone(), 5),
            lots: LotStore::new(store.clone(), stripes, 5),
            registry,
            store,
            tenant,
            pool: PoolId::new("general").unwrap(),
            account: account.id,
        }
    }

    impl Fixture {
        fn mint(&self, micro: i128, source_id: &str) -> CreditLot {
            self.lots
                .mint_lot(
                    &self.tenant,
                    self.account,
                    &self.pool,
                    MicroUnits::new(micro),
                    SourceType::Deposit,
                    source_id,
                )
                .unwrap()
        }

        fn lot(&self, id: LotId) -> CreditLot {
            self.store.get_lot(&self.tenant, id).unwrap().unwrap()
        }
    }

    #[test]
    fn test_reserve_then_finalize_full() {
        let f = fixture();
        let lot = f.mint(1_000_000, "dep-1");

        let reservation = f
            .engine
            .reserve(&f.tenant, f.account, &f.pool, MicroUnits::new(500_000))
            .unwrap();
        assert_eq!(reservation.status, ReservationStatus::Pending);

        let after_reserve = f.lot(lot.id);
        assert_eq!(after_reserve.available, MicroUnits::new(500_000));
        assert_eq!(after_reserve.reserved, MicroUnits::new(500_000));
        assert_eq!(after_reserve.consumed, MicroUnits::ZERO);

        let finalized = f
            .engine
            .finalize(&f.tenant, reservation.id, MicroUnits::new(500_000))
            .unwrap();
        assert_eq!(finalized.status, ReservationStatus::Finalized);

        let after_finalize = f.lot(lot.id);
        assert_eq!(after_finalize.available, MicroUnits::new(500_000));
        assert_eq!(after_finalize.reserved, MicroUnits::ZERO);
        assert_eq!(after_finalize.consumed, MicroUnits::new(500_000));
        assert_eq!(after_finalize.original, MicroUnits::new(1_000_000));
    }

    #[test]
    fn test_release_returns_hold_and_absorbs() {
        let f = fixture();
        let lot = f.mint(100_000, "dep-1");

        let reservation = f
            .engine
            .reserve(&f.tenant, f.account, &f.pool, MicroUnits::new(50_000))
            .unwrap();
        let released = f.engine.release(&f.tenant, reservation.id).unwrap();
        assert_eq!(released.status, ReservationStatus::Released);

        let after = f.lot(lot.id);
        assert_eq!(after.available, MicroUnits::new(100_000));
        assert_eq!(after.reserved, MicroUnits::ZERO);
        assert_eq!(after.consumed, MicroUnits::ZERO);

        // Terminal state absorbs; lots stay untouched
        let result = f
            .engine
            .finalize(&f.tenant, reservation.id, MicroUnits::new(50_000));
        assert!(matches!(
            result,
            Err(Error::InvalidState(ReservationStatus::Released))
        ));
        let unchanged = f.lot(lot.id);
        assert_eq!(unchanged.available, MicroUnits::new(100_000));
        assert_eq!(unchanged.version, after.version);
    }

    #[test]
    fn test_fifo_spans_lots() {
        let f = fixture();
        let first = f.mint(1_000_000, "dep-1");
        let second = f.mint(4_000_000, "dep-2");

        f.engine
            .reserve(&f.tenant, f.account, &f.pool, MicroUnits::new(1_500_000))
            .unwrap();

        let first_after = f.lot(first.id);
        assert_eq!(first_after.available, MicroUnits::ZERO);
        assert_eq!(first_after.reserved, MicroUnits::new(1_000_000));

        let second_after = f.lot(second.id);
        assert_eq!(second_after.available, MicroUnits::new(3_500_000));
        assert_eq!(second_after.reserved, MicroUnits::new(500_000));
    }

    #[test]
    fn test_insufficient_balance_mutates_nothing() {
        let f = fixture();
        let lot = f.mint(1_000_000, "dep-1");
        let before = f.lot(lot.id);

        let result = f
            .engine
            .reserve(&f.tenant, f.account, &f.pool, MicroUnits::new(1_000_001));
        match result {
            Err(Error::InsufficientBalance {
                requested,
                available,
            }) => {
                assert_eq!(requested, MicroUnits::new(1_000_001));
                assert_eq!(available, MicroUnits::new(1_000_000));
            }
            other => panic!("expected InsufficientBalance, got {:?}", other.map(|r| r.id)),
        }

        let after = f.lot(lot.id);
        assert_eq!(after.available, before.available);
        assert_eq!(after.version, before.version);
        assert!(f
            .store
            .entries_for_pool(&f.tenant, f.account, &f.pool)
            .unwrap()
            .iter()
            .all(|e| e.entry_type != EntryType::Reserve));
    }

    #[test]
    fn test_reserve_exact_total_drains_available() {
        let f = fixture();
        f.mint(300_000, "dep-1");
        f.mint(700_000, "dep-2");

        let reservation = f
            .engine
            .reserve(&f.tenant, f.account, &f.pool, MicroUnits::new(1_000_000))
            .unwrap();
        assert_eq!(reservation.allocations.len(), 2);

        for lot in f.store.lots(&f.tenant).unwrap() {
            assert_eq!(lot.available, MicroUnits::ZERO);
        }
    }

    #[test]
    fn test_partial_finalize_returns_remainder() {
        let f = fixture();
        let lot = f.mint(1_000_000, "dep-1");

        let reservation = f
            .engine
            .reserve(&f.tenant, f.account, &f.pool, MicroUnits::new(800_000))
            .unwrap();
        f.engine
            .finalize(&f.tenant, reservation.id, MicroUnits::new(300_000))
            .unwrap();

        let after = f.lot(lot.id);
        assert_eq!(after.consumed, MicroUnits::new(300_000));
        assert_eq!(after.reserved, MicroUnits::ZERO);
        assert_eq!(after.available, MicroUnits::new(700_000));
    }

    #[test]
    fn test_finalize_proportional_across_lots() {
        let f = fixture();
        let first = f.mint(1_000_000, "dep-1");
        let second = f.mint(4_000_000, "dep-2");

        let reservation = f
            .engine
            .reserve(&f.tenant, f.account, &f.pool, MicroUnits::new(1_500_000))
            .unwrap();
        f.engine
            .finalize(&f.tenant, reservation.id, MicroUnits::new(600_000))
            .unwrap();

        // 600k split 1,000k:500k → 400k consumed on the first lot, 200k on
        // the second; the rest of each hold returns to available
        let first_after = f.lot(first.id);
        assert_eq!(first_after.consumed, MicroUnits::new(400_000));
        assert_eq!(first_after.available, MicroUnits::new(600_000));
        assert_eq!(first_after.reserved, MicroUnits::ZERO);

        let second_after = f.lot(second.id);
        assert_eq!(second_after.consumed, MicroUnits::new(200_000));
        assert_eq!(second_after.available, MicroUnits::new(3_800_000));
        assert_eq!(second_after.reserved, MicroUnits::ZERO);
    }

    #[test]
    fn test_finalize_more_than_reserved_rejected() {
        let f = fixture();
        f.mint(1_000_000, "dep-1");

        let reservation = f
            .engine
            .reserve(&f.tenant, f.account, &f.pool, MicroUnits::new(400_000))
            .unwrap();
        let result = f
            .engine
            .finalize(&f.tenant, reservation.id, MicroUnits::new(400_001));
        assert!(matches!(result, Err(Error::AmountExceedsReserved { .. })));

        // Still pending, still resolvable
        let released = f.engine.release(&f.tenant, reservation.id).unwrap();
        assert_eq!(released.status, ReservationStatus::Released);
    }

    #[test]
    fn test_expire_matches_release_semantics() {
        let f = fixture();
        let lot = f.mint(100_000, "dep-1");

        let reservation = f
            .engine
            .reserve(&f.tenant, f.account, &f.pool, MicroUnits::new(90_000))
            .unwrap();
        let expired = f.engine.expire(&f.tenant, reservation.id).unwrap();
        assert_eq!(expired.status, ReservationStatus::Expired);

        let after = f.lot(lot.id);
        assert_eq!(after.available, MicroUnits::new(100_000));

        let result = f.engine.release(&f.tenant, reservation.id);
        assert!(matches!(
            result,
            Err(Error::InvalidState(ReservationStatus::Expired))
        ));
    }

    #[test]
    fn test_concurrent_reserves_never_oversell() {
        use std::thread;

        let f = fixture();
        f.mint(1_000_000, "dep-1");

        let engine = Arc::new(f.engine);
        let mut handles = Vec::new();
        for _ in 0..2 {
            let engine = engine.clone();
            let tenant = f.tenant.clone();
            let pool = f.pool.clone();
            let account = f.account;
            handles.push(thread::spawn(move || {
                engine.reserve(&tenant, account, &pool, MicroUnits::new(600_000))
            }));
        }

        let outcomes: Vec<_> = handles.into_iter().map(|h| h.join().unwrap()).collect();
        let successes = outcomes.iter().filter(|r| r.is_ok()).count();
        assert_eq!(successes, 1, "exactly one racer may win");
        assert!(outcomes.iter().any(|r| matches!(
            r,
            Err(Error::InsufficientBalance { .. }) | Err(Error::Conflict(_))
        )));

        let lots = f.store.lots(&f.tenant).unwrap();
        assert_eq!(lots.len(), 1);
        assert_eq!(lots[0].available, MicroUnits::new(400_000));
        assert!(!lots[0].available.is_negative());
    }

    #[test]
    fn test_transfer_moves_credit() {
        let f = fixture();
        let other = f
            .registry
            .create_account(&f.tenant, EntityRef::new(EntityType::Agent, "agent-1"))
            .unwrap();
        let source_lot = f.mint(1_000_000, "dep-1");

        let transfer = f
            .engine
            .transfer(
                &f.tenant,
                f.account,
                other.id,
                &f.pool,
                MicroUnits::new(250_000),
            )
            .unwrap();

        let source_after = f.lot(source_lot.id);
        assert_eq!(source_after.available, MicroUnits::new(750_000));
        assert_eq!(source_after.consumed, MicroUnits::new(250_000));

        let minted = f.lot(transfer.minted_lot);
        assert_eq!(minted.account_id, other.id);
        assert_eq!(minted.source_type, SourceType::TransferIn);
        assert_eq!(minted.available, MicroUnits::new(250_000));

        let in_entries = f
            .store
            .entries_for_pool(&f.tenant, other.id, &f.pool)
            .unwrap();
        assert_eq!(in_entries.len(), 1);
        assert_eq!(in_entries[0].entry_type, EntryType::TransferIn);
        assert_eq!(in_entries[0].amount, MicroUnits::new(250_000));
    }

    #[test]
    fn test_transfer_insufficient_rejected() {
        let f = fixture();
        let other = f
            .registry
            .create_account(&f.tenant, EntityRef::new(EntityType::Agent, "agent-1"))
            .unwrap();
        f.mint(100, "dep-1");

        let result = f.engine.transfer(
            &f.tenant,
            f.account,
            other.id,
            &f.pool,
            MicroUnits::new(101),
        );
        assert!(matches!(result, Err(Error::InsufficientBalance { .. })));
        assert!(f.store.lots(&f.tenant).unwrap().len() == 1);
    }

    #[test]
    fn test_proportional_shares_remainder() {
        let allocations = vec![
            LotAllocation {
                lot_id: LotId::generate(),
                amount: MicroUnits::new(3),
            },
            LotAllocation {
                lot_id: LotId::generate(),
                amount: MicroUnits::new(3),
            },
        ];
        let shares = proportional_shares(&allocations, MicroUnits::new(5)).unwrap();
        assert_eq!(shares, vec![MicroUnits::new(3), MicroUnits::new(2)]);
    }

    #[test]
    fn test_reserve_non_positive_rejected() {
        let f = fixture();
        f.mint(1_000, "dep-1");
        for amount in [MicroUnits::ZERO, MicroUnits::new(-5)] {
            let result = f.engine.reserve(&f.tenant, f.account, &f.pool, amount);
            assert!(matches!(result, Err(Error::InvalidAmount(_))));
        }
    }
}
