//! Tenant context guard
//!
//! A [`TenantLedger`] is the only way to reach ledger operations, so every
//! read and write carries an explicit, validated tenant for exactly one unit
//! of work. There is no thread-local or process-global "current tenant": the
//! binding is a value, threaded through every storage call, and the storage
//! layer prefixes every key with it. Cross-tenant access is therefore
//! structurally impossible rather than policy-checked.

use crate::{
    ledger::CreditLedger,
    types::{
        Account, AccountId, Balance, CreditLot, EntityRef, EntryType, LedgerEntry, MicroUnits,
        PoolId, Reservation, ReservationId, SourceType, TenantId, Transfer,
    },
    Result,
};
use std::time::Instant;

/// Tenant-bound handle to the ledger. Borrowed from [`CreditLedger`]; the
/// binding cannot outlive the unit of work that created it.
pub struct TenantLedger<'a> {
    ledger: &'a CreditLedger,
    tenant: TenantId,
}

impl<'a> TenantLedger<'a> {
    pub(crate) fn new(ledger: &'a CreditLedger, tenant: TenantId) -> Self {
        Self { ledger, tenant }
    }

    /// The bound tenant
    pub fn tenant_id(&self) -> &TenantId {
        &self.tenant
    }

    fn observed<T>(&self, op: &'static str, entries: u64, f: impl FnOnce() -> Result<T>) -> Result<T> {
        let started = Instant::now();
        let result = f();
        self.ledger
            .metrics()
            .observe(op, started.elapsed().as_secs_f64(), &result);
        if result.is_ok() {
            self.ledger.metrics().record_entries(entries);
        }
        result
    }

    /// Create (or idempotently return) the account for an entity
    pub fn create_account(&self, entity: EntityRef) -> Result<Account> {
        self.observed("create_account", 0, || {
            self.ledger.registry.create_account(&self.tenant, entity)
        })
    }

    /// Get an account by ID
    pub fn get_account(&self, id: AccountId) -> Result<Account> {
        self.ledger.registry.get_account(&self.tenant, id)
    }

    /// Mint a credit lot (idempotent on source)
    pub fn mint_lot(
        &self,
        account: AccountId,
        pool: &PoolId,
        amount: MicroUnits,
        source_type: SourceType,
        source_id: &str,
    ) -> Result<CreditLot> {
        self.observed("mint_lot", 1, || {
            self.ledger
                .lots
                .mint_lot(&self.tenant, account, pool, amount, source_type, source_id)
        })
    }

    /// Summed balance for one (account, pool)
    pub fn get_balance(&self, account: AccountId, pool: &PoolId) -> Result<Balance> {
        self.ledger.lots.get_balance(&self.tenant, account, pool)
    }

    /// Place a hold against (account, pool)
    pub fn reserve(
        &self,
        account: AccountId,
        pool: &PoolId,
        amount: MicroUnits,
    ) -> Result<Reservation> {
        self.observed("reserve", 1, || {
            self.ledger
                .reservations
                .reserve(&self.tenant, account, pool, amount)
        })
    }

    /// Consume (part of) a pending reservation
    pub fn finalize(&self, reservation: ReservationId, amount: MicroUnits) -> Result<Reservation> {
        self.observed("finalize", 1, || {
            self.ledger
                .reservations
                .finalize(&self.tenant, reservation, amount)
        })
    }

    /// Return a pending reservation's hold to available
    pub fn release(&self, reservation: ReservationId) -> Result<Reservation> {
        self.observed("release", 1, || {
            self.ledger.reservations.release(&self.tenant, reservation)
        })
    }

    /// Watchdog path: return an orphaned pending hold, terminal `Expired`
    pub fn expire(&self, reservation: ReservationId) -> Result<Reservation> {
        self.observed("expire", 1, || {
            self.ledger.reservations.expire(&self.tenant, reservation)
        })
    }

    /// Move credit between two accounts within one pool
    pub fn transfer(
        &self,
        from: AccountId,
        to: AccountId,
        pool: &PoolId,
        amount: MicroUnits,
    ) -> Result<Transfer> {
        self.observed("transfer", 2, || {
            self.ledger
                .reservations
                .transfer(&self.tenant, from, to, pool, amount)
        })
    }

    /// Append a shadow-billing comparator entry (journal-only)
    pub fn record_shadow(
        &self,
        account: AccountId,
        pool: &PoolId,
        entry_type: EntryType,
        amount: MicroUnits,
        idempotency_key: &str,
    ) -> Result<LedgerEntry> {
        self.observed("record_shadow", 1, || {
            self.ledger.journal.record_shadow(
                &self.tenant,
                account,
                pool,
                entry_type,
                amount,
                idempotency_key,
            )
        })
    }

    /// Journal entries for one (account, pool), in sequence order
    pub fn entries(&self, account: AccountId, pool: &PoolId) -> Result<Vec<LedgerEntry>> {
        self.ledger.journal.entries(&self.tenant, account, pool)
    }
}
