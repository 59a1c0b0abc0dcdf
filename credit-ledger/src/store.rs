//! Storage abstraction for the ledger
//!
//! The engine depends only on the [`LedgerStore`] trait; backends provide
//! atomic, compare-and-swap-verified commits. Two implementations exist:
//! [`crate::storage::RocksStore`] for production and
//! [`crate::memory::MemoryStore`] for tests.
//!
//! # Commit contract
//!
//! [`LedgerStore::commit`] applies a [`WriteSet`] atomically:
//!
//! - every row write carries an [`Expected`] pre-image (absent, or a
//!   version counter); any mismatch fails the whole commit with
//!   [`crate::Error::Conflict`] and nothing is applied
//! - journal entries must continue the per-(account, pool) chain exactly:
//!   `entry_seq == head + 1`, `prev_hash == head hash`, a recomputable
//!   `entry_hash`, and an unused idempotency key
//! - lot rows are re-validated for conservation inside the commit
//! - no interface exists to update or delete a committed entry
//!
//! Callers that lose a conflict re-read and retry from scratch; the bounded
//! loop lives in [`with_retry`].

use crate::{
    crypto,
    types::{
        Account, AccountId, CreditLot, EntityRef, LedgerEntry, LotId, PoolId, Reservation,
        ReservationId, SourceType, TenantId,
    },
    Error, Result,
};
use dashmap::DashMap;
use parking_lot::Mutex;
use std::sync::Arc;

/// Pre-image expectation for one row write
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Expected {
    /// The row must not exist yet (creation)
    Absent,
    /// The stored row must carry exactly this version
    Version(u64),
}

/// Claim on the unique (source_type, source_id) index
#[derive(Debug, Clone)]
pub struct SourceClaim {
    /// Source discriminator
    pub source_type: SourceType,
    /// External dedup key
    pub source_id: String,
    /// Lot being minted for this source
    pub lot_id: LotId,
}

/// Claim on the unique (entity_type, entity_id) index
#[derive(Debug, Clone)]
pub struct EntityClaim {
    /// External reference
    pub entity: EntityRef,
    /// Account being created for it
    pub account_id: AccountId,
}

/// Position of one (account, pool) journal chain
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub struct JournalHead {
    /// Last assigned entry_seq (0 if the chain is empty)
    pub seq: u64,
    /// Hash of the last entry (all zeroes if empty)
    pub hash: [u8; 32],
}

impl Default for JournalHead {
    fn default() -> Self {
        Self {
            seq: 0,
            hash: [0u8; 32],
        }
    }
}

/// One atomic unit of work against the store
#[derive(Debug, Default)]
pub struct WriteSet {
    /// Account rows to write
    pub accounts: Vec<(Account, Expected)>,
    /// Lot rows to write
    pub lots: Vec<(CreditLot, Expected)>,
    /// Reservation rows to write
    pub reservations: Vec<(Reservation, Expected)>,
    /// Journal entries to append (chain-verified)
    pub entries: Vec<LedgerEntry>,
    /// Unique source-index claims
    pub source_claims: Vec<SourceClaim>,
    /// Unique entity-index claims
    pub entity_claims: Vec<EntityClaim>,
}

impl WriteSet {
    /// True if the write set contains nothing
    pub fn is_empty(&self) -> bool {
        self.accounts.is_empty()
            && self.lots.is_empty()
            && self.reservations.is_empty()
            && self.entries.is_empty()
            && self.source_claims.is_empty()
            && self.entity_claims.is_empty()
    }
}

/// Backend-agnostic storage interface. All reads and writes are scoped to an
/// explicit tenant; implementations prefix every key with it, so cross-tenant
/// access is structurally impossible.
pub trait LedgerStore: Send + Sync {
    /// Get an account by ID
    fn get_account(&self, tenant: &TenantId, id: AccountId) -> Result<Option<Account>>;

    /// Look up the account keyed on an external entity reference
    fn find_account_by_entity(
        &self,
        tenant: &TenantId,
        entity: &EntityRef,
    ) -> Result<Option<Account>>;

    /// Get a lot by ID
    fn get_lot(&self, tenant: &TenantId, id: LotId) -> Result<Option<CreditLot>>;

    /// Look up the lot minted for a (source_type, source_id) pair
    fn find_lot_by_source(
        &self,
        tenant: &TenantId,
        source_type: SourceType,
        source_id: &str,
    ) -> Result<Option<CreditLot>>;

    /// All lots of one (account, pool) in FIFO order: (created_at, lot_id)
    /// ascending. Consumption order depends on this contract.
    fn lots_for_pool(
        &self,
        tenant: &TenantId,
        account: AccountId,
        pool: &PoolId,
    ) -> Result<Vec<CreditLot>>;

    /// Get a reservation by ID
    fn get_reservation(&self, tenant: &TenantId, id: ReservationId)
        -> Result<Option<Reservation>>;

    /// Look up an entry by its idempotency key
    fn find_entry_by_idempotency_key(
        &self,
        tenant: &TenantId,
        key: &str,
    ) -> Result<Option<LedgerEntry>>;

    /// All entries of one (account, pool) in entry_seq order
    fn entries_for_pool(
        &self,
        tenant: &TenantId,
        account: AccountId,
        pool: &PoolId,
    ) -> Result<Vec<LedgerEntry>>;

    /// Current journal head for one (account, pool)
    fn journal_head(
        &self,
        tenant: &TenantId,
        account: AccountId,
        pool: &PoolId,
    ) -> Result<JournalHead>;

    /// Apply a write set atomically (see module docs for the contract)
    fn commit(&self, tenant: &TenantId, writes: WriteSet) -> Result<()>;

    /// All tenants ever written (reconciliation scan)
    fn tenants(&self) -> Result<Vec<TenantId>>;

    /// All accounts of a tenant (reconciliation scan)
    fn accounts(&self, tenant: &TenantId) -> Result<Vec<Account>>;

    /// All lots of a tenant (reconciliation scan)
    fn lots(&self, tenant: &TenantId) -> Result<Vec<CreditLot>>;

    /// All reservations of a tenant (reconciliation scan)
    fn reservations(&self, tenant: &TenantId) -> Result<Vec<Reservation>>;

    /// All journal heads of a tenant (reconciliation scan)
    fn journal_heads(&self, tenant: &TenantId) -> Result<Vec<(AccountId, PoolId, JournalHead)>>;
}

/// Shared pre-image check for one row write. Backends call this inside their
/// commit critical section.
pub(crate) fn verify_expected(
    kind: &str,
    id: impl std::fmt::Display,
    stored_version: Option<u64>,
    expected: Expected,
) -> Result<()> {
    match (expected, stored_version) {
        (Expected::Absent, None) => Ok(()),
        (Expected::Absent, Some(_)) => {
            Err(Error::Conflict(format!("{} {} already exists", kind, id)))
        }
        (Expected::Version(v), Some(found)) if found == v => Ok(()),
        (Expected::Version(v), Some(found)) => Err(Error::Conflict(format!(
            "{} {} version changed: expected {}, found {}",
            kind, id, v, found
        ))),
        (Expected::Version(v), None) => Err(Error::Conflict(format!(
            "{} {} disappeared: expected version {}",
            kind, id, v
        ))),
    }
}

/// Shared verification of a write set's journal entries against the current
/// heads. Returns the new head per (account, pool). Backends call this inside
/// their commit critical section.
pub(crate) fn verify_entries(
    tenant: &TenantId,
    entries: &[LedgerEntry],
    mut head_of: impl FnMut(AccountId, &PoolId) -> Result<JournalHead>,
    mut key_taken: impl FnMut(&str) -> Result<bool>,
) -> Result<Vec<(AccountId, PoolId, JournalHead)>> {
    let mut heads: Vec<(AccountId, PoolId, JournalHead)> = Vec::new();

    for entry in entries {
        if key_taken(&entry.idempotency_key)? {
            return Err(Error::Conflict(format!(
                "idempotency key {} already recorded for tenant {}",
                entry.idempotency_key, tenant
            )));
        }

        let idx = match heads
            .iter()
            .position(|(a, p, _)| *a == entry.account_id && p == &entry.pool_id)
        {
            Some(idx) => idx,
            None => {
                let head = head_of(entry.account_id, &entry.pool_id)?;
                heads.push((entry.account_id, entry.pool_id.clone(), head));
                heads.len() - 1
            }
        };
        let head = &mut heads[idx].2;

        if entry.entry_seq != head.seq + 1 {
            return Err(Error::Conflict(format!(
                "journal seq {} does not continue head {} for account {} pool {}",
                entry.entry_seq, head.seq, entry.account_id, entry.pool_id
            )));
        }
        if entry.prev_hash != head.hash {
            return Err(Error::Conflict(format!(
                "journal prev_hash mismatch at seq {} for account {} pool {}",
                entry.entry_seq, entry.account_id, entry.pool_id
            )));
        }
        let expected_hash = crypto::entry_hash(entry);
        if entry.entry_hash != expected_hash {
            return Err(Error::InvariantViolation(format!(
                "entry {} carries a hash that does not match its content",
                entry.id
            )));
        }

        head.seq = entry.entry_seq;
        head.hash = entry.entry_hash;
    }

    Ok(heads)
}

/// Striped per-(tenant, account, pool) mutexes. Operations on different
/// accounts never contend; multi-stripe operations acquire in sorted key
/// order.
pub(crate) struct LockStripes {
    stripes: DashMap<(TenantId, AccountId, PoolId), Arc<Mutex<()>>>,
}

impl LockStripes {
    pub(crate) fn new() -> Self {
        Self {
            stripes: DashMap::new(),
        }
    }

    fn stripe(&self, key: &(TenantId, AccountId, PoolId)) -> Arc<Mutex<()>> {
        self.stripes
            .entry(key.clone())
            .or_insert_with(|| Arc::new(Mutex::new(())))
            .clone()
    }

    /// Run `f` while holding every stripe in `keys` (sorted, deduplicated)
    pub(crate) fn with_locked<T>(
        &self,
        mut keys: Vec<(TenantId, AccountId, PoolId)>,
        f: impl FnOnce() -> T,
    ) -> T {
        keys.sort();
        keys.dedup();
        let stripes: Vec<Arc<Mutex<()>>> = keys.iter().map(|k| self.stripe(k)).collect();
        let _guards: Vec<_> = stripes.iter().map(|s| s.lock()).collect();
        f()
    }
}

/// Bounded optimistic-concurrency retry loop. Conflicted attempts re-read and
/// re-plan from scratch; exhaustion surfaces the last conflict to the caller.
pub(crate) fn with_retry<T>(
    max_attempts: u32,
    op: &'static str,
    mut f: impl FnMut() -> Result<T>,
) -> Result<T> {
    let mut last = String::new();
    for attempt in 1..=max_attempts.max(1) {
        match f() {
            Err(Error::Conflict(msg)) => {
                tracing::warn!(op, attempt, conflict = %msg, "Retrying conflicted operation");
                last = msg;
            }
            other => return other,
        }
    }
    Err(Error::Conflict(last))
}
