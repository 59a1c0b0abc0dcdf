//! Append-only ledger journal
//!
//! Every partition-mutating operation appends exactly one entry in the same
//! commit that mutates the lots; this module owns entry construction (seq
//! assignment, hash chaining, idempotency keys) and the read side. Shadow
//! entries for the shadow-billing comparator are the one journal-only write
//! path: they never touch lots and are excluded from conservation sums.

use crate::{
    crypto,
    store::{JournalHead, LedgerStore, LockStripes, WriteSet},
    types::{AccountId, EntryId, EntryType, LedgerEntry, MicroUnits, PoolId, TenantId},
    Error, Result,
};
use chrono::Utc;
use std::sync::Arc;
use uuid::Uuid;

/// Build the next entry on a chain. `head` must be the chain position read
/// inside the same locked section that commits the entry.
pub(crate) fn build_entry(
    head: &JournalHead,
    account: AccountId,
    pool: &PoolId,
    entry_type: EntryType,
    amount: MicroUnits,
    idempotency_key: String,
    reference: Option<Uuid>,
) -> LedgerEntry {
    let mut entry = LedgerEntry {
        id: EntryId::generate(),
        account_id: account,
        pool_id: pool.clone(),
        entry_seq: head.seq + 1,
        entry_type,
        amount,
        idempotency_key,
        reference,
        prev_hash: head.hash,
        entry_hash: [0u8; 32],
        created_at: Utc::now(),
    };
    entry.entry_hash = crypto::entry_hash(&entry);
    entry
}

/// Read/append surface of the journal
pub struct Journal {
    store: Arc<dyn LedgerStore>,
    stripes: Arc<LockStripes>,
    max_attempts: u32,
}

impl Journal {
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

    /// All entries of one (account, pool), in entry_seq order
    pub fn entries(
        &self,
        tenant: &TenantId,
        account: AccountId,
        pool: &PoolId,
    ) -> Result<Vec<LedgerEntry>> {
        self.store.entries_for_pool(tenant, account, pool)
    }

    /// Append a shadow-billing comparator entry. Journal-only: no lot is
    /// touched. Retried calls with the same idempotency key return the
    /// existing entry unchanged.
    pub fn record_shadow(
        &self,
        tenant: &TenantId,
        account: AccountId,
        pool: &PoolId,
        entry_type: EntryType,
        amount: MicroUnits,
        idempotency_key: &str,
    ) -> Result<LedgerEntry> {
        if !entry_type.is_shadow() {
            return Err(Error::InvalidAmount(format!(
                "entry type {:?} is not a shadow type",
                entry_type
            )));
        }
        if idempotency_key.is_empty() {
            return Err(Error::InvalidIdentifier(
                "empty idempotency key".to_string(),
            ));
        }

        let stripe = (tenant.clone(), account, pool.clone());
        crate::store::with_retry(self.max_attempts, "record_shadow", || {
            self.stripes.with_locked(vec![stripe.clone()], || {
                if let Some(existing) =
                    self.store.find_entry_by_idempotency_key(tenant, idempotency_key)?
                {
                    tracing::debug!(
                        tenant = %tenant,
                        idempotency_key,
                        "Shadow entry already recorded, returning existing"
                    );
                    return Ok(existing);
                }

                let head = self.store.journal_head(tenant, account, pool)?;
                let entry = build_entry(
                    &head,
                    account,
                    pool,
                    entry_type,
                    amount,
                    idempotency_key.to_string(),
                    None,
                );

                let writes = WriteSet {
                    entries: vec![entry.clone()],
                    ..WriteSet::default()
                };
                self.store.commit(tenant, writes)?;

                tracing::debug!(
                    tenant = %tenant,
                    account = %account,
                    pool = %pool,
                    entry_seq = entry.entry_seq,
                    "Shadow entry appended"
                );

                Ok(entry)
            })
        })
    }
}
