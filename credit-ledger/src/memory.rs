//! In-memory storage backend
//!
//! Keeps everything in `BTreeMap`s behind one `parking_lot::RwLock`. Used by
//! the test suites and as the reference implementation of the commit
//! contract; `RocksStore` is the production backend.

use crate::{
    store::{
        verify_entries, verify_expected, EntityClaim, Expected, JournalHead, LedgerStore,
        SourceClaim, WriteSet,
    },
    types::{
        Account, AccountId, CreditLot, EntityRef, EntityType, LedgerEntry, LotId, PoolId,
        Reservation, ReservationId, SourceType, TenantId,
    },
    Error, Result,
};
use parking_lot::RwLock;
use std::collections::{BTreeMap, BTreeSet};

#[derive(Default)]
struct Inner {
    accounts: BTreeMap<(TenantId, AccountId), Account>,
    entities: BTreeMap<(TenantId, EntityType, String), AccountId>,
    lots: BTreeMap<(TenantId, LotId), CreditLot>,
    sources: BTreeMap<(TenantId, SourceType, String), LotId>,
    reservations: BTreeMap<(TenantId, ReservationId), Reservation>,
    entries: BTreeMap<(TenantId, AccountId, PoolId, u64), LedgerEntry>,
    idempotency: BTreeMap<(TenantId, String), (AccountId, PoolId, u64)>,
    heads: BTreeMap<(TenantId, AccountId, PoolId), JournalHead>,
    tenants: BTreeSet<TenantId>,
}

/// In-memory [`LedgerStore`] implementation
#[derive(Default)]
pub struct MemoryStore {
    inner: RwLock<Inner>,
}

impl MemoryStore {
    /// Create an empty store
    pub fn new() -> Self {
        Self::default()
    }
}

impl LedgerStore for MemoryStore {
    fn get_account(&self, tenant: &TenantId, id: AccountId) -> Result<Option<Account>> {
        let inner = self.inner.read();
        Ok(inner.accounts.get(&(tenant.clone(), id)).cloned())
    }

    fn find_account_by_entity(
        &self,
        tenant: &TenantId,
        entity: &EntityRef,
    ) -> Result<Option<Account>> {
        let inner = self.inner.read();
        let key = (
            tenant.clone(),
            entity.entity_type,
            entity.entity_id.clone(),
        );
        match inner.entities.get(&key) {
            Some(account_id) => Ok(inner.accounts.get(&(tenant.clone(), *account_id)).cloned()),
            None => Ok(None),
        }
    }

    fn get_lot(&self, tenant: &TenantId, id: LotId) -> Result<Option<CreditLot>> {
        let inner = self.inner.read();
        Ok(inner.lots.get(&(tenant.clone(), id)).cloned())
    }

    fn find_lot_by_source(
        &self,
        tenant: &TenantId,
        source_type: SourceType,
        source_id: &str,
    ) -> Result<Option<CreditLot>> {
        let inner = self.inner.read();
        let key = (tenant.clone(), source_type, source_id.to_string());
        match inner.sources.get(&key) {
            Some(lot_id) => Ok(inner.lots.get(&(tenant.clone(), *lot_id)).cloned()),
            None => Ok(None),
        }
    }

    fn lots_for_pool(
        &self,
        tenant: &TenantId,
        account: AccountId,
        pool: &PoolId,
    ) -> Result<Vec<CreditLot>> {
        let inner = self.inner.read();
        let mut lots: Vec<CreditLot> = inner
            .lots
            .range((tenant.clone(), LotId::from_uuid(uuid::Uuid::nil()))..)
            .take_while(|((t, _), _)| t == tenant)
            .map(|(_, lot)| lot)
            .filter(|lot| lot.account_id == account && &lot.pool_id == pool)
            .cloned()
            .collect();
        // FIFO contract: oldest funding event first
        lots.sort_by(|a, b| {
            a.created_at
                .cmp(&b.created_at)
                .then_with(|| a.id.cmp(&b.id))
        });
        Ok(lots)
    }

    fn get_reservation(
        &self,
        tenant: &TenantId,
        id: ReservationId,
    ) -> Result<Option<Reservation>> {
        let inner = self.inner.read();
        Ok(inner.reservations.get(&(tenant.clone(), id)).cloned())
    }

    fn find_entry_by_idempotency_key(
        &self,
        tenant: &TenantId,
        key: &str,
    ) -> Result<Option<LedgerEntry>> {
        let inner = self.inner.read();
        match inner.idempotency.get(&(tenant.clone(), key.to_string())) {
            Some((account, pool, seq)) => Ok(inner
                .entries
                .get(&(tenant.clone(), *account, pool.clone(), *seq))
                .cloned()),
            None => Ok(None),
        }
    }

    fn entries_for_pool(
        &self,
        tenant: &TenantId,
        account: AccountId,
        pool: &PoolId,
    ) -> Result<Vec<LedgerEntry>> {
        let inner = self.inner.read();
        Ok(inner
            .entries
            .range((tenant.clone(), account, pool.clone(), 0)..)
            .take_while(|((t, a, p, _), _)| t == tenant && *a == account && p == pool)
            .map(|(_, entry)| entry.clone())
            .collect())
    }

    fn journal_head(
        &self,
        tenant: &TenantId,
        account: AccountId,
        pool: &PoolId,
    ) -> Result<JournalHead> {
        let inner = self.inner.read();
        Ok(inner
            .heads
            .get(&(tenant.clone(), account, pool.clone()))
            .copied()
            .unwrap_or_default())
    }

    fn commit(&self, tenant: &TenantId, writes: WriteSet) -> Result<()> {
        let mut inner = self.inner.write();

        // Verify every pre-image before touching anything
        for (account, expected) in &writes.accounts {
            let stored = inner.accounts.get(&(tenant.clone(), account.id));
            verify_expected("account", account.id, stored.map(|a| a.version), *expected)?;
        }
        for (lot, expected) in &writes.lots {
            lot.validate()?;
            let stored = inner.lots.get(&(tenant.clone(), lot.id));
            verify_expected("lot", lot.id, stored.map(|l| l.version), *expected)?;
        }
        for (reservation, expected) in &writes.reservations {
            let stored = inner.reservations.get(&(tenant.clone(), reservation.id));
            verify_expected(
                "reservation",
                reservation.id,
                stored.map(|r| r.version),
                *expected,
            )?;
        }
        for SourceClaim {
            source_type,
            source_id,
            ..
        } in &writes.source_claims
        {
            let key = (tenant.clone(), *source_type, source_id.clone());
            if inner.sources.contains_key(&key) {
                return Err(Error::Conflict(format!(
                    "source {}:{} already claimed",
                    source_type.as_str(),
                    source_id
                )));
            }
        }
        for EntityClaim { entity, .. } in &writes.entity_claims {
            let key = (
                tenant.clone(),
                entity.entity_type,
                entity.entity_id.clone(),
            );
            if inner.entities.contains_key(&key) {
                return Err(Error::Conflict(format!(
                    "entity {:?}:{} already claimed",
                    entity.entity_type, entity.entity_id
                )));
            }
        }

        let new_heads = {
            let heads = &inner.heads;
            let idempotency = &inner.idempotency;
            verify_entries(
                tenant,
                &writes.entries,
                |account, pool| {
                    Ok(heads
                        .get(&(tenant.clone(), account, pool.clone()))
                        .copied()
                        .unwrap_or_default())
                },
                |key| Ok(idempotency.contains_key(&(tenant.clone(), key.to_string()))),
            )?
        };

        // Apply
        for (account, _) in writes.accounts {
            inner.accounts.insert((tenant.clone(), account.id), account);
        }
        for (lot, _) in writes.lots {
            inner.lots.insert((tenant.clone(), lot.id), lot);
        }
        for (reservation, _) in writes.reservations {
            inner
                .reservations
                .insert((tenant.clone(), reservation.id), reservation);
        }
        for entry in writes.entries {
            inner.idempotency.insert(
                (tenant.clone(), entry.idempotency_key.clone()),
                (entry.account_id, entry.pool_id.clone(), entry.entry_seq),
            );
            inner.entries.insert(
                (
                    tenant.clone(),
                    entry.account_id,
                    entry.pool_id.clone(),
                    entry.entry_seq,
                ),
                entry,
            );
        }
        for (account, pool, head) in new_heads {
            inner.heads.insert((tenant.clone(), account, pool), head);
        }
        for claim in writes.source_claims {
            inner.sources.insert(
                (tenant.clone(), claim.source_type, claim.source_id),
                claim.lot_id,
            );
        }
        for claim in writes.entity_claims {
            inner.entities.insert(
                (
                    tenant.clone(),
                    claim.entity.entity_type,
                    claim.entity.entity_id,
                ),
                claim.account_id,
            );
        }
        inner.tenants.insert(tenant.clone());

        Ok(())
    }

    fn tenants(&self) -> Result<Vec<TenantId>> {
        let inner = self.inner.read();
        Ok(inner.tenants.iter().cloned().collect())
    }

    fn accounts(&self, tenant: &TenantId) -> Result<Vec<Account>> {
        let inner = self.inner.read();
        Ok(inner
            .accounts
            .iter()
            .filter(|((t, _), _)| t == tenant)
            .map(|(_, account)| account.clone())
            .collect())
    }

    fn lots(&self, tenant: &TenantId) -> Result<Vec<CreditLot>> {
        let inner = self.inner.read();
        Ok(inner
            .lots
            .iter()
            .filter(|((t, _), _)| t == tenant)
            .map(|(_, lot)| lot.clone())
            .collect())
    }

    fn reservations(&self, tenant: &TenantId) -> Result<Vec<Reservation>> {
        let inner = self.inner.read();
        Ok(inner
            .reservations
            .iter()
            .filter(|((t, _), _)| t == tenant)
            .map(|(_, reservation)| reservation.clone())
            .collect())
    }

    fn journal_heads(&self, tenant: &TenantId) -> Result<Vec<(AccountId, PoolId, JournalHead)>> {
        let inner = self.inner.read();
        Ok(inner
            .heads
            .iter()
            .filter(|((t, _, _), _)| t == tenant)
            .map(|((_, account, pool), head)| (*account, pool.clone(), *head))
            .collect())
    }
}
