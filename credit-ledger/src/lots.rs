//! Credit lot store
//!
//! Lots are individual funding events, partitioned into available / reserved
//! / consumed portions. Minting is idempotent on (source_type, source_id);
//! consumption order across lots is FIFO by creation time.

use crate::{
    journal::build_entry,
    store::{with_retry, Expected, LedgerStore, LockStripes, SourceClaim, WriteSet},
    types::{
        AccountId, Balance, CreditLot, EntryType, LotId, MicroUnits, PoolId, SourceType, TenantId,
    },
    Error, Result,
};
use chrono::Utc;
use std::sync::Arc;

/// Lot minting and balance reads
pub struct LotStore {
    store: Arc<dyn LedgerStore>,
    stripes: Arc<LockStripes>,
    max_attempts: u32,
}

impl LotStore {
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

    /// Mint a lot of `amount` micro-units into (account, pool).
    ///
    /// A retry carrying a (source_type, source_id) already minted with the
    /// same amount returns the existing lot unchanged; the same source with
    /// a *different* amount fails with [`Error::DuplicateSource`]. Appends
    /// one journal entry in the same commit as the lot row.
    pub fn mint_lot(
        &self,
        tenant: &TenantId,
        account: AccountId,
        pool: &PoolId,
        amount: MicroUnits,
        source_type: SourceType,
        source_id: &str,
    ) -> Result<CreditLot> {
        if amount.is_negative() {
            return Err(Error::InvalidAmount(format!(
                "mint amount must be non-negative, got {}",
                amount
            )));
        }
        if source_id.is_empty() {
            return Err(Error::InvalidIdentifier("empty source id".to_string()));
        }
        // Identity is the registry's concern; minting into a void is not
        self.store
            .get_account(tenant, account)?
            .ok_or_else(|| Error::AccountNotFound(account.to_string()))?;

        let stripe = (tenant.clone(), account, pool.clone());
        with_retry(self.max_attempts, "mint_lot", || {
            self.stripes.with_locked(vec![stripe.clone()], || {
                if let Some(existing) =
                    self.store.find_lot_by_source(tenant, source_type, source_id)?
                {
                    if existing.original == amount
                        && existing.account_id == account
                        && &existing.pool_id == pool
                    {
                        tracing::debug!(
                            tenant = %tenant,
                            source_id,
                            lot = %existing.id,
                            "Mint retried for an existing source, returning lot"
                        );
                        return Ok(existing);
                    }
                    return Err(Error::DuplicateSource {
                        source_type: source_type.as_str(),
                        source_id: source_id.to_string(),
                    });
                }

                let lot = CreditLot {
                    id: LotId::generate(),
                    account_id: account,
                    pool_id: pool.clone(),
                    source_type,
                    source_id: source_id.to_string(),
                    original: amount,
                    available: amount,
                    reserved: MicroUnits::ZERO,
                    consumed: MicroUnits::ZERO,
                    version: 1,
                    created_at: Utc::now(),
                };
                lot.validate()?;

                let entry_type = match source_type {
                    SourceType::RevenueShare => EntryType::RevenueShare,
                    SourceType::TransferIn => EntryType::TransferIn,
                    SourceType::Deposit | SourceType::TbaDeposit => EntryType::Grant,
                };
                let head = self.store.journal_head(tenant, account, pool)?;
                let entry = build_entry(
                    &head,
                    account,
                    pool,
                    entry_type,
                    amount,
                    format!("grant:{}:{}", source_type.as_str(), source_id),
                    Some(lot.id.as_uuid()),
                );

                let writes = WriteSet {
                    lots: vec![(lot.clone(), Expected::Absent)],
                    entries: vec![entry],
                    source_claims: vec![SourceClaim {
                        source_type,
                        source_id: source_id.to_string(),
                        lot_id: lot.id,
                    }],
                    ..WriteSet::default()
                };
                self.store.commit(tenant, writes)?;

                tracing::info!(
                    tenant = %tenant,
                    account = %account,
                    pool = %pool,
                    lot = %lot.id,
                    amount = %amount,
                    source = %format!("{}:{}", source_type.as_str(), source_id),
                    "Lot minted"
                );

                Ok(lot)
            })
        })
    }

    /// Summed balance across all lots of (account, pool). An account or
    /// pool with no lots reads as zero.
    pub fn get_balance(
        &self,
        tenant: &TenantId,
        account: AccountId,
        pool: &PoolId,
    ) -> Result<Balance> {
        let lots = self.store.lots_for_pool(tenant, account, pool)?;
        let mut balance = Balance::ZERO;
        for lot in &lots {
            balance.available = balance
                .available
                .checked_add(lot.available)
                .ok_or_else(|| overflow(account, pool))?;
            balance.reserved = balance
                .reserved
                .checked_add(lot.reserved)
                .ok_or_else(|| overflow(account, pool))?;
            balance.consumed = balance
                .consumed
                .checked_add(lot.consumed)
                .ok_or_else(|| overflow(account, pool))?;
            balance.original = balance
                .original
                .checked_add(lot.original)
                .ok_or_else(|| overflow(account, pool))?;
        }
        Ok(balance)
    }
}

fn overflow(account: AccountId, pool: &PoolId) -> Error {
    Error::InvariantViolation(format!(
        "balance sum overflow for account {} pool {}",
        account, pool
    ))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::memory::MemoryStore;
    use crate::registry::AccountRegistry;
    use crate::types::{EntityRef, EntityType};

    struct Fixture {
        lots: LotStore,
        account: AccountId,
        tenant: TenantId,
        pool: PoolId,
    }

    fn fixture() -> Fixture {
        let store: Arc<dyn LedgerStore> = Arc::new(MemoryStore::new());
        let tenant = TenantId::new("acme").unwrap();
        let registry = AccountRegistry::new(store.clone());
        let account = registry
            .create_account(&tenant, EntityRef::new(EntityType::Person, "user-1"))
            .unwrap();
        Fixture {
            lots: LotStore::new(store, Arc::new(LockStripes::new()), 5),
            account: account.id,
            tenant,
            pool: PoolId::new("general").unwrap(),
        }
    }

    #[test]
    fn test_mint_and_balance() {
        let f = fixture();
        let lot = f
            .lots
            .mint_lot(
                &f.tenant,
                f.account,
                &f.pool,
                MicroUnits::from_units(1),
                SourceType::Deposit,
                "dep-1",
            )
            .unwrap();

        assert_eq!(lot.original, MicroUnits::from_units(1));
        assert_eq!(lot.available, MicroUnits::from_units(1));
        assert_eq!(lot.reserved, MicroUnits::ZERO);
        assert_eq!(lot.consumed, MicroUnits::ZERO);

        let balance = f.lots.get_balance(&f.tenant, f.account, &f.pool).unwrap();
        assert_eq!(balance.available, MicroUnits::from_units(1));
        assert_eq!(balance.reserved, MicroUnits::ZERO);
    }

    #[test]
    fn test_mint_retry_is_idempotent() {
        let f = fixture();
        let first = f
            .lots
            .mint_lot(
                &f.tenant,
                f.account,
                &f.pool,
                MicroUnits::new(500_000),
                SourceType::Deposit,
                "dep-1",
            )
            .unwrap();
        let second = f
            .lots
            .mint_lot(
                &f.tenant,
                f.account,
                &f.pool,
                MicroUnits::new(500_000),
                SourceType::Deposit,
                "dep-1",
            )
            .unwrap();

        assert_eq!(first.id, second.id);
        let balance = f.lots.get_balance(&f.tenant, f.account, &f.pool).unwrap();
        assert_eq!(balance.original, MicroUnits::new(500_000));
    }

    #[test]
    fn test_mint_same_source_different_amount_rejected() {
        let f = fixture();
        f.lots
            .mint_lot(
                &f.tenant,
                f.account,
                &f.pool,
                MicroUnits::new(500_000),
                SourceType::Deposit,
                "dep-1",
            )
            .unwrap();
        let result = f.lots.mint_lot(
            &f.tenant,
            f.account,
            &f.pool,
            MicroUnits::new(900_000),
            SourceType::Deposit,
            "dep-1",
        );
        assert!(matches!(result, Err(Error::DuplicateSource { .. })));
    }

    #[test]
    fn test_same_source_id_different_type_allowed() {
        let f = fixture();
        f.lots
            .mint_lot(
                &f.tenant,
                f.account,
                &f.pool,
                MicroUnits::new(100),
                SourceType::Deposit,
                "x-1",
            )
            .unwrap();
        f.lots
            .mint_lot(
                &f.tenant,
                f.account,
                &f.pool,
                MicroUnits::new(200),
                SourceType::TbaDeposit,
                "x-1",
            )
            .unwrap();

        let balance = f.lots.get_balance(&f.tenant, f.account, &f.pool).unwrap();
        assert_eq!(balance.original, MicroUnits::new(300));
    }

    #[test]
    fn test_negative_mint_rejected() {
        let f = fixture();
        let result = f.lots.mint_lot(
            &f.tenant,
            f.account,
            &f.pool,
            MicroUnits::new(-1),
            SourceType::Deposit,
            "dep-1",
        );
        assert!(matches!(result, Err(Error::InvalidAmount(_))));
    }

    #[test]
    fn test_zero_mint_allowed() {
        let f = fixture();
        let lot = f
            .lots
            .mint_lot(
                &f.tenant,
                f.account,
                &f.pool,
                MicroUnits::ZERO,
                SourceType::Deposit,
                "dep-0",
            )
            .unwrap();
        assert_eq!(lot.original, MicroUnits::ZERO);
    }

    #[test]
    fn test_mint_to_unknown_account_rejected() {
        let f = fixture();
        let result = f.lots.mint_lot(
            &f.tenant,
            AccountId::generate(),
            &f.pool,
            MicroUnits::new(1),
            SourceType::Deposit,
            "dep-1",
        );
        assert!(matches!(result, Err(Error::AccountNotFound(_))));
    }

    #[test]
    fn test_unknown_pool_reads_zero() {
        let f = fixture();
        let balance = f
            .lots
            .get_balance(&f.tenant, f.account, &PoolId::new("bonus").unwrap())
            .unwrap();
        assert_eq!(balance, Balance::ZERO);
    }
}
