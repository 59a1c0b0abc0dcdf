//! Main ledger orchestration layer
//!
//! Ties together the account registry, lot store, reservation engine and
//! journal into one facade. Every operation requires a bound tenant: the
//! facade only hands out [`TenantLedger`] handles, so un-scoped access does
//! not exist in the API.
//!
//! # Example
//!
//! ```no_run
//! use credit_ledger::{Config, CreditLedger, TenantId};
//!
//! fn main() -> credit_ledger::Result<()> {
//!     let ledger = CreditLedger::open(Config::default())?;
//!
//!     let tenant = TenantId::new("acme")?;
//!     ledger.with_tenant(tenant, |ledger| {
//!         // let account = ledger.create_account(...)?;
//!         Ok(())
//!     })?;
//!
//!     Ok(())
//! }
//! ```

use crate::{
    journal::Journal,
    lots::LotStore,
    memory::MemoryStore,
    metrics::Metrics,
    registry::AccountRegistry,
    reservation::ReservationEngine,
    storage::RocksStore,
    store::{LedgerStore, LockStripes},
    tenant::TenantLedger,
    types::TenantId,
    Config, Result,
};
use std::sync::Arc;

/// Main credit ledger interface
pub struct CreditLedger {
    /// Storage backend
    store: Arc<dyn LedgerStore>,

    /// Account identity
    pub(crate) registry: AccountRegistry,

    /// Lot minting and balances
    pub(crate) lots: LotStore,

    /// Reserve / finalize / release / expire / transfer
    pub(crate) reservations: ReservationEngine,

    /// Journal reads and shadow appends
    pub(crate) journal: Journal,

    /// Prometheus metrics
    metrics: Metrics,
}

impl CreditLedger {
    /// Open a RocksDB-backed ledger with configuration
    pub fn open(config: Config) -> Result<Self> {
        let store: Arc<dyn LedgerStore> = Arc::new(RocksStore::open(&config)?);
        Ok(Self::with_store(store, &config))
    }

    /// Build a ledger over any storage backend
    pub fn with_store(store: Arc<dyn LedgerStore>, config: &Config) -> Self {
        let stripes = Arc::new(LockStripes::new());
        let max_attempts = config.retry.max_attempts;

        Self {
            registry: AccountRegistry::new(store.clone()),
            lots: LotStore::new(store.clone(), stripes.clone(), max_attempts),
            reservations: ReservationEngine::new(store.clone(), stripes.clone(), max_attempts),
            journal: Journal::new(store.clone(), stripes, max_attempts),
            metrics: Metrics::default(),
            store,
        }
    }

    /// In-memory ledger (tests, reference semantics)
    pub fn in_memory() -> Self {
        Self::with_store(Arc::new(MemoryStore::new()), &Config::default())
    }

    /// Bind a tenant and return a scoped handle. The binding lives only as
    /// long as the handle; no process-wide tenant state exists.
    pub fn tenant(&self, tenant: TenantId) -> TenantLedger<'_> {
        TenantLedger::new(self, tenant)
    }

    /// Run one unit of work with a tenant bound for its duration
    pub fn with_tenant<T>(
        &self,
        tenant: TenantId,
        f: impl FnOnce(&TenantLedger<'_>) -> Result<T>,
    ) -> Result<T> {
        let scoped = self.tenant(tenant);
        f(&scoped)
    }

    /// Storage backend handle (reconciliation, tests)
    pub fn store(&self) -> Arc<dyn LedgerStore> {
        self.store.clone()
    }

    /// Metrics collector
    pub fn metrics(&self) -> &Metrics {
        &self.metrics
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{EntityRef, EntityType, MicroUnits, PoolId, SourceType};

    #[test]
    fn test_with_tenant_scopes_unit_of_work() {
        let ledger = CreditLedger::in_memory();
        let tenant = TenantId::new("acme").unwrap();
        let pool = PoolId::new("general").unwrap();

        let balance = ledger
            .with_tenant(tenant, |ledger| {
                let account =
                    ledger.create_account(EntityRef::new(EntityType::Person, "user-1"))?;
                ledger.mint_lot(
                    account.id,
                    &pool,
                    MicroUnits::from_units(3),
                    SourceType::Deposit,
                    "dep-1",
                )?;
                ledger.get_balance(account.id, &pool)
            })
            .unwrap();

        assert_eq!(balance.available, MicroUnits::from_units(3));
    }

    #[test]
    fn test_tenants_are_isolated() {
        let ledger = CreditLedger::in_memory();
        let pool = PoolId::new("general").unwrap();

        let alpha = ledger.tenant(TenantId::new("alpha").unwrap());
        let beta = ledger.tenant(TenantId::new("beta").unwrap());

        let account = alpha
            .create_account(EntityRef::new(EntityType::Person, "user-1"))
            .unwrap();
        alpha
            .mint_lot(
                account.id,
                &pool,
                MicroUnits::from_units(10),
                SourceType::Deposit,
                "dep-1",
            )
            .unwrap();

        // Same account id under another tenant resolves to nothing
        assert!(beta.get_account(account.id).is_err());
        let foreign_balance = beta.get_balance(account.id, &pool).unwrap();
        assert_eq!(foreign_balance.available, MicroUnits::ZERO);
    }

    #[test]
    fn test_invalid_tenant_rejected_at_the_boundary() {
        let result = TenantId::new("");
        assert!(matches!(result, Err(crate::Error::TenantContextMissing)));
    }

    #[test]
    fn test_metrics_observe_ops() {
        let ledger = CreditLedger::in_memory();
        let tenant = TenantId::new("acme").unwrap();
        let pool = PoolId::new("general").unwrap();

        let scoped = ledger.tenant(tenant);
        let account = scoped
            .create_account(EntityRef::new(EntityType::Person, "user-1"))
            .unwrap();
        scoped
            .mint_lot(
                account.id,
                &pool,
                MicroUnits::from_units(1),
                SourceType::Deposit,
                "dep-1",
            )
            .unwrap();
        scoped
            .reserve(account.id, &pool, MicroUnits::new(400_000))
            .unwrap();

        let metrics = ledger.metrics();
        assert_eq!(metrics.ops_total.with_label_values(&["reserve"]).get(), 1);
        assert_eq!(metrics.ops_total.with_label_values(&["mint_lot"]).get(), 1);
        assert!(metrics.entries_total.get() >= 2);
    }
}
