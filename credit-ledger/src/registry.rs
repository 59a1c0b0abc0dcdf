//! Account registry
//!
//! Creates and looks up accounts identified by an external entity reference.
//! Owns identity only, never money. Creation is idempotent on
//! (entity_type, entity_id): a second call returns the existing account.

use crate::{
    store::{EntityClaim, Expected, LedgerStore, WriteSet},
    types::{Account, AccountId, EntityRef, TenantId},
    Error, Result,
};
use chrono::Utc;
use std::sync::Arc;

/// Account identity registry
pub struct AccountRegistry {
    store: Arc<dyn LedgerStore>,
}

impl AccountRegistry {
    pub(crate) fn new(store: Arc<dyn LedgerStore>) -> Self {
        Self { store }
    }

    /// Create the account for an entity, or return the existing one.
    pub fn create_account(&self, tenant: &TenantId, entity: EntityRef) -> Result<Account> {
        if entity.entity_id.is_empty() {
            return Err(Error::InvalidIdentifier("empty entity id".to_string()));
        }

        if let Some(existing) = self.store.find_account_by_entity(tenant, &entity)? {
            return Ok(existing);
        }

        let account = Account {
            id: AccountId::generate(),
            entity: entity.clone(),
            version: 1,
            created_at: Utc::now(),
        };

        let writes = WriteSet {
            accounts: vec![(account.clone(), Expected::Absent)],
            entity_claims: vec![EntityClaim {
                entity: entity.clone(),
                account_id: account.id,
            }],
            ..WriteSet::default()
        };

        match self.store.commit(tenant, writes) {
            Ok(()) => {
                tracing::info!(
                    tenant = %tenant,
                    account = %account.id,
                    entity_type = ?entity.entity_type,
                    entity_id = %entity.entity_id,
                    "Account created"
                );
                Ok(account)
            }
            // Lost the creation race: the winner's row is the account
            Err(Error::Conflict(_)) => self
                .store
                .find_account_by_entity(tenant, &entity)?
                .ok_or_else(|| Error::AccountNotFound(entity.entity_id.clone())),
            Err(e) => Err(e),
        }
    }

    /// Get an account by ID
    pub fn get_account(&self, tenant: &TenantId, id: AccountId) -> Result<Account> {
        self.store
            .get_account(tenant, id)?
            .ok_or_else(|| Error::AccountNotFound(id.to_string()))
    }
}
