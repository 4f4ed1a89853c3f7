//! Collaborator ports: wallet membership/base currency and the category table.
//!
//! The engine only reads these. The in-memory adapters also expose the
//! mutations a membership service would perform, so tests can change the
//! participant set over time.

use std::collections::HashMap;
use std::sync::{Arc, PoisonError, RwLock};

use splitledger_core::{CategoryId, DomainError, DomainResult, ParticipantId, WalletId};
use splitledger_ledger::{Category, Wallet, default_categories};

use crate::movement_store::StoreError;

/// Read access to wallets (membership, base currency, archived flag).
pub trait WalletDirectory: Send + Sync {
    fn wallet(&self, wallet_id: WalletId) -> Result<Option<Wallet>, StoreError>;
}

/// Read access to the category lookup table.
pub trait CategoryCatalog: Send + Sync {
    fn category(&self, category_id: CategoryId) -> Result<Option<Category>, StoreError>;

    fn all(&self) -> Result<Vec<Category>, StoreError>;
}

impl<T> WalletDirectory for Arc<T>
where
    T: WalletDirectory + ?Sized,
{
    fn wallet(&self, wallet_id: WalletId) -> Result<Option<Wallet>, StoreError> {
        (**self).wallet(wallet_id)
    }
}

impl<T> CategoryCatalog for Arc<T>
where
    T: CategoryCatalog + ?Sized,
{
    fn category(&self, category_id: CategoryId) -> Result<Option<Category>, StoreError> {
        (**self).category(category_id)
    }

    fn all(&self) -> Result<Vec<Category>, StoreError> {
        (**self).all()
    }
}

#[derive(Debug, Default)]
pub struct InMemoryWalletDirectory {
    wallets: RwLock<HashMap<WalletId, Wallet>>,
}

impl InMemoryWalletDirectory {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert or replace a wallet.
    pub fn upsert(&self, wallet: Wallet) {
        self.wallets
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(wallet.id, wallet);
    }

    pub fn add_participant(&self, wallet_id: WalletId, participant: ParticipantId) -> DomainResult<()> {
        self.update(wallet_id, |w| w.add_participant(participant))
    }

    /// Remove a member. Their recorded movements stay in the wallet history.
    pub fn remove_participant(
        &self,
        wallet_id: WalletId,
        participant: ParticipantId,
    ) -> DomainResult<()> {
        self.update(wallet_id, |w| w.remove_participant(participant))
    }

    pub fn archive(&self, wallet_id: WalletId) -> DomainResult<()> {
        self.update(wallet_id, |w| w.archived = true)
    }

    fn update(&self, wallet_id: WalletId, f: impl FnOnce(&mut Wallet)) -> DomainResult<()> {
        let mut wallets = self.wallets.write().unwrap_or_else(PoisonError::into_inner);
        let wallet = wallets
            .get_mut(&wallet_id)
            .ok_or_else(|| DomainError::not_found(format!("wallet {wallet_id}")))?;
        f(wallet);
        Ok(())
    }
}

impl WalletDirectory for InMemoryWalletDirectory {
    fn wallet(&self, wallet_id: WalletId) -> Result<Option<Wallet>, StoreError> {
        let wallets = self
            .wallets
            .read()
            .map_err(|_| StoreError::Backend("wallet directory lock poisoned".to_string()))?;
        Ok(wallets.get(&wallet_id).cloned())
    }
}

#[derive(Debug, Default)]
pub struct InMemoryCategoryCatalog {
    categories: RwLock<Vec<Category>>,
}

impl InMemoryCategoryCatalog {
    pub fn new() -> Self {
        Self::default()
    }

    /// Catalog seeded with the default categories.
    pub fn with_defaults() -> Self {
        Self {
            categories: RwLock::new(default_categories()),
        }
    }

    pub fn insert(&self, category: Category) {
        let mut categories = self.categories.write().unwrap_or_else(PoisonError::into_inner);
        categories.retain(|c| c.id != category.id);
        categories.push(category);
    }

    /// Look up a category by its display key (e.g. `"food"`).
    pub fn by_key(&self, key: &str) -> Option<Category> {
        self.categories
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .iter()
            .find(|c| c.key.as_deref() == Some(key))
            .cloned()
    }
}

impl CategoryCatalog for InMemoryCategoryCatalog {
    fn category(&self, category_id: CategoryId) -> Result<Option<Category>, StoreError> {
        let categories = self
            .categories
            .read()
            .map_err(|_| StoreError::Backend("category catalog lock poisoned".to_string()))?;
        Ok(categories.iter().find(|c| c.id == category_id).cloned())
    }

    fn all(&self) -> Result<Vec<Category>, StoreError> {
        let categories = self
            .categories
            .read()
            .map_err(|_| StoreError::Backend("category catalog lock poisoned".to_string()))?;
        Ok(categories.clone())
    }
}
