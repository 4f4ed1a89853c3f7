use std::collections::HashMap;
use std::sync::{Mutex, RwLock};

use chrono::Utc;

use splitledger_core::{BatchId, MovementId, WalletId};
use splitledger_ledger::{Movement, MovementDraft};

use super::r#trait::{MovementStore, StoreError, batch_wallet};

/// In-memory movement store.
///
/// Intended for tests/dev. Not optimized for performance: lookups by id scan
/// every wallet.
///
/// A batch is staged in full before the write lock is taken, then committed
/// with a single `extend`, so a failure while staging leaves the store untouched
/// and readers holding the read lock never see a partial batch.
#[derive(Debug, Default)]
pub struct InMemoryMovementStore {
    wallets: RwLock<HashMap<WalletId, Vec<Movement>>>,
    /// One-shot injected failure: abort the next batch when staging reaches this index.
    fail_at: Mutex<Option<usize>>,
}

impl InMemoryMovementStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Make the next `append_batch` fail while staging the draft at `index`.
    ///
    /// Simulates a storage failure in the middle of a batch.
    pub fn fail_next_batch_at(&self, index: usize) {
        if let Ok(mut fail_at) = self.fail_at.lock() {
            *fail_at = Some(index);
        }
    }

    /// Number of stored movements across all wallets, archived included.
    pub fn len(&self) -> usize {
        self.wallets
            .read()
            .map(|w| w.values().map(Vec::len).sum())
            .unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn take_injected_failure(&self) -> Option<usize> {
        self.fail_at.lock().ok().and_then(|mut f| f.take())
    }

    fn poisoned() -> StoreError {
        StoreError::Backend("lock poisoned".to_string())
    }
}

impl MovementStore for InMemoryMovementStore {
    fn append_batch(&self, drafts: Vec<MovementDraft>) -> Result<Vec<Movement>, StoreError> {
        let Some(wallet_id) = batch_wallet(&drafts)? else {
            return Ok(vec![]);
        };

        let fail_at = self.take_injected_failure();
        let batch_id = BatchId::new();
        let recorded_at = Utc::now();

        let mut staged = Vec::with_capacity(drafts.len());
        for (idx, draft) in drafts.into_iter().enumerate() {
            if fail_at == Some(idx) {
                return Err(StoreError::WriteAborted(format!(
                    "injected failure at index {idx} of batch {batch_id}"
                )));
            }
            staged.push(Movement::from_draft(draft, MovementId::new(), batch_id, recorded_at));
        }

        let mut wallets = self.wallets.write().map_err(|_| Self::poisoned())?;
        wallets.entry(wallet_id).or_default().extend(staged.iter().cloned());

        Ok(staged)
    }

    fn archive(&self, movement_id: MovementId) -> Result<Vec<MovementId>, StoreError> {
        let mut wallets = self.wallets.write().map_err(|_| Self::poisoned())?;

        let (wallet_id, batch_id) = wallets
            .iter()
            .find_map(|(wallet_id, movements)| {
                movements
                    .iter()
                    .find(|m| m.id == movement_id)
                    .map(|m| (*wallet_id, m.batch_id))
            })
            .ok_or(StoreError::NotFound(movement_id))?;

        let mut archived = Vec::new();
        if let Some(movements) = wallets.get_mut(&wallet_id) {
            for m in movements.iter_mut().filter(|m| m.batch_id == batch_id) {
                m.archived = true;
                archived.push(m.id);
            }
        }
        Ok(archived)
    }

    fn get(&self, movement_id: MovementId) -> Result<Option<Movement>, StoreError> {
        let wallets = self.wallets.read().map_err(|_| Self::poisoned())?;
        Ok(wallets
            .values()
            .flat_map(|movements| movements.iter())
            .find(|m| m.id == movement_id)
            .cloned())
    }

    fn list_active(&self, wallet_id: WalletId) -> Result<Vec<Movement>, StoreError> {
        let wallets = self.wallets.read().map_err(|_| Self::poisoned())?;
        Ok(wallets
            .get(&wallet_id)
            .map(|movements| movements.iter().filter(|m| m.is_active()).cloned().collect())
            .unwrap_or_default())
    }

    fn list_all(&self, wallet_id: WalletId) -> Result<Vec<Movement>, StoreError> {
        let wallets = self.wallets.read().map_err(|_| Self::poisoned())?;
        Ok(wallets.get(&wallet_id).cloned().unwrap_or_default())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;
    use splitledger_core::{CategoryId, ParticipantId};
    use splitledger_ledger::MovementKind;

    fn pair(wallet_id: WalletId) -> Vec<MovementDraft> {
        vec![
            MovementDraft::new(wallet_id, ParticipantId::new(), MovementKind::TransferOut, dec!(10), Utc::now()),
            MovementDraft::new(wallet_id, ParticipantId::new(), MovementKind::TransferIn, dec!(10), Utc::now()),
        ]
    }

    #[test]
    fn batch_shares_one_batch_id_and_timestamp() {
        let store = InMemoryMovementStore::new();
        let wallet_id = WalletId::new();

        let stored = store.append_batch(pair(wallet_id)).unwrap();

        assert_eq!(stored.len(), 2);
        assert_eq!(stored[0].batch_id, stored[1].batch_id);
        assert_eq!(stored[0].recorded_at, stored[1].recorded_at);
        assert_ne!(stored[0].id, stored[1].id);
        assert_eq!(store.list_active(wallet_id).unwrap().len(), 2);
    }

    #[test]
    fn injected_failure_leaves_nothing_behind() {
        let store = InMemoryMovementStore::new();
        let wallet_id = WalletId::new();
        store.fail_next_batch_at(1);

        let err = store.append_batch(pair(wallet_id)).unwrap_err();

        assert!(matches!(err, StoreError::WriteAborted(_)));
        assert!(store.is_empty());

        // The failure is one-shot.
        store.append_batch(pair(wallet_id)).unwrap();
        assert_eq!(store.len(), 2);
    }

    #[test]
    fn mixed_wallet_batches_are_rejected() {
        let store = InMemoryMovementStore::new();
        let mut drafts = pair(WalletId::new());
        drafts.extend(pair(WalletId::new()));

        assert!(matches!(store.append_batch(drafts), Err(StoreError::InvalidBatch(_))));
        assert!(store.is_empty());
    }

    #[test]
    fn archiving_one_side_archives_the_pair() {
        let store = InMemoryMovementStore::new();
        let wallet_id = WalletId::new();
        let stored = store.append_batch(pair(wallet_id)).unwrap();
        let single = store
            .append_batch(vec![
                MovementDraft::new(wallet_id, ParticipantId::new(), MovementKind::Expense, dec!(3), Utc::now())
                    .with_category(CategoryId::new()),
            ])
            .unwrap();

        let archived = store.archive(stored[1].id).unwrap();

        assert_eq!(archived.len(), 2);
        let active = store.list_active(wallet_id).unwrap();
        assert_eq!(active.len(), 1);
        assert_eq!(active[0].id, single[0].id);
        assert_eq!(store.list_all(wallet_id).unwrap().len(), 3);
        assert!(store.get(stored[0].id).unwrap().unwrap().archived);

        // Idempotent.
        assert_eq!(store.archive(stored[0].id).unwrap().len(), 2);
    }

    #[test]
    fn archiving_unknown_movement_is_not_found() {
        let store = InMemoryMovementStore::new();
        let id = MovementId::new();
        assert!(matches!(store.archive(id), Err(StoreError::NotFound(missing)) if missing == id));
    }

    #[test]
    fn empty_batch_is_a_no_op() {
        let store = InMemoryMovementStore::new();
        assert!(store.append_batch(vec![]).unwrap().is_empty());
    }
}
