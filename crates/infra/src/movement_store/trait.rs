use std::sync::Arc;

use thiserror::Error;

use splitledger_core::{MovementId, WalletId};
use splitledger_ledger::{Movement, MovementDraft};

/// Movement store operation error.
///
/// These are **infrastructure errors** (storage, atomicity) as opposed to
/// domain errors (validation, membership, reconciliation).
///
/// ## Error Categories
///
/// - **NotFound**: The referenced movement does not exist
/// - **InvalidBatch**: The batch itself is malformed (e.g. mixes wallets); nothing was written
/// - **WriteAborted**: The write failed and was rolled back; nothing was written
/// - **PartialBatch**: Atomicity was violated; fatal, never a partial success
/// - **Backend**: Any other storage failure (connection, lock poisoning, decoding)
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("movement not found: {0}")]
    NotFound(MovementId),

    #[error("invalid batch: {0}")]
    InvalidBatch(String),

    #[error("write aborted, nothing persisted: {0}")]
    WriteAborted(String),

    #[error("batch partially persisted: {0}")]
    PartialBatch(String),

    #[error("storage backend error: {0}")]
    Backend(String),
}

/// Append-mostly, wallet-scoped movement store.
///
/// ## Append Semantics
///
/// `append_batch()`:
/// - Validates that every draft targets the same wallet
/// - Assigns movement ids, one batch id and the commit timestamp
/// - Persists the batch atomically (all or nothing)
///
/// One logical operation (a transfer pair, a split) is always exactly one
/// batch, so readers never observe one side of a pair without the other.
///
/// ## Archive Semantics
///
/// `archive()` soft-deletes the movement **and every other movement of its
/// batch**, so pairs are archived together. Archiving is idempotent. Nothing is
/// ever hard-deleted.
///
/// ## Read Semantics
///
/// `list_active()` / `list_all()` return a snapshot taken from one consistent
/// read. Order is unspecified; settlement does not depend on it.
pub trait MovementStore: Send + Sync {
    /// Persist `drafts` atomically and return the stored movements in draft order.
    fn append_batch(&self, drafts: Vec<MovementDraft>) -> Result<Vec<Movement>, StoreError>;

    /// Archive the movement and its batch siblings; returns the ids now archived.
    fn archive(&self, movement_id: MovementId) -> Result<Vec<MovementId>, StoreError>;

    fn get(&self, movement_id: MovementId) -> Result<Option<Movement>, StoreError>;

    /// Non-archived movements of a wallet.
    fn list_active(&self, wallet_id: WalletId) -> Result<Vec<Movement>, StoreError>;

    /// All movements of a wallet, archived ones included.
    fn list_all(&self, wallet_id: WalletId) -> Result<Vec<Movement>, StoreError>;
}

impl<S> MovementStore for Arc<S>
where
    S: MovementStore + ?Sized,
{
    fn append_batch(&self, drafts: Vec<MovementDraft>) -> Result<Vec<Movement>, StoreError> {
        (**self).append_batch(drafts)
    }

    fn archive(&self, movement_id: MovementId) -> Result<Vec<MovementId>, StoreError> {
        (**self).archive(movement_id)
    }

    fn get(&self, movement_id: MovementId) -> Result<Option<Movement>, StoreError> {
        (**self).get(movement_id)
    }

    fn list_active(&self, wallet_id: WalletId) -> Result<Vec<Movement>, StoreError> {
        (**self).list_active(wallet_id)
    }

    fn list_all(&self, wallet_id: WalletId) -> Result<Vec<Movement>, StoreError> {
        (**self).list_all(wallet_id)
    }
}

/// Check that a non-empty batch targets a single wallet; returns that wallet.
pub(crate) fn batch_wallet(drafts: &[MovementDraft]) -> Result<Option<WalletId>, StoreError> {
    let Some(first) = drafts.first() else {
        return Ok(None);
    };
    for (idx, d) in drafts.iter().enumerate() {
        if d.wallet_id != first.wallet_id {
            return Err(StoreError::InvalidBatch(format!(
                "batch contains multiple wallet_ids (index {idx})"
            )));
        }
    }
    Ok(Some(first.wallet_id))
}
