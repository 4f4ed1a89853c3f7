//! Wallet ledger service (application-level orchestration).
//!
//! Every record operation follows the same pipeline:
//!
//! ```text
//! Command
//!   ↓
//! 1. Load wallet from the directory (must exist and not be archived)
//!   ↓
//! 2. Plan drafts (membership, amounts, categories, reconciliation)
//!   ↓
//! 3. Normalize every draft with one rate resolved from the caller's snapshot
//!   ↓
//! 4. Validate the batch (per-draft rules, balanced pairs)
//!   ↓
//! 5. Append the batch to the movement store (all or nothing)
//! ```
//!
//! Nothing is written until steps 1-4 pass. Reads recompute balances from the
//! current active movements on every call; no derived state is stored.

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{error, info, instrument, warn};

use splitledger_core::{
    CategoryId, CurrencyCode, DomainError, Money, MovementId, ParticipantId, WalletId,
};
use splitledger_ledger::{
    BalanceSheet, Category, CurrencyNormalizer, Movement, MovementDraft, MovementKind,
    RateSnapshot, SplitPlan, Wallet, WalletSummary, compute_wallet_balances,
    ensure_pairs_balanced, plan_split, plan_transfer,
};

use crate::config::EngineConfig;
use crate::directory::{CategoryCatalog, WalletDirectory};
use crate::movement_store::{MovementStore, StoreError};

#[derive(Debug, Error)]
pub enum ServiceError {
    /// Deterministic domain failure; nothing was written.
    #[error(transparent)]
    Domain(#[from] DomainError),

    /// The store reported (or the service detected) a batch that was only
    /// partly persisted. Fatal: the wallet needs operator attention.
    #[error("partial batch failure: {0}")]
    PartialBatchFailure(String),

    /// Storage failure; the batch was aborted as a whole.
    #[error("storage error: {0}")]
    Store(StoreError),
}

impl From<StoreError> for ServiceError {
    fn from(value: StoreError) -> Self {
        match value {
            StoreError::PartialBatch(msg) => ServiceError::PartialBatchFailure(msg),
            StoreError::NotFound(id) => {
                ServiceError::Domain(DomainError::not_found(format!("movement {id}")))
            }
            other => ServiceError::Store(other),
        }
    }
}

impl ServiceError {
    pub fn user_message(&self) -> String {
        match self {
            ServiceError::Domain(err) => err.user_message(),
            ServiceError::PartialBatchFailure(_) => {
                "Something went wrong while saving; please contact support before retrying."
                    .to_string()
            }
            ServiceError::Store(StoreError::WriteAborted(_)) => {
                "Nothing was saved. Please try again.".to_string()
            }
            ServiceError::Store(_) => {
                "The wallet is temporarily unavailable. Please try again later.".to_string()
            }
        }
    }

    /// The underlying domain error, if any.
    pub fn as_domain(&self) -> Option<&DomainError> {
        match self {
            ServiceError::Domain(err) => Some(err),
            _ => None,
        }
    }
}

pub type ServiceResult<T> = Result<T, ServiceError>;

/// Record an expense or an income.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RecordMovement {
    pub wallet_id: WalletId,
    pub participant_id: ParticipantId,
    pub amount: Decimal,
    pub currency: CurrencyCode,
    pub category_id: CategoryId,
    #[serde(default)]
    pub notes: Option<String>,
    #[serde(default)]
    pub tags: Vec<String>,
    /// Defaults to the time the command is handled.
    #[serde(default)]
    pub occurred_at: Option<DateTime<Utc>>,
}

impl RecordMovement {
    pub fn new(
        wallet_id: WalletId,
        participant_id: ParticipantId,
        amount: Decimal,
        currency: CurrencyCode,
        category_id: CategoryId,
    ) -> Self {
        Self {
            wallet_id,
            participant_id,
            amount,
            currency,
            category_id,
            notes: None,
            tags: Vec::new(),
            occurred_at: None,
        }
    }

    pub fn with_notes(mut self, notes: impl Into<String>) -> Self {
        self.notes = Some(notes.into());
        self
    }

    /// Amount and currency as entered.
    pub fn declared(&self) -> Money {
        Money::new(self.amount, self.currency.clone())
    }

    pub fn with_tags<I, T>(mut self, tags: I) -> Self
    where
        I: IntoIterator<Item = T>,
        T: Into<String>,
    {
        self.tags = tags.into_iter().map(Into::into).collect();
        self
    }

    pub fn occurred_at(mut self, at: DateTime<Utc>) -> Self {
        self.occurred_at = Some(at);
        self
    }
}

/// Record a direct payment between two members.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RecordTransfer {
    pub wallet_id: WalletId,
    pub from: ParticipantId,
    pub to: ParticipantId,
    pub amount: Decimal,
    pub currency: CurrencyCode,
    #[serde(default)]
    pub notes: Option<String>,
    #[serde(default)]
    pub tags: Vec<String>,
    #[serde(default)]
    pub occurred_at: Option<DateTime<Utc>>,
}

impl RecordTransfer {
    pub fn new(
        wallet_id: WalletId,
        from: ParticipantId,
        to: ParticipantId,
        amount: Decimal,
        currency: CurrencyCode,
    ) -> Self {
        Self {
            wallet_id,
            from,
            to,
            amount,
            currency,
            notes: None,
            tags: Vec::new(),
            occurred_at: None,
        }
    }

    pub fn declared(&self) -> Money {
        Money::new(self.amount, self.currency.clone())
    }

    pub fn with_notes(mut self, notes: impl Into<String>) -> Self {
        self.notes = Some(notes.into());
        self
    }

    pub fn occurred_at(mut self, at: DateTime<Utc>) -> Self {
        self.occurred_at = Some(at);
        self
    }
}

/// Record an expense paid by one member and split across several.
///
/// Allocations are declared in `currency`, like the total.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RecordSplit {
    pub wallet_id: WalletId,
    pub payer: ParticipantId,
    pub total: Decimal,
    pub currency: CurrencyCode,
    pub category_id: CategoryId,
    pub allocations: BTreeMap<ParticipantId, Decimal>,
    #[serde(default)]
    pub notes: Option<String>,
    #[serde(default)]
    pub tags: Vec<String>,
    #[serde(default)]
    pub occurred_at: Option<DateTime<Utc>>,
}

impl RecordSplit {
    pub fn new(
        wallet_id: WalletId,
        payer: ParticipantId,
        total: Decimal,
        currency: CurrencyCode,
        category_id: CategoryId,
        allocations: impl IntoIterator<Item = (ParticipantId, Decimal)>,
    ) -> Self {
        Self {
            wallet_id,
            payer,
            total,
            currency,
            category_id,
            allocations: allocations.into_iter().collect(),
            notes: None,
            tags: Vec::new(),
            occurred_at: None,
        }
    }

    /// Split `total` evenly over `participants`.
    pub fn equal(
        wallet_id: WalletId,
        payer: ParticipantId,
        total: Decimal,
        currency: CurrencyCode,
        category_id: CategoryId,
        participants: &[ParticipantId],
    ) -> Result<Self, DomainError> {
        let plan = SplitPlan::equal(payer, total, participants)?;
        Ok(Self::new(
            wallet_id,
            payer,
            total,
            currency,
            category_id,
            plan.allocations,
        ))
    }

    pub fn declared(&self) -> Money {
        Money::new(self.total, self.currency.clone())
    }

    pub fn with_notes(mut self, notes: impl Into<String>) -> Self {
        self.notes = Some(notes.into());
        self
    }

    pub fn occurred_at(mut self, at: DateTime<Utc>) -> Self {
        self.occurred_at = Some(at);
        self
    }
}

/// Collaborator-facing facade over the ledger.
///
/// `Send + Sync` whenever its store and ports are; share it behind an `Arc`.
#[derive(Debug)]
pub struct WalletLedgerService<S, D, C> {
    store: S,
    directory: D,
    categories: C,
    config: EngineConfig,
}

impl<S, D, C> WalletLedgerService<S, D, C>
where
    S: MovementStore,
    D: WalletDirectory,
    C: CategoryCatalog,
{
    pub fn new(store: S, directory: D, categories: C) -> Self {
        Self::with_config(store, directory, categories, EngineConfig::default())
    }

    pub fn with_config(store: S, directory: D, categories: C, config: EngineConfig) -> Self {
        Self {
            store,
            directory,
            categories,
            config,
        }
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    pub fn store(&self) -> &S {
        &self.store
    }

    #[instrument(skip(self, cmd, rates), fields(wallet_id = %cmd.wallet_id, participant_id = %cmd.participant_id, declared = %cmd.declared()), err)]
    pub fn record_expense(&self, cmd: RecordMovement, rates: &RateSnapshot) -> ServiceResult<Movement> {
        self.record_single(MovementKind::Expense, cmd, rates)
    }

    #[instrument(skip(self, cmd, rates), fields(wallet_id = %cmd.wallet_id, participant_id = %cmd.participant_id, declared = %cmd.declared()), err)]
    pub fn record_income(&self, cmd: RecordMovement, rates: &RateSnapshot) -> ServiceResult<Movement> {
        self.record_single(MovementKind::Income, cmd, rates)
    }

    #[instrument(skip(self, cmd, rates), fields(wallet_id = %cmd.wallet_id, from = %cmd.from, to = %cmd.to, declared = %cmd.declared()), err)]
    pub fn record_transfer(
        &self,
        cmd: RecordTransfer,
        rates: &RateSnapshot,
    ) -> ServiceResult<[Movement; 2]> {
        let wallet = self.writable_wallet(cmd.wallet_id)?;
        let normalizer = CurrencyNormalizer::resolve(&cmd.currency, &wallet.base_currency, rates)
            .inspect_err(|err| warn!(%err, "transfer rejected"))?;

        let occurred_at = cmd.occurred_at.unwrap_or_else(Utc::now);
        let drafts = plan_transfer(&wallet, cmd.from, cmd.to, cmd.amount, occurred_at)
            .inspect_err(|err| warn!(%err, "transfer rejected"))?
            .into_iter()
            .map(|d| {
                normalizer.apply_to(d.with_notes(cmd.notes.clone()).with_tags(cmd.tags.clone()))
            })
            .collect::<Result<Vec<_>, _>>()?;

        let stored = self.commit(drafts)?;
        <[Movement; 2]>::try_from(stored).map_err(|stored| {
            error!(count = stored.len(), "transfer batch did not persist exactly two movements");
            ServiceError::PartialBatchFailure(format!(
                "transfer persisted {} movements instead of 2",
                stored.len()
            ))
        })
    }

    #[instrument(skip(self, cmd, rates), fields(wallet_id = %cmd.wallet_id, payer = %cmd.payer, declared = %cmd.declared()), err)]
    pub fn record_split(&self, cmd: RecordSplit, rates: &RateSnapshot) -> ServiceResult<Vec<Movement>> {
        let wallet = self.writable_wallet(cmd.wallet_id)?;
        self.ensure_category(cmd.category_id)?;
        let normalizer = CurrencyNormalizer::resolve(&cmd.currency, &wallet.base_currency, rates)
            .inspect_err(|err| warn!(%err, "split rejected"))?;

        let plan = SplitPlan::new(cmd.payer, cmd.total, cmd.allocations);
        let occurred_at = cmd.occurred_at.unwrap_or_else(Utc::now);

        // Reconciliation happens in the declared currency, before conversion.
        let drafts = plan_split(
            &wallet,
            &plan,
            cmd.category_id,
            occurred_at,
            self.config.split_epsilon,
        )
        .inspect_err(|err| warn!(%err, "split rejected"))?
        .into_iter()
        .map(|d| normalizer.apply_to(d.with_notes(cmd.notes.clone()).with_tags(cmd.tags.clone())))
        .collect::<Result<Vec<_>, _>>()?;

        self.commit(drafts)
    }

    /// Archive a movement. The other movements of its batch are archived with it.
    #[instrument(skip_all, fields(movement_id = %movement_id), err)]
    pub fn archive_movement(&self, movement_id: MovementId) -> ServiceResult<()> {
        let archived = self.store.archive(movement_id)?;
        info!(archived = archived.len(), "movement batch archived");
        Ok(())
    }

    /// Current balances, recomputed from every active movement of the wallet.
    #[instrument(skip_all, fields(wallet_id = %wallet_id), err)]
    pub fn get_balances(&self, wallet_id: WalletId) -> ServiceResult<BalanceSheet> {
        let wallet = self.wallet(wallet_id)?;
        let movements = self.store.list_active(wallet_id)?;
        Ok(compute_wallet_balances(&wallet, &movements)?)
    }

    /// Wallet history, oldest first.
    pub fn list_movements(
        &self,
        wallet_id: WalletId,
        include_archived: bool,
    ) -> ServiceResult<Vec<Movement>> {
        self.wallet(wallet_id)?;
        let mut movements = if include_archived {
            self.store.list_all(wallet_id)?
        } else {
            self.store.list_active(wallet_id)?
        };
        movements.sort_by(|a, b| {
            a.occurred_at
                .cmp(&b.occurred_at)
                .then(a.recorded_at.cmp(&b.recorded_at))
                .then(a.id.cmp(&b.id))
        });
        Ok(movements)
    }

    pub fn get_summary(&self, wallet_id: WalletId) -> ServiceResult<WalletSummary> {
        let wallet = self.wallet(wallet_id)?;
        let movements = self.store.list_active(wallet_id)?;
        Ok(WalletSummary::summarize(&wallet, &movements)?)
    }

    pub fn categories(&self) -> ServiceResult<Vec<Category>> {
        Ok(self.categories.all()?)
    }

    fn record_single(
        &self,
        kind: MovementKind,
        cmd: RecordMovement,
        rates: &RateSnapshot,
    ) -> ServiceResult<Movement> {
        let wallet = self.writable_wallet(cmd.wallet_id)?;
        wallet
            .ensure_member(cmd.participant_id)
            .inspect_err(|err| warn!(%err, %kind, "movement rejected"))?;
        self.ensure_category(cmd.category_id)?;

        let normalizer = CurrencyNormalizer::resolve(&cmd.currency, &wallet.base_currency, rates)
            .inspect_err(|err| warn!(%err, %kind, "movement rejected"))?;

        let occurred_at = cmd.occurred_at.unwrap_or_else(Utc::now);
        let draft = MovementDraft::new(wallet.id, cmd.participant_id, kind, cmd.amount, occurred_at)
            .with_category(cmd.category_id)
            .with_notes(cmd.notes)
            .with_tags(cmd.tags);
        let draft = normalizer
            .apply_to(draft)
            .inspect_err(|err| warn!(%err, %kind, "movement rejected"))?;

        let mut stored = self.commit(vec![draft])?;
        match (stored.pop(), stored.is_empty()) {
            (Some(movement), true) => Ok(movement),
            _ => {
                error!(%kind, "single-movement batch did not persist exactly one movement");
                Err(ServiceError::PartialBatchFailure(format!(
                    "{kind} batch persisted an unexpected number of movements"
                )))
            }
        }
    }

    /// Validate the whole batch, then append it in one write.
    fn commit(&self, drafts: Vec<MovementDraft>) -> ServiceResult<Vec<Movement>> {
        for draft in &drafts {
            draft.validate()?;
        }
        ensure_pairs_balanced(&drafts)?;

        let expected = drafts.len();
        let stored = self.store.append_batch(drafts).inspect_err(|err| match err {
            StoreError::PartialBatch(_) => error!(%err, "batch atomicity violated"),
            _ => warn!(%err, "batch aborted"),
        })?;

        if stored.len() != expected {
            error!(expected, persisted = stored.len(), "batch atomicity violated");
            return Err(ServiceError::PartialBatchFailure(format!(
                "expected {expected} movements, store returned {}",
                stored.len()
            )));
        }

        if let Some(first) = stored.first() {
            info!(
                batch_id = %first.batch_id,
                movements = stored.len(),
                "batch committed"
            );
        }
        Ok(stored)
    }

    fn wallet(&self, wallet_id: WalletId) -> ServiceResult<Wallet> {
        self.directory
            .wallet(wallet_id)?
            .ok_or_else(|| DomainError::not_found(format!("wallet {wallet_id}")).into())
    }

    fn writable_wallet(&self, wallet_id: WalletId) -> ServiceResult<Wallet> {
        let wallet = self.wallet(wallet_id)?;
        wallet
            .ensure_active()
            .inspect_err(|err| warn!(%err, "record rejected"))?;
        Ok(wallet)
    }

    fn ensure_category(&self, category_id: CategoryId) -> ServiceResult<()> {
        match self.categories.category(category_id)? {
            Some(_) => Ok(()),
            None => {
                warn!(%category_id, "unknown category");
                Err(DomainError::not_found(format!("category {category_id}")).into())
            }
        }
    }
}
