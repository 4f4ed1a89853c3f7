use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use splitledger_core::{
    BatchId, CategoryId, CurrencyCode, DomainError, DomainResult, Entity, MovementId,
    ParticipantId, WalletId, ensure_positive,
};

/// Semantic kind of a movement.
///
/// Assigned when the movement is planned and never changed afterwards. The kind
/// alone decides how a movement contributes to settlement; notes are never
/// inspected.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum MovementKind {
    Expense,
    Income,
    TransferOut,
    TransferIn,
    SettlementOut,
    SettlementIn,
}

impl MovementKind {
    pub const ALL: [MovementKind; 6] = [
        MovementKind::Expense,
        MovementKind::Income,
        MovementKind::TransferOut,
        MovementKind::TransferIn,
        MovementKind::SettlementOut,
        MovementKind::SettlementIn,
    ];

    /// Peer-to-peer kinds that adjust balances outside the fair-share formula.
    pub fn is_direct(self) -> bool {
        !self.is_shared()
    }

    /// Kinds that are part of the wallet's shared spending.
    pub fn is_shared(self) -> bool {
        matches!(self, MovementKind::Expense | MovementKind::Income)
    }

    /// Expense and income carry a category; direct kinds must not.
    pub fn requires_category(self) -> bool {
        self.is_shared()
    }

    /// The kind recorded on the other side of a pair, if this kind is paired.
    pub fn counterpart(self) -> Option<MovementKind> {
        match self {
            MovementKind::TransferOut => Some(MovementKind::TransferIn),
            MovementKind::TransferIn => Some(MovementKind::TransferOut),
            MovementKind::SettlementOut => Some(MovementKind::SettlementIn),
            MovementKind::SettlementIn => Some(MovementKind::SettlementOut),
            MovementKind::Expense | MovementKind::Income => None,
        }
    }

    /// Signed contribution of a direct movement to its participant's adjustment.
    ///
    /// Outgoing kinds add, incoming kinds subtract; shared kinds contribute nothing.
    pub fn direct_sign(self) -> i8 {
        match self {
            MovementKind::TransferOut | MovementKind::SettlementOut => 1,
            MovementKind::TransferIn | MovementKind::SettlementIn => -1,
            MovementKind::Expense | MovementKind::Income => 0,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            MovementKind::Expense => "expense",
            MovementKind::Income => "income",
            MovementKind::TransferOut => "transferOut",
            MovementKind::TransferIn => "transferIn",
            MovementKind::SettlementOut => "settlementOut",
            MovementKind::SettlementIn => "settlementIn",
        }
    }
}

impl core::fmt::Display for MovementKind {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl core::str::FromStr for MovementKind {
    type Err = DomainError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        MovementKind::ALL
            .into_iter()
            .find(|k| k.as_str() == s)
            .ok_or_else(|| DomainError::validation(format!("unknown movement kind '{s}'")))
    }
}

/// Original figures of a movement recorded in a non-base currency.
///
/// Captured once, at creation; later rate snapshots never touch it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CurrencyAudit {
    pub original_amount: Decimal,
    pub original_currency: CurrencyCode,
    /// Units of base currency per unit of `original_currency`.
    pub exchange_rate: Decimal,
}

/// A movement that has been planned but not yet persisted.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MovementDraft {
    pub wallet_id: WalletId,
    pub participant_id: ParticipantId,
    pub kind: MovementKind,
    /// Amount in the wallet's base currency once normalized.
    pub amount_base: Decimal,
    pub category_id: Option<CategoryId>,
    pub notes: Option<String>,
    #[serde(default)]
    pub tags: Vec<String>,
    pub occurred_at: DateTime<Utc>,
    #[serde(flatten)]
    pub currency: Option<CurrencyAudit>,
}

impl MovementDraft {
    pub fn new(
        wallet_id: WalletId,
        participant_id: ParticipantId,
        kind: MovementKind,
        amount: Decimal,
        occurred_at: DateTime<Utc>,
    ) -> Self {
        Self {
            wallet_id,
            participant_id,
            kind,
            amount_base: amount,
            category_id: None,
            notes: None,
            tags: Vec::new(),
            occurred_at,
            currency: None,
        }
    }

    pub fn with_category(mut self, category_id: CategoryId) -> Self {
        self.category_id = Some(category_id);
        self
    }

    pub fn with_notes(mut self, notes: Option<String>) -> Self {
        self.notes = notes
            .map(|n| n.trim().to_string())
            .filter(|n| !n.is_empty());
        self
    }

    pub fn with_tags(mut self, tags: Vec<String>) -> Self {
        self.tags = tags
            .into_iter()
            .map(|t| t.trim().to_string())
            .filter(|t| !t.is_empty())
            .collect();
        self
    }

    /// Validate the draft on its own (amount sign, category rules).
    ///
    /// Membership and pairing are checked by the planners, which see the wallet.
    pub fn validate(&self) -> DomainResult<()> {
        ensure_positive(self.amount_base)?;

        match (self.kind.requires_category(), self.category_id) {
            (true, None) => {
                return Err(DomainError::validation(format!(
                    "{} movements require a category",
                    self.kind
                )));
            }
            (false, Some(_)) => {
                return Err(DomainError::validation(format!(
                    "{} movements cannot carry a category",
                    self.kind
                )));
            }
            _ => {}
        }

        if let Some(audit) = &self.currency {
            ensure_positive(audit.original_amount)?;
            ensure_positive(audit.exchange_rate)?;
        }

        Ok(())
    }
}

/// A persisted ledger entry.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Movement {
    pub id: MovementId,
    /// Shared by every movement written in the same atomic batch.
    pub batch_id: BatchId,
    pub wallet_id: WalletId,
    pub participant_id: ParticipantId,
    pub kind: MovementKind,
    pub amount_base: Decimal,
    pub category_id: Option<CategoryId>,
    pub notes: Option<String>,
    #[serde(default)]
    pub tags: Vec<String>,
    pub occurred_at: DateTime<Utc>,
    pub recorded_at: DateTime<Utc>,
    pub archived: bool,
    #[serde(flatten)]
    pub currency: Option<CurrencyAudit>,
}

impl Movement {
    /// Materialize a draft as a stored movement. Called by store adapters.
    pub fn from_draft(
        draft: MovementDraft,
        id: MovementId,
        batch_id: BatchId,
        recorded_at: DateTime<Utc>,
    ) -> Self {
        Self {
            id,
            batch_id,
            wallet_id: draft.wallet_id,
            participant_id: draft.participant_id,
            kind: draft.kind,
            amount_base: draft.amount_base,
            category_id: draft.category_id,
            notes: draft.notes,
            tags: draft.tags,
            occurred_at: draft.occurred_at,
            recorded_at,
            archived: false,
            currency: draft.currency,
        }
    }

    pub fn is_active(&self) -> bool {
        !self.archived
    }

    /// Amount as originally declared (falls back to the base amount).
    pub fn declared_amount(&self) -> Decimal {
        self.currency
            .as_ref()
            .map(|c| c.original_amount)
            .unwrap_or(self.amount_base)
    }
}

impl Entity for Movement {
    type Id = MovementId;

    fn id(&self) -> &Self::Id {
        &self.id
    }
}

/// Check that every transfer/settlement in `drafts` has a matching counterpart.
///
/// A batch is balanced when, per pair kind, the out-side and in-side amounts
/// match one-for-one and never land on the same participant.
pub fn ensure_pairs_balanced(drafts: &[MovementDraft]) -> DomainResult<()> {
    for out_kind in [MovementKind::TransferOut, MovementKind::SettlementOut] {
        let Some(in_kind) = out_kind.counterpart() else {
            continue;
        };

        let mut outs: Vec<&MovementDraft> = drafts.iter().filter(|d| d.kind == out_kind).collect();
        let ins: Vec<&MovementDraft> = drafts.iter().filter(|d| d.kind == in_kind).collect();

        if outs.len() != ins.len() {
            return Err(DomainError::invariant(format!(
                "{} {out_kind} drafts but {} {in_kind} drafts",
                outs.len(),
                ins.len()
            )));
        }

        for incoming in ins {
            let matched = outs.iter().position(|o| {
                o.amount_base == incoming.amount_base
                    && o.participant_id != incoming.participant_id
            });
            match matched {
                Some(idx) => {
                    outs.swap_remove(idx);
                }
                None => {
                    return Err(DomainError::invariant(format!(
                        "{in_kind} of {} has no matching {out_kind}",
                        incoming.amount_base
                    )));
                }
            }
        }
    }
    Ok(())
}
