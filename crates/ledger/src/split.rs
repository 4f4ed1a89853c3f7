//! Split-expense planner.
//!
//! One participant pays the whole bill; every other participant with a
//! non-zero share gets a settlement pair against the payer. The payer's own
//! share is covered by having paid and produces no rows.

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use rust_decimal::{Decimal, RoundingStrategy};
use serde::{Deserialize, Serialize};

use splitledger_core::{
    CategoryId, DomainError, DomainResult, MINOR_UNIT, ParticipantId, checked_sum,
    ensure_positive,
};

use crate::movement::{MovementDraft, MovementKind};
use crate::wallet::Wallet;

/// Transient description of how one payment is shared.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SplitPlan {
    pub payer: ParticipantId,
    pub total: Decimal,
    pub allocations: BTreeMap<ParticipantId, Decimal>,
}

impl SplitPlan {
    pub fn new(
        payer: ParticipantId,
        total: Decimal,
        allocations: impl IntoIterator<Item = (ParticipantId, Decimal)>,
    ) -> Self {
        Self {
            payer,
            total,
            allocations: allocations.into_iter().collect(),
        }
    }

    /// Share `total` evenly over `participants`.
    ///
    /// Shares are rounded down to the minor unit; leftover cents go one each to
    /// the first participants in the given order, so the plan always reconciles.
    pub fn equal(
        payer: ParticipantId,
        total: Decimal,
        participants: &[ParticipantId],
    ) -> DomainResult<Self> {
        ensure_positive(total)?;
        if participants.is_empty() {
            return Err(DomainError::validation(
                "an equal split needs at least one participant",
            ));
        }

        let count = Decimal::from(participants.len() as u64);
        let share = (total / count).round_dp_with_strategy(2, RoundingStrategy::ToZero);
        let mut remainder = total - share * count;

        let mut allocations = BTreeMap::new();
        for participant in participants {
            let mut amount = share;
            if remainder >= MINOR_UNIT {
                amount += MINOR_UNIT;
                remainder -= MINOR_UNIT;
            }
            *allocations.entry(*participant).or_insert(Decimal::ZERO) += amount;
        }
        // Sub-cent residue only exists when `total` itself has more than two decimals.
        if remainder > Decimal::ZERO {
            *allocations.entry(participants[0]).or_insert(Decimal::ZERO) += remainder;
        }

        Ok(Self {
            payer,
            total,
            allocations,
        })
    }

    /// Sum of all allocations.
    pub fn allocated(&self) -> DomainResult<Decimal> {
        checked_sum(self.allocations.values().copied())
    }

    /// Allocation of one participant (zero when absent).
    pub fn share_of(&self, participant: ParticipantId) -> Decimal {
        self.allocations
            .get(&participant)
            .copied()
            .unwrap_or(Decimal::ZERO)
    }

    /// Check `|allocated - total| < epsilon`.
    pub fn reconcile(&self, epsilon: Decimal) -> DomainResult<()> {
        let allocated = self.allocated()?;
        let difference = allocated
            .checked_sub(self.total)
            .ok_or_else(|| DomainError::validation("amount out of range"))?;
        if difference.abs() < epsilon {
            Ok(())
        } else {
            Err(DomainError::AllocationMismatch {
                total: self.total,
                allocated,
            })
        }
    }

    /// Participants other than the payer who owe something.
    pub fn debtors(&self) -> impl Iterator<Item = (ParticipantId, Decimal)> + '_ {
        self.allocations
            .iter()
            .filter(|(p, amount)| **p != self.payer && **amount > Decimal::ZERO)
            .map(|(p, amount)| (*p, *amount))
    }
}

/// Plan the drafts that realize `plan` in `wallet`.
///
/// Amounts stay in the plan's declared currency; the caller normalizes every
/// draft with one rate before persisting them as a single batch.
pub fn plan_split(
    wallet: &Wallet,
    plan: &SplitPlan,
    category_id: CategoryId,
    occurred_at: DateTime<Utc>,
    epsilon: Decimal,
) -> DomainResult<Vec<MovementDraft>> {
    ensure_positive(plan.total)?;
    wallet.ensure_member(plan.payer)?;

    for (participant, amount) in &plan.allocations {
        wallet.ensure_member(*participant)?;
        if *amount < Decimal::ZERO {
            return Err(DomainError::validation(format!(
                "allocation for {participant} is negative"
            )));
        }
    }

    plan.reconcile(epsilon)?;

    let mut drafts = vec![
        MovementDraft::new(
            wallet.id,
            plan.payer,
            MovementKind::Expense,
            plan.total,
            occurred_at,
        )
        .with_category(category_id),
    ];

    for (debtor, amount) in plan.debtors() {
        drafts.push(MovementDraft::new(
            wallet.id,
            debtor,
            MovementKind::SettlementOut,
            amount,
            occurred_at,
        ));
        drafts.push(MovementDraft::new(
            wallet.id,
            plan.payer,
            MovementKind::SettlementIn,
            amount,
            occurred_at,
        ));
    }

    Ok(drafts)
}
