//! Transfer planner: one direct payment between two wallet members.

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;

use splitledger_core::{DomainError, DomainResult, ParticipantId, ensure_positive};

use crate::movement::{MovementDraft, MovementKind};
use crate::wallet::Wallet;

/// Plan the paired drafts for `from` paying `amount` to `to`.
///
/// `amount` is in whatever currency the caller declared; normalization happens
/// afterwards and applies the same rate to both sides. The two drafts must be
/// persisted in one atomic batch.
pub fn plan_transfer(
    wallet: &Wallet,
    from: ParticipantId,
    to: ParticipantId,
    amount: Decimal,
    occurred_at: DateTime<Utc>,
) -> DomainResult<[MovementDraft; 2]> {
    wallet.ensure_member(from)?;
    wallet.ensure_member(to)?;
    if from == to {
        return Err(DomainError::validation(
            "a transfer needs two different participants",
        ));
    }
    ensure_positive(amount)?;

    Ok([
        MovementDraft::new(wallet.id, from, MovementKind::TransferOut, amount, occurred_at),
        MovementDraft::new(wallet.id, to, MovementKind::TransferIn, amount, occurred_at),
    ])
}
