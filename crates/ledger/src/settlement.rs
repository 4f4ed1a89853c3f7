//! Settlement calculator.
//!
//! Pure function over a snapshot of movements: nothing is cached between calls,
//! so concurrent readers need no coordination and the result depends only on
//! the set of movements, never on their order.
//!
//! For every participant:
//!
//! ```text
//! balance = paid - fair_share + direct_adjustment
//! ```
//!
//! - `paid`: sum of the participant's active `expense` movements
//! - `fair_share`: total active expenses / number of current members
//! - `direct_adjustment`: `+amount` per `transferOut`/`settlementOut`,
//!   `-amount` per `transferIn`/`settlementIn`
//!
//! Positive means the participant is owed money, negative means they owe.
//! Income is reported (`received`) but never enters the formula.

use std::collections::{BTreeMap, HashMap};

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use splitledger_core::{
    DomainError, DomainResult, MINOR_UNIT, ParticipantId, WalletId, checked_add,
};

use crate::movement::{Movement, MovementKind};
use crate::wallet::Wallet;

/// Where a participant stands once balances are computed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BalanceStatus {
    /// Others owe this participant.
    Owed,
    /// This participant owes others.
    Owes,
    Settled,
}

/// Per-participant breakdown of a balance.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ParticipantBalance {
    pub participant_id: ParticipantId,
    /// False for participants who left the wallet but still have movements.
    pub is_member: bool,
    pub paid: Decimal,
    pub received: Decimal,
    pub fair_share: Decimal,
    pub direct_adjustment: Decimal,
    pub balance: Decimal,
}

impl ParticipantBalance {
    fn empty(participant_id: ParticipantId, is_member: bool) -> Self {
        Self {
            participant_id,
            is_member,
            paid: Decimal::ZERO,
            received: Decimal::ZERO,
            fair_share: Decimal::ZERO,
            direct_adjustment: Decimal::ZERO,
            balance: Decimal::ZERO,
        }
    }

    pub fn status(&self) -> BalanceStatus {
        if self.balance.abs() < MINOR_UNIT {
            BalanceStatus::Settled
        } else if self.balance > Decimal::ZERO {
            BalanceStatus::Owed
        } else {
            BalanceStatus::Owes
        }
    }
}

/// Balances of one wallet, derived from its active movements.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BalanceSheet {
    pub wallet_id: WalletId,
    pub total_shared_expense: Decimal,
    pub fair_share: Decimal,
    /// Current members in display order, then former members by id.
    pub participants: Vec<ParticipantBalance>,
}

impl BalanceSheet {
    pub fn get(&self, participant: ParticipantId) -> Option<&ParticipantBalance> {
        self.participants
            .iter()
            .find(|p| p.participant_id == participant)
    }

    pub fn balance_of(&self, participant: ParticipantId) -> Option<Decimal> {
        self.get(participant).map(|p| p.balance)
    }

    /// Plain `participant -> balance` view.
    pub fn balances(&self) -> BTreeMap<ParticipantId, Decimal> {
        self.participants
            .iter()
            .map(|p| (p.participant_id, p.balance))
            .collect()
    }

    /// Sum of all balances. Zero (within rounding) for every valid movement set.
    pub fn net(&self) -> Decimal {
        self.participants.iter().map(|p| p.balance).sum()
    }

    /// True when every participant is within `epsilon` of zero.
    pub fn is_settled(&self, epsilon: Decimal) -> bool {
        self.participants.iter().all(|p| p.balance.abs() < epsilon)
    }
}

/// Compute balances for `wallet_id` over `movements`.
///
/// `members` is the wallet's current membership; every member carries a fair
/// share even without movements. Archived movements are skipped. Movements of a
/// participant who is no longer a member still count, without a fair share.
pub fn compute_balances(
    wallet_id: WalletId,
    members: &[ParticipantId],
    movements: &[Movement],
) -> DomainResult<BalanceSheet> {
    let mut order: Vec<ParticipantId> = Vec::with_capacity(members.len());
    for m in members {
        if !order.contains(m) {
            order.push(*m);
        }
    }
    if order.is_empty() {
        return Err(DomainError::EmptyWallet(wallet_id));
    }

    let mut rows: HashMap<ParticipantId, ParticipantBalance> = order
        .iter()
        .map(|p| (*p, ParticipantBalance::empty(*p, true)))
        .collect();
    let mut total_shared_expense = Decimal::ZERO;

    for movement in movements {
        if movement.wallet_id != wallet_id {
            return Err(DomainError::invariant(format!(
                "movement {} belongs to wallet {}, not {wallet_id}",
                movement.id, movement.wallet_id
            )));
        }
        if movement.archived {
            continue;
        }

        let row = rows
            .entry(movement.participant_id)
            .or_insert_with(|| ParticipantBalance::empty(movement.participant_id, false));
        let amount = movement.amount_base;

        match movement.kind {
            MovementKind::Expense => {
                row.paid = checked_add(row.paid, amount)?;
                total_shared_expense = checked_add(total_shared_expense, amount)?;
            }
            MovementKind::Income => row.received = checked_add(row.received, amount)?,
            kind if kind.direct_sign() > 0 => {
                row.direct_adjustment = checked_add(row.direct_adjustment, amount)?;
            }
            _ => row.direct_adjustment = checked_add(row.direct_adjustment, -amount)?,
        }
    }

    let fair_share = total_shared_expense / Decimal::from(order.len() as u64);

    let mut former: Vec<ParticipantId> = rows
        .values()
        .filter(|r| !r.is_member)
        .map(|r| r.participant_id)
        .collect();
    former.sort();

    let participants = order
        .into_iter()
        .chain(former)
        .filter_map(|p| rows.remove(&p))
        .map(|mut row| {
            if row.is_member {
                row.fair_share = fair_share;
            }
            row.balance = checked_add(row.paid - row.fair_share, row.direct_adjustment)?;
            Ok(row)
        })
        .collect::<DomainResult<Vec<_>>>()?;

    Ok(BalanceSheet {
        wallet_id,
        total_shared_expense,
        fair_share,
        participants,
    })
}

/// Convenience wrapper taking membership from the wallet itself.
pub fn compute_wallet_balances(wallet: &Wallet, movements: &[Movement]) -> DomainResult<BalanceSheet> {
    compute_balances(wallet.id, &wallet.participants, movements)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::movement::MovementDraft;
    use crate::split::{SplitPlan, plan_split};
    use crate::transfer::plan_transfer;
    use chrono::Utc;
    use proptest::prelude::*;
    use rust_decimal_macros::dec;
    use splitledger_core::{BatchId, CategoryId, CurrencyCode, MovementId};

    fn wallet_of(n: usize) -> Wallet {
        let owner = ParticipantId::new();
        let mut wallet = Wallet::personal(WalletId::new(), "Test", owner, CurrencyCode::new("EUR").unwrap());
        for _ in 1..n {
            wallet.add_participant(ParticipantId::new());
        }
        wallet
    }

    fn persist(drafts: impl IntoIterator<Item = MovementDraft>) -> Vec<Movement> {
        let batch = BatchId::new();
        drafts
            .into_iter()
            .map(|d| Movement::from_draft(d, MovementId::new(), batch, Utc::now()))
            .collect()
    }

    fn expense(wallet: &Wallet, who: ParticipantId, amount: Decimal) -> Vec<Movement> {
        persist([MovementDraft::new(wallet.id, who, MovementKind::Expense, amount, Utc::now())
            .with_category(CategoryId::new())])
    }

    fn income(wallet: &Wallet, who: ParticipantId, amount: Decimal) -> Vec<Movement> {
        persist([MovementDraft::new(wallet.id, who, MovementKind::Income, amount, Utc::now())
            .with_category(CategoryId::new())])
    }

    #[test]
    fn empty_wallet_is_rejected() {
        let id = WalletId::new();
        assert_eq!(compute_balances(id, &[], &[]), Err(DomainError::EmptyWallet(id)));
    }

    #[test]
    fn members_without_movements_still_owe_their_share() {
        let wallet = wallet_of(3);
        let [a, b, c] = [wallet.participants[0], wallet.participants[1], wallet.participants[2]];
        let movements = expense(&wallet, a, dec!(90));

        let sheet = compute_wallet_balances(&wallet, &movements).unwrap();

        assert_eq!(sheet.total_shared_expense, dec!(90));
        assert_eq!(sheet.fair_share, dec!(30));
        assert_eq!(sheet.balance_of(a), Some(dec!(60)));
        assert_eq!(sheet.balance_of(b), Some(dec!(-30)));
        assert_eq!(sheet.balance_of(c), Some(dec!(-30)));
        assert_eq!(sheet.get(a).unwrap().status(), BalanceStatus::Owed);
        assert_eq!(sheet.get(b).unwrap().status(), BalanceStatus::Owes);
        assert_eq!(sheet.net(), Decimal::ZERO);
    }

    #[test]
    fn transfer_moves_both_parties_by_the_amount() {
        let wallet = wallet_of(2);
        let [a, b] = [wallet.participants[0], wallet.participants[1]];
        let mut movements = expense(&wallet, b, dec!(40));
        let before = compute_wallet_balances(&wallet, &movements).unwrap();

        movements.extend(persist(plan_transfer(&wallet, a, b, dec!(100), Utc::now()).unwrap()));
        let after = compute_wallet_balances(&wallet, &movements).unwrap();

        let delta_a = after.balance_of(a).unwrap() - before.balance_of(a).unwrap();
        let delta_b = after.balance_of(b).unwrap() - before.balance_of(b).unwrap();
        assert_eq!(delta_a, dec!(100));
        assert_eq!(delta_b, dec!(-100));
        assert_eq!(after.get(a).unwrap().direct_adjustment, dec!(100));
        assert_eq!(after.net(), Decimal::ZERO);
    }

    #[test]
    fn split_settlements_offset_the_fair_share_baseline() {
        let wallet = wallet_of(3);
        let [a, b, c] = [wallet.participants[0], wallet.participants[1], wallet.participants[2]];
        let plan = SplitPlan::new(a, dec!(90), [(a, dec!(30)), (b, dec!(30)), (c, dec!(30))]);
        let movements = persist(
            plan_split(&wallet, &plan, CategoryId::new(), Utc::now(), MINOR_UNIT).unwrap(),
        );

        let expense_only: Vec<Movement> = movements
            .iter()
            .filter(|m| m.kind == MovementKind::Expense)
            .cloned()
            .collect();
        let baseline = compute_wallet_balances(&wallet, &expense_only).unwrap();
        assert_eq!(baseline.balance_of(a), Some(dec!(60)));
        assert_eq!(baseline.balance_of(b), Some(dec!(-30)));
        assert_eq!(baseline.balance_of(c), Some(dec!(-30)));

        let realized = compute_wallet_balances(&wallet, &movements).unwrap();
        let settled_to_a: Decimal = plan.debtors().map(|(_, amount)| amount).sum();
        assert_eq!(settled_to_a, dec!(60));
        assert_eq!(
            baseline.balance_of(a).unwrap() - realized.balance_of(a).unwrap(),
            settled_to_a
        );
        assert_eq!(realized.balance_of(b).unwrap() - baseline.balance_of(b).unwrap(), dec!(30));
        assert_eq!(realized.balance_of(c).unwrap() - baseline.balance_of(c).unwrap(), dec!(30));
        assert!(realized.is_settled(MINOR_UNIT));
    }

    #[test]
    fn income_is_reported_but_not_shared() {
        let wallet = wallet_of(2);
        let [a, b] = [wallet.participants[0], wallet.participants[1]];
        let movements = income(&wallet, a, dec!(500));

        let sheet = compute_wallet_balances(&wallet, &movements).unwrap();

        assert_eq!(sheet.get(a).unwrap().received, dec!(500));
        assert_eq!(sheet.balance_of(a), Some(Decimal::ZERO));
        assert_eq!(sheet.balance_of(b), Some(Decimal::ZERO));
        assert_eq!(sheet.total_shared_expense, Decimal::ZERO);
    }

    #[test]
    fn archived_movements_are_ignored() {
        let wallet = wallet_of(2);
        let [a, b] = [wallet.participants[0], wallet.participants[1]];
        let mut movements = expense(&wallet, a, dec!(50));
        movements[0].archived = true;
        movements.extend(expense(&wallet, b, dec!(10)));

        let sheet = compute_wallet_balances(&wallet, &movements).unwrap();

        assert_eq!(sheet.total_shared_expense, dec!(10));
        assert_eq!(sheet.balance_of(a), Some(dec!(-5)));
        assert_eq!(sheet.balance_of(b), Some(dec!(5)));
    }

    #[test]
    fn former_members_keep_their_history_without_a_share() {
        let mut wallet = wallet_of(3);
        let [a, b, c] = [wallet.participants[0], wallet.participants[1], wallet.participants[2]];
        let mut movements = expense(&wallet, c, dec!(30));
        movements.extend(expense(&wallet, a, dec!(60)));
        wallet.remove_participant(c);

        let sheet = compute_wallet_balances(&wallet, &movements).unwrap();

        assert_eq!(sheet.fair_share, dec!(45));
        let former = sheet.get(c).unwrap();
        assert!(!former.is_member);
        assert_eq!(former.fair_share, Decimal::ZERO);
        assert_eq!(former.balance, dec!(30));
        assert_eq!(sheet.balance_of(a), Some(dec!(15)));
        assert_eq!(sheet.balance_of(b), Some(dec!(-45)));
        assert_eq!(sheet.net(), Decimal::ZERO);
        assert_eq!(sheet.participants.last().unwrap().participant_id, c);
    }

    #[test]
    fn archiving_half_a_pair_breaks_the_zero_sum() {
        let wallet = wallet_of(2);
        let [a, b] = [wallet.participants[0], wallet.participants[1]];
        let mut movements = persist(plan_transfer(&wallet, a, b, dec!(25), Utc::now()).unwrap());
        movements[0].archived = true;

        let sheet = compute_wallet_balances(&wallet, &movements).unwrap();
        assert_eq!(sheet.net(), dec!(-25));

        movements[1].archived = true;
        let sheet = compute_wallet_balances(&wallet, &movements).unwrap();
        assert_eq!(sheet.net(), Decimal::ZERO);
    }

    #[test]
    fn sums_beyond_the_decimal_range_are_rejected() {
        let wallet = wallet_of(2);
        let a = wallet.participants[0];
        let mut movements = expense(&wallet, a, Decimal::MAX);
        movements.extend(expense(&wallet, a, Decimal::MAX));

        assert!(matches!(
            compute_wallet_balances(&wallet, &movements),
            Err(DomainError::Validation(_))
        ));
    }

    #[test]
    fn movements_of_another_wallet_are_an_invariant_violation() {
        let wallet = wallet_of(1);
        let other = wallet_of(1);
        let movements = expense(&other, other.participants[0], dec!(1));
        assert!(matches!(
            compute_wallet_balances(&wallet, &movements),
            Err(DomainError::InvariantViolation(_))
        ));
    }

    #[test]
    fn order_of_movements_does_not_matter() {
        let wallet = wallet_of(3);
        let [a, b, c] = [wallet.participants[0], wallet.participants[1], wallet.participants[2]];
        let mut movements = expense(&wallet, a, dec!(12.34));
        movements.extend(persist(plan_transfer(&wallet, b, c, dec!(7), Utc::now()).unwrap()));
        movements.extend(expense(&wallet, c, dec!(99.99)));

        let forward = compute_wallet_balances(&wallet, &movements).unwrap();
        movements.reverse();
        let backward = compute_wallet_balances(&wallet, &movements).unwrap();

        assert_eq!(forward.balances(), backward.balances());
    }

    #[derive(Debug, Clone)]
    enum Op {
        Expense { who: usize, cents: i64 },
        Income { who: usize, cents: i64 },
        Transfer { from: usize, to: usize, cents: i64 },
        Split { payer: usize, shares: Vec<i64> },
        Archive { index: usize },
    }

    fn op_strategy(n: usize) -> impl Strategy<Value = Op> {
        prop_oneof![
            (0..n, 1i64..1_000_000).prop_map(|(who, cents)| Op::Expense { who, cents }),
            (0..n, 1i64..1_000_000).prop_map(|(who, cents)| Op::Income { who, cents }),
            (0..n, 0..n, 1i64..1_000_000).prop_map(|(from, to, cents)| Op::Transfer { from, to, cents }),
            (0..n, prop::collection::vec(0i64..100_000, n)).prop_map(|(payer, shares)| Op::Split { payer, shares }),
            (0usize..64).prop_map(|index| Op::Archive { index }),
        ]
    }

    fn cents(c: i64) -> Decimal {
        Decimal::new(c, 2)
    }

    fn apply(wallet: &Wallet, movements: &mut Vec<Movement>, op: Op) {
        let p = &wallet.participants;
        match op {
            Op::Expense { who, cents: c } => movements.extend(expense(wallet, p[who], cents(c))),
            Op::Income { who, cents: c } => movements.extend(income(wallet, p[who], cents(c))),
            Op::Transfer { from, to, cents: c } => {
                if let Ok(drafts) = plan_transfer(wallet, p[from], p[to], cents(c), Utc::now()) {
                    movements.extend(persist(drafts));
                }
            }
            Op::Split { payer, shares } => {
                let total: i64 = shares.iter().sum();
                let plan = SplitPlan::new(
                    p[payer],
                    cents(total),
                    p.iter().copied().zip(shares.into_iter().map(cents)),
                );
                if let Ok(drafts) = plan_split(wallet, &plan, CategoryId::new(), Utc::now(), MINOR_UNIT) {
                    movements.extend(persist(drafts));
                }
            }
            Op::Archive { index } => {
                if !movements.is_empty() {
                    let batch = movements[index % movements.len()].batch_id;
                    for m in movements.iter_mut().filter(|m| m.batch_id == batch) {
                        m.archived = true;
                    }
                }
            }
        }
    }

    proptest! {
        #![proptest_config(ProptestConfig {
            cases: 256,
            ..ProptestConfig::default()
        })]

        /// Property: balances of any valid movement history sum to zero.
        #[test]
        fn balances_always_sum_to_zero(
            (n, ops) in (1usize..6).prop_flat_map(|n| (Just(n), prop::collection::vec(op_strategy(n), 0..40)))
        ) {
            let wallet = wallet_of(n);
            let mut movements = Vec::new();
            for op in ops {
                apply(&wallet, &mut movements, op);
            }

            let sheet = compute_wallet_balances(&wallet, &movements).unwrap();
            prop_assert!(sheet.net().abs() < MINOR_UNIT, "net = {}", sheet.net());
        }

        /// Property: a single-participant wallet never shows a debt.
        #[test]
        fn personal_wallet_is_always_settled(
            ops in prop::collection::vec(op_strategy(1), 0..40)
        ) {
            let wallet = wallet_of(1);
            let mut movements = Vec::new();
            for op in ops {
                apply(&wallet, &mut movements, op);
            }

            let sheet = compute_wallet_balances(&wallet, &movements).unwrap();
            prop_assert_eq!(sheet.participants.len(), 1);
            prop_assert!(sheet.participants[0].balance.abs() < MINOR_UNIT);
        }
    }
}
