//! Wallet-level totals for history and overview screens.

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use splitledger_core::{CurrencyCode, DomainResult, WalletId, checked_add};

use crate::currency::RateSnapshot;
use crate::movement::{Movement, MovementKind};
use crate::wallet::Wallet;

/// Totals over the active shared movements of a wallet.
///
/// Transfers and settlements move money between members and are left out.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WalletSummary {
    pub wallet_id: WalletId,
    pub currency: CurrencyCode,
    pub total_expenses: Decimal,
    pub total_income: Decimal,
    /// `total_income - total_expenses`.
    pub net_flow: Decimal,
    pub movement_count: usize,
}

impl WalletSummary {
    pub fn summarize(wallet: &Wallet, movements: &[Movement]) -> DomainResult<Self> {
        let mut total_expenses = Decimal::ZERO;
        let mut total_income = Decimal::ZERO;
        let mut movement_count = 0;

        for m in movements
            .iter()
            .filter(|m| m.is_active() && m.wallet_id == wallet.id)
        {
            match m.kind {
                MovementKind::Expense => total_expenses = checked_add(total_expenses, m.amount_base)?,
                MovementKind::Income => total_income = checked_add(total_income, m.amount_base)?,
                _ => continue,
            }
            movement_count += 1;
        }

        Ok(Self {
            wallet_id: wallet.id,
            currency: wallet.base_currency.clone(),
            total_expenses,
            total_income,
            net_flow: total_income - total_expenses,
            movement_count,
        })
    }

    /// The same totals expressed in `target` (e.g. a viewer's home currency).
    pub fn in_currency(&self, target: &CurrencyCode, rates: &RateSnapshot) -> DomainResult<Self> {
        let convert = |amount: Decimal| {
            if amount.is_zero() {
                Ok(amount)
            } else {
                rates.convert(amount, &self.currency, target)
            }
        };

        Ok(Self {
            wallet_id: self.wallet_id,
            currency: target.clone(),
            total_expenses: convert(self.total_expenses)?,
            total_income: convert(self.total_income)?,
            net_flow: convert(self.net_flow)?,
            movement_count: self.movement_count,
        })
    }
}
