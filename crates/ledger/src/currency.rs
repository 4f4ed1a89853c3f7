//! Currency normalization against a caller-supplied rate snapshot.
//!
//! Rates are quoted against a common anchor currency (`rate[c]` = units of `c`
//! per anchor unit). The engine never fetches rates; it only consumes the
//! snapshot it is handed, and resolves everything at movement-creation time.

use std::collections::HashMap;

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use splitledger_core::{CurrencyCode, DomainError, DomainResult, ensure_positive};

use crate::movement::{CurrencyAudit, MovementDraft};

/// Point-in-time mapping from currency code to its rate against the anchor.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RateSnapshot {
    rates: HashMap<CurrencyCode, Decimal>,
    pub captured_at: Option<DateTime<Utc>>,
}

impl RateSnapshot {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn captured_at(mut self, at: DateTime<Utc>) -> Self {
        self.captured_at = Some(at);
        self
    }

    pub fn with_rate(mut self, currency: CurrencyCode, rate: Decimal) -> Self {
        self.rates.insert(currency, rate);
        self
    }

    pub fn insert(&mut self, currency: CurrencyCode, rate: Decimal) {
        self.rates.insert(currency, rate);
    }

    pub fn len(&self) -> usize {
        self.rates.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rates.is_empty()
    }

    /// Rate of `currency` against the anchor. Missing or non-positive rates are unavailable.
    pub fn rate(&self, currency: &CurrencyCode) -> DomainResult<Decimal> {
        match self.rates.get(currency) {
            Some(rate) if *rate > Decimal::ZERO => Ok(*rate),
            _ => Err(DomainError::rate_unavailable(currency)),
        }
    }

    /// Units of `to` per unit of `from`.
    pub fn cross_rate(&self, from: &CurrencyCode, to: &CurrencyCode) -> DomainResult<Decimal> {
        if from == to {
            return Ok(Decimal::ONE);
        }
        let from_rate = self.rate(from)?;
        let to_rate = self.rate(to)?;
        to_rate
            .checked_div(from_rate)
            .ok_or_else(|| DomainError::validation("exchange rate out of range"))
    }

    /// Convert `amount` from one currency to another: `amount / rate[from] * rate[to]`.
    pub fn convert(
        &self,
        amount: Decimal,
        from: &CurrencyCode,
        to: &CurrencyCode,
    ) -> DomainResult<Decimal> {
        if from == to {
            return Ok(amount);
        }
        let from_rate = self.rate(from)?;
        let to_rate = self.rate(to)?;
        amount
            .checked_div(from_rate)
            .and_then(|anchored| anchored.checked_mul(to_rate))
            .ok_or_else(|| DomainError::validation("converted amount out of range"))
    }
}

impl FromIterator<(CurrencyCode, Decimal)> for RateSnapshot {
    fn from_iter<I: IntoIterator<Item = (CurrencyCode, Decimal)>>(iter: I) -> Self {
        Self {
            rates: iter.into_iter().collect(),
            captured_at: None,
        }
    }
}

/// Result of normalizing one declared amount.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Normalized {
    pub amount_base: Decimal,
    /// Present only when the declared currency differs from the base currency.
    pub audit: Option<CurrencyAudit>,
}

/// Normalize a single declared amount into the wallet's base currency.
pub fn normalize(
    amount: Decimal,
    declared: &CurrencyCode,
    base: &CurrencyCode,
    rates: &RateSnapshot,
) -> DomainResult<Normalized> {
    CurrencyNormalizer::resolve(declared, base, rates)?.apply(amount)
}

/// A declared/base currency pair with its rate resolved once.
///
/// Every amount of a multi-movement operation goes through the same normalizer,
/// so a split or a transfer is converted with one rate.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CurrencyNormalizer {
    declared: CurrencyCode,
    base: CurrencyCode,
    declared_rate: Decimal,
    base_rate: Decimal,
}

impl CurrencyNormalizer {
    pub fn resolve(
        declared: &CurrencyCode,
        base: &CurrencyCode,
        rates: &RateSnapshot,
    ) -> DomainResult<Self> {
        let (declared_rate, base_rate) = if declared == base {
            (Decimal::ONE, Decimal::ONE)
        } else {
            (rates.rate(declared)?, rates.rate(base)?)
        };
        Ok(Self {
            declared: declared.clone(),
            base: base.clone(),
            declared_rate,
            base_rate,
        })
    }

    pub fn is_identity(&self) -> bool {
        self.declared == self.base
    }

    /// Units of base currency per declared unit.
    pub fn exchange_rate(&self) -> DomainResult<Decimal> {
        self.base_rate
            .checked_div(self.declared_rate)
            .ok_or_else(|| DomainError::validation("exchange rate out of range"))
    }

    pub fn apply(&self, amount: Decimal) -> DomainResult<Normalized> {
        ensure_positive(amount)?;

        if self.is_identity() {
            return Ok(Normalized {
                amount_base: amount,
                audit: None,
            });
        }

        let amount_base = amount
            .checked_div(self.declared_rate)
            .and_then(|anchored| anchored.checked_mul(self.base_rate))
            .ok_or_else(|| DomainError::validation("converted amount out of range"))?;

        Ok(Normalized {
            amount_base,
            audit: Some(CurrencyAudit {
                original_amount: amount,
                original_currency: self.declared.clone(),
                exchange_rate: self.exchange_rate()?,
            }),
        })
    }

    /// Rewrite a planned draft (whose amount is still in the declared currency)
    /// into the base currency, attaching the audit fields.
    pub fn apply_to(&self, mut draft: MovementDraft) -> DomainResult<MovementDraft> {
        let normalized = self.apply(draft.amount_base)?;
        draft.amount_base = normalized.amount_base;
        draft.currency = normalized.audit;
        Ok(draft)
    }
}
