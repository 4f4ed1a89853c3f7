//! Currency codes and monetary amounts.
//!
//! Amounts are fixed-point `rust_decimal::Decimal` values; nothing in the domain
//! layer touches binary floating point.

use core::str::FromStr;

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::error::{DomainError, DomainResult};
use crate::value_object::ValueObject;

/// One unit of the smallest currency denomination (0.01).
///
/// Used as the reconciliation tolerance for split allocations and as the
/// threshold below which a balance counts as settled.
pub const MINOR_UNIT: Decimal = Decimal::from_parts(1, 0, 0, false, 2);

/// ISO-4217 style currency code (three ASCII letters, stored upper-case).
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct CurrencyCode(String);

impl CurrencyCode {
    pub fn new(code: &str) -> DomainResult<Self> {
        let code = code.trim();
        if code.len() != 3 || !code.chars().all(|c| c.is_ascii_alphabetic()) {
            return Err(DomainError::invalid_id(format!(
                "CurrencyCode: '{code}' is not a three-letter code"
            )));
        }
        Ok(Self(code.to_ascii_uppercase()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl ValueObject for CurrencyCode {}

impl core::fmt::Display for CurrencyCode {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.write_str(&self.0)
    }
}

impl FromStr for CurrencyCode {
    type Err = DomainError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::new(s)
    }
}

impl TryFrom<String> for CurrencyCode {
    type Error = DomainError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::new(&value)
    }
}

impl From<CurrencyCode> for String {
    fn from(value: CurrencyCode) -> Self {
        value.0
    }
}

/// An amount declared in a specific currency.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Money {
    pub amount: Decimal,
    pub currency: CurrencyCode,
}

impl ValueObject for Money {}

impl Money {
    pub fn new(amount: Decimal, currency: CurrencyCode) -> Self {
        Self { amount, currency }
    }

    /// Fails unless the amount is strictly positive.
    pub fn ensure_positive(&self) -> DomainResult<()> {
        ensure_positive(self.amount)
    }
}

impl core::fmt::Display for Money {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        write!(f, "{} {}", self.amount.round_dp(2), self.currency)
    }
}

/// Fails with a validation error unless `amount > 0`.
pub fn ensure_positive(amount: Decimal) -> DomainResult<()> {
    if amount > Decimal::ZERO {
        Ok(())
    } else {
        Err(DomainError::validation(format!(
            "amount must be positive (got {amount})"
        )))
    }
}

/// `a + b`, failing with a validation error instead of overflowing.
pub fn checked_add(a: Decimal, b: Decimal) -> DomainResult<Decimal> {
    a.checked_add(b)
        .ok_or_else(|| DomainError::validation("amount out of range"))
}

/// Sum of `amounts`, failing with a validation error instead of overflowing.
pub fn checked_sum(amounts: impl IntoIterator<Item = Decimal>) -> DomainResult<Decimal> {
    amounts
        .into_iter()
        .try_fold(Decimal::ZERO, checked_add)
}
