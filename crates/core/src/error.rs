//! Domain error model.

use rust_decimal::Decimal;
use thiserror::Error;

use crate::id::{ParticipantId, WalletId};
use crate::money::CurrencyCode;

/// Result type used across the domain layer.
pub type DomainResult<T> = Result<T, DomainError>;

/// Domain-level error.
///
/// Keep this focused on deterministic, business/domain failures (validation,
/// membership, reconciliation, missing rates). Storage concerns belong to the
/// infrastructure layer.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum DomainError {
    /// A value failed validation (e.g. non-positive amount, category rules).
    #[error("validation failed: {0}")]
    Validation(String),

    /// A domain invariant was violated.
    #[error("invariant violated: {0}")]
    InvariantViolation(String),

    /// A participant referenced by an operation is not a member of the wallet.
    #[error("participant {participant} is not a member of wallet {wallet}")]
    InvalidParticipant {
        wallet: WalletId,
        participant: ParticipantId,
    },

    /// Split allocations do not add up to the declared total.
    #[error("split allocations sum to {allocated}, expected {total}")]
    AllocationMismatch { total: Decimal, allocated: Decimal },

    /// The rate snapshot has no usable rate for a required currency.
    #[error("no exchange rate available for {currency}")]
    RateUnavailable { currency: CurrencyCode },

    /// Settlement was requested for a wallet without participants.
    #[error("wallet {0} has no participants")]
    EmptyWallet(WalletId),

    /// An identifier or code was invalid (e.g. parse failure).
    #[error("invalid identifier: {0}")]
    InvalidId(String),

    /// A requested resource was not found (domain-level).
    #[error("not found: {0}")]
    NotFound(String),
}

impl DomainError {
    pub fn validation(msg: impl Into<String>) -> Self {
        Self::Validation(msg.into())
    }

    pub fn invariant(msg: impl Into<String>) -> Self {
        Self::InvariantViolation(msg.into())
    }

    pub fn invalid_id(msg: impl Into<String>) -> Self {
        Self::InvalidId(msg.into())
    }

    pub fn not_found(what: impl Into<String>) -> Self {
        Self::NotFound(what.into())
    }

    pub fn invalid_participant(wallet: WalletId, participant: ParticipantId) -> Self {
        Self::InvalidParticipant {
            wallet,
            participant,
        }
    }

    pub fn rate_unavailable(currency: &CurrencyCode) -> Self {
        Self::RateUnavailable {
            currency: currency.clone(),
        }
    }

    /// Message suitable for showing to an end user.
    ///
    /// Presentation layers should prefer this over `Display`, which is meant for logs.
    pub fn user_message(&self) -> String {
        match self {
            DomainError::Validation(msg) => format!("Please check your input: {msg}."),
            DomainError::InvariantViolation(_) => {
                "The wallet history is inconsistent; please contact support.".to_string()
            }
            DomainError::InvalidParticipant { .. } => {
                "One of the selected people is not part of this wallet.".to_string()
            }
            DomainError::AllocationMismatch { total, allocated } => format!(
                "The split amounts don't add up to the total ({} of {} assigned).",
                allocated.round_dp(2),
                total.round_dp(2)
            ),
            DomainError::RateUnavailable { currency } => format!(
                "No exchange rate is available for {currency}; refresh the rates and try again."
            ),
            DomainError::EmptyWallet(_) => "This wallet has no members yet.".to_string(),
            DomainError::InvalidId(_) => "The requested item could not be identified.".to_string(),
            DomainError::NotFound(what) => format!("The requested {what} could not be found."),
        }
    }
}
