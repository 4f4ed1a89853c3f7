//! Shared-wallet ledger (movement model, planners, settlement).
//!
//! Pure domain logic only: no IO, no HTTP, no persistence concerns. Planners
//! turn intents into drafts, the currency normalizer resolves them into the
//! wallet's base currency, and the settlement calculator derives balances from
//! whatever snapshot of movements it is given.

pub mod currency;
pub mod movement;
pub mod settlement;
pub mod split;
pub mod summary;
pub mod transfer;
pub mod wallet;

pub use currency::{CurrencyNormalizer, Normalized, RateSnapshot, normalize};
pub use movement::{CurrencyAudit, Movement, MovementDraft, MovementKind, ensure_pairs_balanced};
pub use settlement::{
    BalanceSheet, BalanceStatus, ParticipantBalance, compute_balances, compute_wallet_balances,
};
pub use split::{SplitPlan, plan_split};
pub use summary::WalletSummary;
pub use transfer::plan_transfer;
pub use wallet::{Category, DEFAULT_CATEGORIES, Wallet, default_categories};
