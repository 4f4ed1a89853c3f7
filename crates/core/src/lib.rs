//! `splitledger-core`: domain foundation building blocks.
//!
//! This crate contains **pure domain** primitives (no infrastructure concerns):
//! identifiers, money, and the domain error model.

pub mod entity;
pub mod error;
pub mod id;
pub mod money;
pub mod value_object;

pub use entity::Entity;
pub use error::{DomainError, DomainResult};
pub use id::{BatchId, CategoryId, MovementId, ParticipantId, WalletId};
pub use money::{CurrencyCode, MINOR_UNIT, Money, checked_add, checked_sum, ensure_positive};
pub use value_object::ValueObject;
