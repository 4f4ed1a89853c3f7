//! Movement store boundary.
//!
//! Wallet-scoped, append-mostly storage of ledger entries. Every logical
//! operation is written as one batch; movements are archived, never deleted.

pub mod in_memory;
#[cfg(feature = "postgres")]
pub mod postgres;
pub mod r#trait;

pub use in_memory::InMemoryMovementStore;
#[cfg(feature = "postgres")]
pub use postgres::PostgresMovementStore;
pub use r#trait::{MovementStore, StoreError};
