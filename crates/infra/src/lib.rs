//! Infrastructure layer: movement storage, collaborator ports, the wallet
//! ledger service and configuration.

pub mod config;
pub mod directory;
pub mod movement_store;
pub mod service;


pub use config::EngineConfig;
pub use directory::{
    CategoryCatalog, InMemoryCategoryCatalog, InMemoryWalletDirectory, WalletDirectory,
};
pub use movement_store::{InMemoryMovementStore, MovementStore, StoreError};
#[cfg(feature = "postgres")]
pub use movement_store::PostgresMovementStore;
pub use service::{
    RecordMovement, RecordSplit, RecordTransfer, ServiceError, ServiceResult, WalletLedgerService,
};
