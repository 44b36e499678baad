//! Abstract storage traits for the escrow ledger.
//!
//! Every storage backend (LMDB, an in-memory fake for testing) implements
//! these traits. The rest of the codebase depends only on the traits.
//!
//! Each mutating method is one atomic unit: either every key it touches is
//! updated or none is.

pub mod balance;
pub mod cursor;
pub mod error;
pub mod withdrawal;

pub use balance::BalanceStore;
pub use cursor::CursorStore;
pub use error::StoreError;
pub use withdrawal::WithdrawalStore;

/// Everything the durable ledger needs from a backend.
pub trait LedgerStore: BalanceStore + WithdrawalStore + CursorStore + Send + Sync {}

impl<T> LedgerStore for T where T: BalanceStore + WithdrawalStore + CursorStore + Send + Sync {}
