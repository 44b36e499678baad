//! LMDB storage backend for the escrow ledger.
//!
//! Implements the `escrow-store` traits using the `heed` LMDB bindings. All
//! ledger state lives in a single LMDB database whose keys are namespaced by
//! a one-byte prefix (see [`keys`]), so every logical operation is one write
//! transaction over one database.

pub mod balance;
pub mod cursor;
pub mod environment;
pub mod error;
pub mod keys;
pub mod withdrawal;

pub use environment::{LmdbEnvironment, LmdbLedgerStore};
pub use error::LmdbError;
