//! Escrow ledger.
//!
//! Reconciles chain-observed deposits and withdrawal confirmations into
//! per-address `{balance, spent}` accounting. Withdrawals are time-bound: a
//! request that is not confirmed on chain before its expiration height is
//! refunded when that height is finalized.
//!
//! Two implementations share the [`Ledger`] interface:
//! - [`LedgerProcessor`]: in-memory state machine behind one mutex.
//! - [`DurableLedger`]: writes through to a [`escrow_store::LedgerStore`] and
//!   keeps a `LedgerProcessor` as a read cache rebuilt from the store on open.

pub mod durable;
pub mod error;
pub mod expiry;
pub mod ledger;
pub mod processor;

pub use durable::DurableLedger;
pub use error::LedgerError;
pub use expiry::WithdrawalExpiryTracker;
pub use ledger::Ledger;
pub use processor::LedgerProcessor;
