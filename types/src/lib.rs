//! Fundamental types for the escrow ledger.
//!
//! This crate defines the types shared across every other crate in the workspace:
//! amounts, addresses, nonces, transaction ids, per-account balances, pending
//! withdrawals, and the chain/ledger events that flow between components.

pub mod account;
pub mod address;
pub mod amount;
pub mod error;
pub mod event;
pub mod hash;
pub mod nonce;
pub mod withdrawal;

pub use account::{AccountBalance, WithdrawalSplit};
pub use address::WalletAddress;
pub use amount::Amount;
pub use error::{AccountError, AmountError, EnvelopeError};
pub use event::{
    DepositEvent, EventTag, LedgerEvent, WithdrawalConfirmedEvent, WithdrawalRequestEvent,
};
pub use hash::TxId;
pub use nonce::Nonce;
pub use withdrawal::PendingWithdrawal;

/// Height of a block on the external chain.
pub type BlockHeight = u64;
