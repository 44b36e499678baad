//! Error types shared across crates.

use thiserror::Error;

/// Failure to interpret a decimal amount string.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum AmountError {
    #[error("malformed amount: {0:?}")]
    Malformed(String),

    #[error("amount does not fit in 128 bits: {0}")]
    Overflow(String),
}

/// Accounting rule violations on a single account entry.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum AccountError {
    #[error("insufficient funds: need {needed}, have {available}")]
    InsufficientFunds { needed: u128, available: u128 },

    #[error("arithmetic overflow on account balance")]
    Overflow,
}

/// Failure to decode a ledger event envelope.
#[derive(Debug, Error)]
pub enum EnvelopeError {
    #[error("empty envelope")]
    Empty,

    #[error("unknown event tag: {0:#04x}")]
    UnknownTag(u8),

    #[error("payload error: {0}")]
    Payload(#[from] bincode::Error),
}
