use escrow_store::StoreError;
use escrow_types::{AccountError, AmountError, BlockHeight, Nonce, WalletAddress};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum LedgerError {
    #[error("parse error: {0}")]
    Parse(#[from] AmountError),

    #[error("insufficient funds: need {needed}, have {available}")]
    InsufficientFunds { needed: u128, available: u128 },

    #[error("transaction {tx_id} at height {height} already applied")]
    DuplicateTransaction { height: BlockHeight, tx_id: String },

    #[error("withdrawal nonce already pending: {0}")]
    DuplicateNonce(Nonce),

    #[error("unknown withdrawal nonce: {0}")]
    UnknownNonce(Nonce),

    #[error("arithmetic overflow on account {0}")]
    Overflow(WalletAddress),

    #[error("storage error: {0}")]
    Storage(StoreError),
}

impl LedgerError {
    /// Errors describing a single rejected event rather than a broken ledger.
    /// The caller decides whether to skip, dead-letter, or abort; retrying the
    /// same event cannot succeed.
    pub fn is_rejection(&self) -> bool {
        !matches!(self, LedgerError::Storage(_))
    }

    pub(crate) fn from_account(address: &WalletAddress, e: AccountError) -> Self {
        match e {
            AccountError::InsufficientFunds { needed, available } => {
                LedgerError::InsufficientFunds { needed, available }
            }
            AccountError::Overflow => LedgerError::Overflow(address.clone()),
        }
    }
}

impl From<StoreError> for LedgerError {
    fn from(e: StoreError) -> Self {
        match e {
            StoreError::DuplicateTransaction { height, tx_id } => {
                LedgerError::DuplicateTransaction { height, tx_id }
            }
            StoreError::DuplicateNonce(nonce) => LedgerError::DuplicateNonce(Nonce::new(nonce)),
            StoreError::InsufficientFunds { needed, available } => {
                LedgerError::InsufficientFunds { needed, available }
            }
            other => LedgerError::Storage(other),
        }
    }
}
