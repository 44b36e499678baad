use escrow_types::{AccountError, BlockHeight};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("key not found: {0}")]
    NotFound(String),

    #[error("transaction {tx_id} at height {height} already applied")]
    DuplicateTransaction { height: BlockHeight, tx_id: String },

    #[error("withdrawal nonce already pending: {0}")]
    DuplicateNonce(String),

    #[error("insufficient funds: need {needed}, have {available}")]
    InsufficientFunds { needed: u128, available: u128 },

    #[error("arithmetic overflow: {0}")]
    Overflow(String),

    #[error("storage backend error: {0}")]
    Backend(String),

    #[error("serialization error: {0}")]
    Serialization(String),

    #[error("database is corrupted: {0}")]
    Corruption(String),
}

impl From<AccountError> for StoreError {
    fn from(e: AccountError) -> Self {
        match e {
            AccountError::InsufficientFunds { needed, available } => {
                StoreError::InsufficientFunds { needed, available }
            }
            AccountError::Overflow => StoreError::Overflow(e.to_string()),
        }
    }
}
