//! Pending withdrawal records.

use serde::{Deserialize, Serialize};

use crate::{Amount, BlockHeight, Nonce, TxId, WalletAddress};

/// A withdrawal that has been requested but neither confirmed on chain nor expired.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct PendingWithdrawal {
    pub nonce: Nonce,
    pub wallet: WalletAddress,
    /// Amount debited from the wallet's balance.
    pub amount: Amount,
    /// The wallet's spent counter at request time, restored if the withdrawal expires.
    pub spent: Amount,
    /// First block height at which the withdrawal is considered expired.
    pub expiration: BlockHeight,
    /// Chain transaction that paid out the withdrawal, once known.
    #[serde(default)]
    pub tx_id: Option<TxId>,
}

impl PendingWithdrawal {
    pub fn new(
        nonce: Nonce,
        wallet: WalletAddress,
        amount: Amount,
        spent: Amount,
        expiration: BlockHeight,
    ) -> Self {
        Self {
            nonce,
            wallet,
            amount,
            spent,
            expiration,
            tx_id: None,
        }
    }
}
