//! Account balance storage trait.

use crate::StoreError;
use escrow_types::{AccountBalance, Amount, BlockHeight, TxId, WalletAddress};

/// Deposit/spend accounting with per-transaction replay protection.
///
/// Absent accounts read as zero; entries that fall back to zero are removed.
pub trait BalanceStore {
    /// Credit `amount` to `address` and record the `(height, tx_id)` marker.
    ///
    /// Fails with [`StoreError::DuplicateTransaction`] if the marker already
    /// exists, leaving the balance untouched.
    fn deposit(
        &self,
        tx_id: &TxId,
        address: &WalletAddress,
        amount: Amount,
        height: BlockHeight,
    ) -> Result<(), StoreError>;

    /// Move `amount` from the deposit balance to the spent balance.
    fn spend(&self, address: &WalletAddress, amount: Amount) -> Result<(), StoreError>;

    /// Read balance and spent in one snapshot.
    fn balance_and_spent(&self, address: &WalletAddress) -> Result<AccountBalance, StoreError>;

    fn balance(&self, address: &WalletAddress) -> Result<Amount, StoreError> {
        self.balance_and_spent(address).map(|a| a.balance)
    }

    fn spent(&self, address: &WalletAddress) -> Result<Amount, StoreError> {
        self.balance_and_spent(address).map(|a| a.spent)
    }

    /// Whether the `(height, tx_id)` marker is still held.
    fn has_marker(&self, height: BlockHeight, tx_id: &TxId) -> Result<bool, StoreError>;

    /// Every materialised account, in address order.
    fn accounts(&self) -> Result<Vec<(WalletAddress, AccountBalance)>, StoreError>;
}
