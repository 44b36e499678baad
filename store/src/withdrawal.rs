//! Pending withdrawal storage trait.

use crate::StoreError;
use escrow_types::{Amount, BlockHeight, Nonce, PendingWithdrawal, TxId, WalletAddress};

/// Storage for the expiring-withdrawal lifecycle.
///
/// Entries are ordered by expiration height so that expiry is a range scan,
/// and indexed by nonce so confirmations are a point lookup.
pub trait WithdrawalStore {
    /// Debit the wallet and record a pending withdrawal.
    ///
    /// The withdrawn amount is truncated to the wallet's balance and the
    /// spent counter is reset; the returned record carries both.
    fn start_withdrawal(
        &self,
        nonce: &Nonce,
        wallet: &WalletAddress,
        amount: Amount,
        expiration: BlockHeight,
    ) -> Result<PendingWithdrawal, StoreError>;

    /// Drop the pending withdrawal without refund. Returns `false` when the
    /// nonce was not pending.
    fn finish_withdrawal(&self, nonce: &Nonce) -> Result<bool, StoreError>;

    /// Refund and remove every withdrawal with `expiration <= height`,
    /// returning them in ascending expiration order.
    fn expire(&self, height: BlockHeight) -> Result<Vec<PendingWithdrawal>, StoreError>;

    /// Attach the paying chain transaction to a pending withdrawal.
    fn add_tx(&self, nonce: &Nonce, tx_id: &TxId) -> Result<(), StoreError>;

    fn get_withdrawal(&self, nonce: &Nonce) -> Result<Option<PendingWithdrawal>, StoreError>;

    fn withdrawals_for_wallet(
        &self,
        wallet: &WalletAddress,
    ) -> Result<Vec<PendingWithdrawal>, StoreError>;

    /// Withdrawals that `expire(height)` would remove, without removing them.
    fn withdrawals_expiring_by(
        &self,
        height: BlockHeight,
    ) -> Result<Vec<PendingWithdrawal>, StoreError>;

    /// All pending withdrawals in ascending expiration order.
    fn pending_withdrawals(&self) -> Result<Vec<PendingWithdrawal>, StoreError>;
}
