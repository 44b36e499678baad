//! The event-level ledger interface the sync layer drives.

use escrow_types::{
    Amount, BlockHeight, DepositEvent, Nonce, PendingWithdrawal, WalletAddress,
    WithdrawalConfirmedEvent, WithdrawalRequestEvent,
};

use crate::{LedgerError, LedgerProcessor};

/// Applies chain and off-chain events to per-address accounting.
pub trait Ledger: Send + Sync {
    fn deposit(&self, event: &DepositEvent) -> Result<(), LedgerError>;

    fn spend(&self, address: &WalletAddress, amount: &str) -> Result<(), LedgerError>;

    fn request_withdrawal(
        &self,
        event: &WithdrawalRequestEvent,
    ) -> Result<PendingWithdrawal, LedgerError>;

    /// Returns `false` when the nonce was not pending.
    fn confirm_withdrawal(&self, event: &WithdrawalConfirmedEvent) -> Result<bool, LedgerError>;

    /// Refund withdrawals expiring at or before `height`.
    fn finalize_block(&self, height: BlockHeight) -> Result<Vec<PendingWithdrawal>, LedgerError>;

    fn balance(&self, address: &WalletAddress) -> Amount;

    fn spent(&self, address: &WalletAddress) -> Amount;

    fn nonce_exists(&self, nonce: &Nonce) -> bool;
}

impl Ledger for LedgerProcessor {
    fn deposit(&self, event: &DepositEvent) -> Result<(), LedgerError> {
        self.process_deposit(&event.caller, &event.amount)
    }

    fn spend(&self, address: &WalletAddress, amount: &str) -> Result<(), LedgerError> {
        self.process_spend(address, amount)
    }

    fn request_withdrawal(
        &self,
        event: &WithdrawalRequestEvent,
    ) -> Result<PendingWithdrawal, LedgerError> {
        self.process_withdrawal_request(&event.wallet, &event.amount, &event.nonce, event.expiration)
    }

    fn confirm_withdrawal(&self, event: &WithdrawalConfirmedEvent) -> Result<bool, LedgerError> {
        Ok(self.process_withdrawal_confirmation(&event.nonce))
    }

    fn finalize_block(&self, height: BlockHeight) -> Result<Vec<PendingWithdrawal>, LedgerError> {
        Ok(self.process_finalized_block(height))
    }

    fn balance(&self, address: &WalletAddress) -> Amount {
        LedgerProcessor::balance(self, address)
    }

    fn spent(&self, address: &WalletAddress) -> Amount {
        LedgerProcessor::spent(self, address)
    }

    fn nonce_exists(&self, nonce: &Nonce) -> bool {
        LedgerProcessor::nonce_exists(self, nonce)
    }
}
