//! In-memory ledger processor.
//!
//! Holds every account's `{balance, spent}` pair and the pending-withdrawal
//! tracker behind a single mutex. All calls, reads included, take the lock;
//! `HashMap` is not safe for reads during a concurrent write.

use std::collections::HashMap;
use std::sync::{Mutex, MutexGuard, PoisonError};

use escrow_types::{
    AccountBalance, AccountError, Amount, BlockHeight, Nonce, PendingWithdrawal, TxId,
    WalletAddress,
};

use crate::expiry::WithdrawalExpiryTracker;
use crate::LedgerError;

#[derive(Debug, Default)]
struct LedgerState {
    accounts: HashMap<WalletAddress, AccountBalance>,
    withdrawals: WithdrawalExpiryTracker,
}

impl LedgerState {
    /// Apply `f` to a copy of the account and write it back only on success.
    /// Accounts that end up empty are removed.
    fn update<R>(
        &mut self,
        address: &WalletAddress,
        f: impl FnOnce(&mut AccountBalance) -> Result<R, AccountError>,
    ) -> Result<R, LedgerError> {
        let mut account = self.accounts.get(address).copied().unwrap_or_default();
        let out = f(&mut account).map_err(|e| LedgerError::from_account(address, e))?;
        self.set(address, account);
        Ok(out)
    }

    fn set(&mut self, address: &WalletAddress, account: AccountBalance) {
        if account.is_empty() {
            self.accounts.remove(address);
        } else {
            self.accounts.insert(address.clone(), account);
        }
    }

    fn account(&self, address: &WalletAddress) -> AccountBalance {
        self.accounts.get(address).copied().unwrap_or_default()
    }
}

/// Balance/spent state machine with expiring withdrawals.
#[derive(Debug, Default)]
pub struct LedgerProcessor {
    state: Mutex<LedgerState>,
}

impl LedgerProcessor {
    pub fn new() -> Self {
        Self::default()
    }

    /// Rebuild a processor from persisted state.
    pub fn from_snapshot(
        accounts: impl IntoIterator<Item = (WalletAddress, AccountBalance)>,
        withdrawals: impl IntoIterator<Item = PendingWithdrawal>,
    ) -> Result<Self, LedgerError> {
        let mut state = LedgerState::default();
        for (address, account) in accounts {
            state.set(&address, account);
        }
        for withdrawal in withdrawals {
            let nonce = withdrawal.nonce.clone();
            if !state.withdrawals.insert(withdrawal) {
                return Err(LedgerError::DuplicateNonce(nonce));
            }
        }
        Ok(Self {
            state: Mutex::new(state),
        })
    }

    fn lock(&self) -> MutexGuard<'_, LedgerState> {
        // Every mutation validates before writing, so a panic while the lock
        // was held cannot have left a half-applied update behind.
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    // ── String-amount entry points ──────────────────────────────────────

    pub fn process_deposit(&self, caller: &WalletAddress, amount: &str) -> Result<(), LedgerError> {
        self.credit(caller, amount.parse()?)
    }

    pub fn process_spend(&self, caller: &WalletAddress, amount: &str) -> Result<(), LedgerError> {
        self.debit(caller, amount.parse()?)
    }

    pub fn process_withdrawal_request(
        &self,
        wallet: &WalletAddress,
        amount: &str,
        nonce: &Nonce,
        expiration: BlockHeight,
    ) -> Result<PendingWithdrawal, LedgerError> {
        self.open_withdrawal(wallet, amount.parse()?, nonce, expiration)
    }

    /// Drop a pending withdrawal on chain confirmation. Unknown nonces are
    /// tolerated (duplicate or late confirmations) and return `false`.
    pub fn process_withdrawal_confirmation(&self, nonce: &Nonce) -> bool {
        let removed = self.lock().withdrawals.remove_by_nonce(nonce).is_some();
        if !removed {
            tracing::debug!(%nonce, "confirmation for untracked nonce ignored");
        }
        removed
    }

    /// Refund every withdrawal with `expiration <= height`, in expiration
    /// order, and return the ones refunded.
    ///
    /// A refund that cannot be applied is logged and skipped; the rest of the
    /// batch still goes through.
    pub fn process_finalized_block(&self, height: BlockHeight) -> Vec<PendingWithdrawal> {
        let mut state = self.lock();
        let expired = state.withdrawals.pop_expired(height);
        let mut refunded = Vec::with_capacity(expired.len());
        for withdrawal in expired {
            let result = state.update(&withdrawal.wallet, |a| {
                a.refund(withdrawal.amount, withdrawal.spent)
            });
            match result {
                Ok(()) => refunded.push(withdrawal),
                Err(e) => tracing::error!(
                    nonce = %withdrawal.nonce,
                    wallet = %withdrawal.wallet,
                    error = %e,
                    "expired withdrawal could not be refunded, skipping"
                ),
            }
        }
        if !refunded.is_empty() {
            tracing::info!(height, count = refunded.len(), "expired withdrawals refunded");
        }
        refunded
    }

    // ── Typed operations ────────────────────────────────────────────────

    pub fn credit(&self, address: &WalletAddress, amount: Amount) -> Result<(), LedgerError> {
        self.lock().update(address, |a| a.credit(amount))
    }

    pub fn debit(&self, address: &WalletAddress, amount: Amount) -> Result<(), LedgerError> {
        self.lock().update(address, |a| a.spend(amount))
    }

    pub fn open_withdrawal(
        &self,
        wallet: &WalletAddress,
        amount: Amount,
        nonce: &Nonce,
        expiration: BlockHeight,
    ) -> Result<PendingWithdrawal, LedgerError> {
        let mut state = self.lock();
        if state.withdrawals.contains(nonce) {
            return Err(LedgerError::DuplicateNonce(nonce.clone()));
        }
        let split = state.update(wallet, |a| a.begin_withdrawal(amount))?;
        let record = PendingWithdrawal::new(
            nonce.clone(),
            wallet.clone(),
            split.withdrawn,
            split.spent_snapshot,
            expiration,
        );
        let inserted = state.withdrawals.insert(record.clone());
        debug_assert!(inserted, "nonce checked above under the same lock");
        Ok(record)
    }

    // ── Cache maintenance (used by the durable ledger) ──────────────────

    /// Overwrite an account with the authoritative value.
    pub fn set_account(&self, address: &WalletAddress, account: AccountBalance) {
        self.lock().set(address, account);
    }

    /// Track a withdrawal record produced elsewhere. Returns `false` if the
    /// nonce is already tracked.
    pub fn track_withdrawal(&self, withdrawal: PendingWithdrawal) -> bool {
        self.lock().withdrawals.insert(withdrawal)
    }

    pub fn untrack_withdrawal(&self, nonce: &Nonce) -> Option<PendingWithdrawal> {
        self.lock().withdrawals.remove_by_nonce(nonce)
    }

    pub fn set_withdrawal_tx(&self, nonce: &Nonce, tx_id: &TxId) -> bool {
        match self.lock().withdrawals.get_by_nonce_mut(nonce) {
            Some(w) => {
                w.tx_id = Some(tx_id.clone());
                true
            }
            None => false,
        }
    }

    // ── Reads ───────────────────────────────────────────────────────────

    pub fn balance(&self, address: &WalletAddress) -> Amount {
        self.lock().account(address).balance
    }

    pub fn spent(&self, address: &WalletAddress) -> Amount {
        self.lock().account(address).spent
    }

    pub fn account(&self, address: &WalletAddress) -> AccountBalance {
        self.lock().account(address)
    }

    pub fn nonce_exists(&self, nonce: &Nonce) -> bool {
        self.lock().withdrawals.contains(nonce)
    }

    pub fn withdrawal(&self, nonce: &Nonce) -> Option<PendingWithdrawal> {
        self.lock().withdrawals.get_by_nonce(nonce).cloned()
    }

    /// Pending withdrawals in expiration order.
    pub fn pending_withdrawals(&self) -> Vec<PendingWithdrawal> {
        self.lock().withdrawals.iter().cloned().collect()
    }

    pub fn account_count(&self) -> usize {
        self.lock().accounts.len()
    }

    pub fn pending_count(&self) -> usize {
        self.lock().withdrawals.len()
    }

    /// Compact the account map and the tracker's nonce index.
    ///
    /// Holds the lock for the duration, which is bounded by the number of
    /// live accounts. Values are not touched.
    pub fn run_gc(&self) {
        let mut state = self.lock();
        let accounts = state.accounts.len();
        state.accounts.shrink_to_fit();
        state.withdrawals.run_gc();
        tracing::debug!(accounts, pending = state.withdrawals.len(), "ledger maps compacted");
    }
}
