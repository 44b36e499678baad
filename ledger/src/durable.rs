//! Write-through ledger backed by a [`LedgerStore`].
//!
//! The store is authoritative. Every mutation is applied to the store first,
//! in one store transaction, and the touched accounts are then re-read into
//! the in-memory [`LedgerProcessor`] that serves reads. Opening a
//! `DurableLedger` rebuilds that cache from the store.
//!
//! Mutations hold one write lock across the store write and the cache
//! refresh, so the cache never ends up holding an older read than the store.

use std::sync::{Mutex, MutexGuard, PoisonError};

use escrow_store::{LedgerStore, StoreError};
use escrow_types::{
    Amount, BlockHeight, DepositEvent, Nonce, PendingWithdrawal, TxId, WalletAddress,
    WithdrawalConfirmedEvent, WithdrawalRequestEvent,
};

use crate::{Ledger, LedgerError, LedgerProcessor};

pub struct DurableLedger<S: LedgerStore> {
    store: S,
    cache: LedgerProcessor,
    write: Mutex<()>,
}

impl<S: LedgerStore> DurableLedger<S> {
    /// Open a ledger over `store`, loading every account and pending
    /// withdrawal into the read cache.
    pub fn open(store: S) -> Result<Self, LedgerError> {
        let accounts = store.accounts()?;
        let withdrawals = store.pending_withdrawals()?;
        let cache = LedgerProcessor::from_snapshot(accounts, withdrawals)?;
        tracing::info!(
            accounts = cache.account_count(),
            pending = cache.pending_count(),
            "ledger loaded from store"
        );
        Ok(Self {
            store,
            cache,
            write: Mutex::new(()),
        })
    }

    pub fn store(&self) -> &S {
        &self.store
    }

    pub fn cache(&self) -> &LedgerProcessor {
        &self.cache
    }

    /// Record the chain transaction paying out a pending withdrawal.
    pub fn attach_tx(&self, nonce: &Nonce, tx_id: &TxId) -> Result<(), LedgerError> {
        let _write = self.write_lock();
        match self.store.add_tx(nonce, tx_id) {
            Ok(()) => {}
            Err(StoreError::NotFound(_)) => return Err(LedgerError::UnknownNonce(nonce.clone())),
            Err(e) => return Err(e.into()),
        }
        self.cache.set_withdrawal_tx(nonce, tx_id);
        Ok(())
    }

    pub fn run_gc(&self) {
        self.cache.run_gc();
    }

    fn write_lock(&self) -> MutexGuard<'_, ()> {
        // The guard protects no data, only ordering.
        self.write.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn refresh(&self, address: &WalletAddress) -> Result<(), LedgerError> {
        let account = self.store.balance_and_spent(address)?;
        self.cache.set_account(address, account);
        Ok(())
    }
}

impl<S: LedgerStore> Ledger for DurableLedger<S> {
    fn deposit(&self, event: &DepositEvent) -> Result<(), LedgerError> {
        let amount: Amount = event.amount.parse()?;
        let _write = self.write_lock();
        self.store
            .deposit(&event.tx_id, &event.caller, amount, event.height)?;
        self.refresh(&event.caller)
    }

    fn spend(&self, address: &WalletAddress, amount: &str) -> Result<(), LedgerError> {
        let amount: Amount = amount.parse()?;
        let _write = self.write_lock();
        self.store.spend(address, amount)?;
        self.refresh(address)
    }

    fn request_withdrawal(
        &self,
        event: &WithdrawalRequestEvent,
    ) -> Result<PendingWithdrawal, LedgerError> {
        let amount: Amount = event.amount.parse()?;
        let _write = self.write_lock();
        let record =
            self.store
                .start_withdrawal(&event.nonce, &event.wallet, amount, event.expiration)?;
        if !self.cache.track_withdrawal(record.clone()) {
            tracing::warn!(nonce = %record.nonce, "cache already tracked a stored nonce");
        }
        self.refresh(&event.wallet)?;
        Ok(record)
    }

    fn confirm_withdrawal(&self, event: &WithdrawalConfirmedEvent) -> Result<bool, LedgerError> {
        let _write = self.write_lock();
        let removed = self.store.finish_withdrawal(&event.nonce)?;
        self.cache.untrack_withdrawal(&event.nonce);
        if removed {
            tracing::debug!(nonce = %event.nonce, tx_id = %event.tx_id, "withdrawal confirmed");
        } else {
            tracing::debug!(nonce = %event.nonce, "confirmation for unknown nonce ignored");
        }
        Ok(removed)
    }

    /// Refund expired withdrawals, then close out the block: replay markers
    /// up to `height` are reclaimed and the stored cursor moves past it.
    fn finalize_block(&self, height: BlockHeight) -> Result<Vec<PendingWithdrawal>, LedgerError> {
        let _write = self.write_lock();
        let expired = self.store.expire(height)?;
        for withdrawal in &expired {
            self.cache.untrack_withdrawal(&withdrawal.nonce);
            self.refresh(&withdrawal.wallet)?;
        }
        self.store.commit_block(height)?;
        Ok(expired)
    }

    fn balance(&self, address: &WalletAddress) -> Amount {
        self.cache.balance(address)
    }

    fn spent(&self, address: &WalletAddress) -> Amount {
        self.cache.spent(address)
    }

    fn nonce_exists(&self, nonce: &Nonce) -> bool {
        self.cache.nonce_exists(nonce)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use escrow_store::{BalanceStore, CursorStore, WithdrawalStore};
    use escrow_store_lmdb::{LmdbEnvironment, LmdbLedgerStore};

    const MAP_SIZE: usize = 16 * 1024 * 1024;

    fn open(dir: &tempfile::TempDir) -> DurableLedger<LmdbLedgerStore> {
        let env = LmdbEnvironment::open(dir.path(), MAP_SIZE).expect("open env");
        DurableLedger::open(env.ledger_store()).expect("open ledger")
    }

    fn deposit(tx: &str, caller: &str, amount: &str, height: BlockHeight) -> DepositEvent {
        DepositEvent {
            tx_id: TxId::new(tx),
            caller: WalletAddress::new(caller),
            amount: amount.into(),
            height,
        }
    }

    fn request(wallet: &str, amount: &str, nonce: &str, expiration: BlockHeight) -> WithdrawalRequestEvent {
        WithdrawalRequestEvent {
            wallet: WalletAddress::new(wallet),
            amount: amount.into(),
            nonce: Nonce::new(nonce),
            expiration,
        }
    }

    fn confirmed(nonce: &str, receiver: &str) -> WithdrawalConfirmedEvent {
        WithdrawalConfirmedEvent {
            tx_id: TxId::new("0xpay"),
            nonce: Nonce::new(nonce),
            receiver: WalletAddress::new(receiver),
            amount: "0".into(),
            height: 1,
        }
    }

    #[test]
    fn cache_mirrors_store_after_writes() {
        let dir = tempfile::tempdir().unwrap();
        let ledger = open(&dir);
        let a = WalletAddress::new("0xa");

        ledger.deposit(&deposit("0x1", "0xa", "100", 5)).unwrap();
        ledger.spend(&a, "40").unwrap();

        assert_eq!(ledger.balance(&a), Amount::new(60));
        assert_eq!(ledger.spent(&a), Amount::new(40));
        assert_eq!(ledger.store().balance(&a).unwrap(), Amount::new(60));
        assert_eq!(ledger.store().spent(&a).unwrap(), Amount::new(40));
    }

    #[test]
    fn redelivered_deposit_is_rejected_once() {
        let dir = tempfile::tempdir().unwrap();
        let ledger = open(&dir);
        let event = deposit("0x1", "0xa", "100", 5);

        ledger.deposit(&event).unwrap();
        let err = ledger.deposit(&event).unwrap_err();
        assert!(matches!(err, LedgerError::DuplicateTransaction { height: 5, .. }));
        assert!(err.is_rejection());
        assert_eq!(ledger.balance(&WalletAddress::new("0xa")), Amount::new(100));
    }

    #[test]
    fn malformed_amount_never_reaches_store() {
        let dir = tempfile::tempdir().unwrap();
        let ledger = open(&dir);
        let err = ledger.deposit(&deposit("0x1", "0xa", "1e9", 5)).unwrap_err();
        assert!(matches!(err, LedgerError::Parse(_)));
        assert!(!ledger.store().has_marker(5, &TxId::new("0x1")).unwrap());
    }

    #[test]
    fn reopen_rebuilds_cache_from_store() {
        let dir = tempfile::tempdir().unwrap();
        {
            let ledger = open(&dir);
            ledger.deposit(&deposit("0x1", "0xa", "100", 5)).unwrap();
            ledger.spend(&WalletAddress::new("0xa"), "50").unwrap();
            ledger.request_withdrawal(&request("0xa", "20", "n1", 100)).unwrap();
        }

        let ledger = open(&dir);
        let a = WalletAddress::new("0xa");
        assert_eq!(ledger.balance(&a), Amount::new(30));
        assert_eq!(ledger.spent(&a), Amount::ZERO);
        assert!(ledger.nonce_exists(&Nonce::new("n1")));

        let refunded = ledger.finalize_block(100).unwrap();
        assert_eq!(refunded.len(), 1);
        assert_eq!(ledger.balance(&a), Amount::new(50));
        assert_eq!(ledger.spent(&a), Amount::new(50));
    }

    #[test]
    fn finalize_refunds_and_commits_block() {
        let dir = tempfile::tempdir().unwrap();
        let ledger = open(&dir);
        let a = WalletAddress::new("0xa");

        ledger.deposit(&deposit("0x1", "0xa", "100", 10)).unwrap();
        ledger.request_withdrawal(&request("0xa", "30", "n1", 50)).unwrap();
        ledger.request_withdrawal(&request("0xa", "30", "n2", 100)).unwrap();

        assert!(ledger.finalize_block(49).unwrap().is_empty());
        assert_eq!(ledger.store().next_height().unwrap(), Some(50));

        let refunded = ledger.finalize_block(50).unwrap();
        assert_eq!(refunded[0].nonce, Nonce::new("n1"));
        assert_eq!(ledger.balance(&a), Amount::new(70));
        assert!(!ledger.nonce_exists(&Nonce::new("n1")));
        assert!(ledger.nonce_exists(&Nonce::new("n2")));
        assert!(!ledger.store().has_marker(10, &TxId::new("0x1")).unwrap());
    }

    #[test]
    fn confirmation_drops_withdrawal_everywhere() {
        let dir = tempfile::tempdir().unwrap();
        let ledger = open(&dir);
        ledger.deposit(&deposit("0x1", "0xa", "100", 1)).unwrap();
        ledger.request_withdrawal(&request("0xa", "100", "n1", 10)).unwrap();

        assert!(ledger.confirm_withdrawal(&confirmed("n1", "0xa")).unwrap());
        assert!(!ledger.confirm_withdrawal(&confirmed("n1", "0xa")).unwrap());
        assert!(!ledger.nonce_exists(&Nonce::new("n1")));
        assert!(ledger.store().get_withdrawal(&Nonce::new("n1")).unwrap().is_none());
        assert!(ledger.finalize_block(10).unwrap().is_empty());
        assert_eq!(ledger.balance(&WalletAddress::new("0xa")), Amount::ZERO);
    }

    #[test]
    fn duplicate_nonce_maps_to_ledger_error() {
        let dir = tempfile::tempdir().unwrap();
        let ledger = open(&dir);
        ledger.deposit(&deposit("0x1", "0xa", "100", 1)).unwrap();
        ledger.request_withdrawal(&request("0xa", "10", "n1", 10)).unwrap();
        let err = ledger
            .request_withdrawal(&request("0xa", "10", "n1", 20))
            .unwrap_err();
        assert!(matches!(err, LedgerError::DuplicateNonce(_)));
        assert_eq!(ledger.balance(&WalletAddress::new("0xa")), Amount::new(90));
    }

    #[test]
    fn attach_tx_requires_pending_nonce() {
        let dir = tempfile::tempdir().unwrap();
        let ledger = open(&dir);
        ledger.deposit(&deposit("0x1", "0xa", "100", 1)).unwrap();
        ledger.request_withdrawal(&request("0xa", "10", "n1", 10)).unwrap();

        ledger.attach_tx(&Nonce::new("n1"), &TxId::new("0xpay")).unwrap();
        assert_eq!(
            ledger.cache().withdrawal(&Nonce::new("n1")).unwrap().tx_id,
            Some(TxId::new("0xpay"))
        );

        let err = ledger
            .attach_tx(&Nonce::new("ghost"), &TxId::new("0xpay"))
            .unwrap_err();
        assert!(matches!(err, LedgerError::UnknownNonce(_)));
    }

    #[test]
    fn concurrent_writers_leave_cache_matching_store() {
        let dir = tempfile::tempdir().unwrap();
        let ledger = open(&dir);
        let a = WalletAddress::new("0xa");

        for round in 0..50u64 {
            std::thread::scope(|s| {
                for t in 0..8u64 {
                    let ledger = &ledger;
                    let a = &a;
                    s.spawn(move || {
                        if t % 2 == 0 {
                            let tx = format!("0x{round}-{t}");
                            ledger.deposit(&deposit(&tx, "0xa", "10", round)).unwrap();
                        } else {
                            // May lose the race against the deposits.
                            let _ = ledger.spend(a, "3");
                        }
                    });
                }
            });
            let stored = ledger.store().balance_and_spent(&a).unwrap();
            assert_eq!(ledger.cache().account(&a), stored, "round {round}");
        }
    }
}
