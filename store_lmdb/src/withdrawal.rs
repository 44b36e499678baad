//! LMDB implementation of WithdrawalStore.
//!
//! Two namespaces:
//! - `PENDING_WITHDRAWAL`: `expiration_be_u64(8) ++ nonce` → bincode record.
//!   Big-endian expiration sorts numerically, so expiry is one range scan.
//! - `WITHDRAWAL_NONCE`: `nonce` → `expiration_be_u64(8)`.
//!   Reverse index for O(1) confirmation and lookup by nonce.

use std::ops::Bound;

use heed::RoTxn;

use escrow_store::withdrawal::WithdrawalStore;
use escrow_store::StoreError;
use escrow_types::{Amount, BlockHeight, Nonce, PendingWithdrawal, TxId, WalletAddress};

use crate::environment::LmdbLedgerStore;
use crate::keys;
use crate::LmdbError;

impl LmdbLedgerStore {
    fn expiration_of(&self, txn: &RoTxn, nonce: &Nonce) -> Result<Option<BlockHeight>, LmdbError> {
        match self.db.get(txn, &keys::nonce_key(nonce))? {
            None => Ok(None),
            Some(bytes) => keys::decode_height(bytes).map(Some),
        }
    }

    /// Scan `PENDING_WITHDRAWAL` up to and including `height` (or the whole
    /// namespace), returning each raw key alongside its decoded record.
    /// Records that fail to decode are returned as `Err` so callers can
    /// decide whether to skip or abort.
    #[allow(clippy::type_complexity)]
    fn scan_withdrawals(
        &self,
        txn: &RoTxn,
        up_to: Option<BlockHeight>,
    ) -> Result<Vec<(Vec<u8>, Result<PendingWithdrawal, LmdbError>)>, LmdbError> {
        let lower = [keys::PENDING_WITHDRAWAL];
        let upper = match up_to {
            Some(height) => keys::height_upper_bound(keys::PENDING_WITHDRAWAL, height),
            None => keys::namespace_upper_bound(keys::PENDING_WITHDRAWAL),
        };
        let bounds = (
            Bound::Included(lower.as_slice()),
            Bound::Excluded(upper.as_slice()),
        );
        let mut out = Vec::new();
        for result in self.db.range(txn, &bounds)? {
            let (key, val) = result?;
            let record = bincode::deserialize::<PendingWithdrawal>(val).map_err(LmdbError::from);
            out.push((key.to_vec(), record));
        }
        Ok(out)
    }

    fn collect_records(
        &self,
        up_to: Option<BlockHeight>,
    ) -> Result<Vec<PendingWithdrawal>, StoreError> {
        let rtxn = self.env.read_txn().map_err(LmdbError::from)?;
        let mut records = Vec::new();
        for (_key, record) in self.scan_withdrawals(&rtxn, up_to)? {
            records.push(record?);
        }
        Ok(records)
    }
}

impl WithdrawalStore for LmdbLedgerStore {
    fn start_withdrawal(
        &self,
        nonce: &Nonce,
        wallet: &WalletAddress,
        amount: Amount,
        expiration: BlockHeight,
    ) -> Result<PendingWithdrawal, StoreError> {
        let mut wtxn = self.env.write_txn().map_err(LmdbError::from)?;
        if self.expiration_of(&wtxn, nonce)?.is_some() {
            return Err(StoreError::DuplicateNonce(nonce.to_string()));
        }

        let mut account = self.read_account(&wtxn, wallet)?;
        let split = account.begin_withdrawal(amount)?;
        self.write_account(&mut wtxn, wallet, &account)?;

        let record = PendingWithdrawal::new(
            nonce.clone(),
            wallet.clone(),
            split.withdrawn,
            split.spent_snapshot,
            expiration,
        );
        let bytes = bincode::serialize(&record).map_err(LmdbError::from)?;
        self.db
            .put(&mut wtxn, &keys::withdrawal_key(expiration, nonce), &bytes)
            .map_err(LmdbError::from)?;
        self.db
            .put(&mut wtxn, &keys::nonce_key(nonce), &expiration.to_be_bytes())
            .map_err(LmdbError::from)?;
        wtxn.commit().map_err(LmdbError::from)?;

        tracing::debug!(%nonce, %wallet, withdrawn = %record.amount, expiration, "withdrawal started");
        Ok(record)
    }

    fn finish_withdrawal(&self, nonce: &Nonce) -> Result<bool, StoreError> {
        let mut wtxn = self.env.write_txn().map_err(LmdbError::from)?;
        let Some(expiration) = self.expiration_of(&wtxn, nonce)? else {
            tracing::debug!(%nonce, "confirmation for unknown nonce ignored");
            return Ok(false);
        };
        self.db
            .delete(&mut wtxn, &keys::withdrawal_key(expiration, nonce))
            .map_err(LmdbError::from)?;
        self.db
            .delete(&mut wtxn, &keys::nonce_key(nonce))
            .map_err(LmdbError::from)?;
        wtxn.commit().map_err(LmdbError::from)?;
        Ok(true)
    }

    fn expire(&self, height: BlockHeight) -> Result<Vec<PendingWithdrawal>, StoreError> {
        let mut wtxn = self.env.write_txn().map_err(LmdbError::from)?;
        let scanned = self.scan_withdrawals(&wtxn, Some(height))?;
        if scanned.is_empty() {
            return Ok(Vec::new());
        }

        let mut expired = Vec::with_capacity(scanned.len());
        for (key, record) in scanned {
            // The key alone identifies both index entries, even when the
            // record itself cannot be read.
            let nonce = keys::nonce_from_withdrawal_key(&key)?;
            self.db.delete(&mut wtxn, &key).map_err(LmdbError::from)?;
            self.db
                .delete(&mut wtxn, &keys::nonce_key(&nonce))
                .map_err(LmdbError::from)?;

            let record = match record {
                Ok(record) => record,
                Err(e) => {
                    tracing::error!(%nonce, error = %e, "unreadable withdrawal record dropped without refund");
                    continue;
                }
            };
            let mut account = self.read_account(&wtxn, &record.wallet)?;
            if let Err(e) = account.refund(record.amount, record.spent) {
                tracing::error!(%nonce, wallet = %record.wallet, error = %e, "withdrawal refund skipped");
                continue;
            }
            self.write_account(&mut wtxn, &record.wallet, &account)?;
            expired.push(record);
        }
        wtxn.commit().map_err(LmdbError::from)?;

        tracing::debug!(height, count = expired.len(), "withdrawals expired");
        Ok(expired)
    }

    fn add_tx(&self, nonce: &Nonce, tx_id: &TxId) -> Result<(), StoreError> {
        let mut wtxn = self.env.write_txn().map_err(LmdbError::from)?;
        let expiration = self
            .expiration_of(&wtxn, nonce)?
            .ok_or_else(|| StoreError::NotFound(format!("withdrawal {nonce}")))?;
        let key = keys::withdrawal_key(expiration, nonce);
        let mut record: PendingWithdrawal = {
            let bytes = self
                .db
                .get(&wtxn, &key)
                .map_err(LmdbError::from)?
                .ok_or_else(|| StoreError::Corruption(format!("nonce index points at missing withdrawal {nonce}")))?;
            bincode::deserialize(bytes).map_err(LmdbError::from)?
        };
        record.tx_id = Some(tx_id.clone());
        let bytes = bincode::serialize(&record).map_err(LmdbError::from)?;
        self.db
            .put(&mut wtxn, &key, &bytes)
            .map_err(LmdbError::from)?;
        wtxn.commit().map_err(LmdbError::from)?;
        Ok(())
    }

    fn get_withdrawal(&self, nonce: &Nonce) -> Result<Option<PendingWithdrawal>, StoreError> {
        let rtxn = self.env.read_txn().map_err(LmdbError::from)?;
        let Some(expiration) = self.expiration_of(&rtxn, nonce)? else {
            return Ok(None);
        };
        match self
            .db
            .get(&rtxn, &keys::withdrawal_key(expiration, nonce))
            .map_err(LmdbError::from)?
        {
            None => Ok(None),
            Some(bytes) => Ok(Some(bincode::deserialize(bytes).map_err(LmdbError::from)?)),
        }
    }

    fn withdrawals_for_wallet(
        &self,
        wallet: &WalletAddress,
    ) -> Result<Vec<PendingWithdrawal>, StoreError> {
        let mut records = self.collect_records(None)?;
        records.retain(|w| &w.wallet == wallet);
        Ok(records)
    }

    fn withdrawals_expiring_by(
        &self,
        height: BlockHeight,
    ) -> Result<Vec<PendingWithdrawal>, StoreError> {
        self.collect_records(Some(height))
    }

    fn pending_withdrawals(&self) -> Result<Vec<PendingWithdrawal>, StoreError> {
        self.collect_records(None)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::LmdbEnvironment;
    use escrow_store::balance::BalanceStore;

    fn temp_store() -> (tempfile::TempDir, LmdbLedgerStore) {
        let dir = tempfile::tempdir().expect("temp dir");
        let env = LmdbEnvironment::open(dir.path(), 16 * 1024 * 1024).expect("open env");
        (dir, env.ledger_store())
    }

    fn funded(store: &LmdbLedgerStore, wallet: &str, deposit: u128, spend: u128) -> WalletAddress {
        let wallet = WalletAddress::new(wallet);
        store
            .deposit(&TxId::new(format!("0x{wallet}")), &wallet, Amount::new(deposit), 1)
            .unwrap();
        if spend > 0 {
            store.spend(&wallet, Amount::new(spend)).unwrap();
        }
        wallet
    }

    #[test]
    fn start_withdrawal_debits_and_resets_spent() {
        let (_dir, store) = temp_store();
        let wallet = funded(&store, "0xa", 100, 50);

        let record = store
            .start_withdrawal(&Nonce::new("n1"), &wallet, Amount::new(80), 100)
            .unwrap();
        assert_eq!(record.amount, Amount::new(50));
        assert_eq!(record.spent, Amount::new(50));
        assert_eq!(store.balance(&wallet).unwrap(), Amount::ZERO);
        assert_eq!(store.spent(&wallet).unwrap(), Amount::ZERO);
        assert_eq!(store.get_withdrawal(&Nonce::new("n1")).unwrap(), Some(record));
    }

    #[test]
    fn start_withdrawal_on_empty_account_fails() {
        let (_dir, store) = temp_store();
        let err = store
            .start_withdrawal(&Nonce::new("n1"), &WalletAddress::new("0xa"), Amount::new(1), 10)
            .unwrap_err();
        assert!(matches!(err, StoreError::InsufficientFunds { .. }));
        assert!(store.pending_withdrawals().unwrap().is_empty());
    }

    #[test]
    fn duplicate_nonce_is_rejected() {
        let (_dir, store) = temp_store();
        let wallet = funded(&store, "0xa", 100, 0);
        store
            .start_withdrawal(&Nonce::new("n1"), &wallet, Amount::new(10), 10)
            .unwrap();
        let err = store
            .start_withdrawal(&Nonce::new("n1"), &wallet, Amount::new(10), 20)
            .unwrap_err();
        assert!(matches!(err, StoreError::DuplicateNonce(_)));
        assert_eq!(store.balance(&wallet).unwrap(), Amount::new(90));
    }

    #[test]
    fn finish_withdrawal_removes_without_refund() {
        let (_dir, store) = temp_store();
        let wallet = funded(&store, "0xa", 100, 0);
        store
            .start_withdrawal(&Nonce::new("n1"), &wallet, Amount::new(100), 10)
            .unwrap();

        assert!(store.finish_withdrawal(&Nonce::new("n1")).unwrap());
        assert!(!store.finish_withdrawal(&Nonce::new("n1")).unwrap());
        assert!(store.expire(1_000).unwrap().is_empty());
        assert_eq!(store.balance(&wallet).unwrap(), Amount::ZERO);
    }

    #[test]
    fn expire_refunds_in_expiration_order() {
        let (_dir, store) = temp_store();
        let wallet = funded(&store, "0xa", 100, 50);
        store
            .start_withdrawal(&Nonce::new("late"), &wallet, Amount::new(20), 300)
            .unwrap();
        store
            .start_withdrawal(&Nonce::new("early"), &wallet, Amount::new(10), 256)
            .unwrap();

        assert!(store.expire(255).unwrap().is_empty());
        let expired = store.expire(300).unwrap();
        let nonces: Vec<_> = expired.iter().map(|w| w.nonce.as_str()).collect();
        assert_eq!(nonces, vec!["early", "late"]);

        let acct = store.balance_and_spent(&wallet).unwrap();
        assert_eq!(acct.balance, Amount::new(50));
        assert_eq!(acct.spent, Amount::new(50));
        assert!(store.get_withdrawal(&Nonce::new("late")).unwrap().is_none());
    }

    #[test]
    fn same_expiration_withdrawals_coexist() {
        let (_dir, store) = temp_store();
        let wallet = funded(&store, "0xa", 100, 0);
        store
            .start_withdrawal(&Nonce::new("n1"), &wallet, Amount::new(10), 50)
            .unwrap();
        store
            .start_withdrawal(&Nonce::new("n2"), &wallet, Amount::new(10), 50)
            .unwrap();

        assert!(store.finish_withdrawal(&Nonce::new("n1")).unwrap());
        let remaining = store.withdrawals_expiring_by(50).unwrap();
        assert_eq!(remaining.len(), 1);
        assert_eq!(remaining[0].nonce, Nonce::new("n2"));
    }

    #[test]
    fn add_tx_attaches_chain_transaction() {
        let (_dir, store) = temp_store();
        let wallet = funded(&store, "0xa", 100, 0);
        store
            .start_withdrawal(&Nonce::new("n1"), &wallet, Amount::new(10), 50)
            .unwrap();
        store.add_tx(&Nonce::new("n1"), &TxId::new("0xpaid")).unwrap();

        let listed = store.withdrawals_for_wallet(&wallet).unwrap();
        assert_eq!(listed.len(), 1);
        assert_eq!(listed[0].tx_id, Some(TxId::new("0xpaid")));

        let err = store.add_tx(&Nonce::new("nope"), &TxId::new("0x")).unwrap_err();
        assert!(matches!(err, StoreError::NotFound(_)));
    }

    #[test]
    fn withdrawals_for_wallet_filters_by_owner() {
        let (_dir, store) = temp_store();
        let a = funded(&store, "0xa", 100, 0);
        let b = funded(&store, "0xb", 100, 0);
        store.start_withdrawal(&Nonce::new("na"), &a, Amount::new(1), 5).unwrap();
        store.start_withdrawal(&Nonce::new("nb"), &b, Amount::new(1), 5).unwrap();

        let for_b = store.withdrawals_for_wallet(&b).unwrap();
        assert_eq!(for_b.len(), 1);
        assert_eq!(for_b[0].nonce, Nonce::new("nb"));
        assert_eq!(store.pending_withdrawals().unwrap().len(), 2);
    }
}
