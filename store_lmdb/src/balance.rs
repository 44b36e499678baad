//! LMDB implementation of BalanceStore.
//!
//! A deposit checks and writes its `(height, tx_id)` marker in the same write
//! transaction that credits the balance, so a redelivered deposit can never
//! be applied twice while its block is uncommitted.

use std::collections::BTreeMap;

use escrow_store::balance::BalanceStore;
use escrow_store::StoreError;
use escrow_types::{AccountBalance, Amount, BlockHeight, TxId, WalletAddress};

use crate::environment::{decode_amount, LmdbLedgerStore};
use crate::keys;
use crate::LmdbError;

impl BalanceStore for LmdbLedgerStore {
    fn deposit(
        &self,
        tx_id: &TxId,
        address: &WalletAddress,
        amount: Amount,
        height: BlockHeight,
    ) -> Result<(), StoreError> {
        let marker = keys::marker_key(height, tx_id);
        let mut wtxn = self.env.write_txn().map_err(LmdbError::from)?;
        if self.db.get(&wtxn, &marker).map_err(LmdbError::from)?.is_some() {
            return Err(StoreError::DuplicateTransaction {
                height,
                tx_id: tx_id.to_string(),
            });
        }

        let mut account = self.read_account(&wtxn, address)?;
        account.credit(amount)?;
        self.write_account(&mut wtxn, address, &account)?;
        self.db
            .put(&mut wtxn, &marker, &[])
            .map_err(LmdbError::from)?;
        wtxn.commit().map_err(LmdbError::from)?;

        tracing::debug!(%address, %amount, height, %tx_id, "deposit applied");
        Ok(())
    }

    fn spend(&self, address: &WalletAddress, amount: Amount) -> Result<(), StoreError> {
        let mut wtxn = self.env.write_txn().map_err(LmdbError::from)?;
        let mut account = self.read_account(&wtxn, address)?;
        account.spend(amount)?;
        self.write_account(&mut wtxn, address, &account)?;
        wtxn.commit().map_err(LmdbError::from)?;
        Ok(())
    }

    fn balance_and_spent(&self, address: &WalletAddress) -> Result<AccountBalance, StoreError> {
        let rtxn = self.env.read_txn().map_err(LmdbError::from)?;
        Ok(self.read_account(&rtxn, address)?)
    }

    fn has_marker(&self, height: BlockHeight, tx_id: &TxId) -> Result<bool, StoreError> {
        let rtxn = self.env.read_txn().map_err(LmdbError::from)?;
        let found = self
            .db
            .get(&rtxn, &keys::marker_key(height, tx_id))
            .map_err(LmdbError::from)?
            .is_some();
        Ok(found)
    }

    fn accounts(&self) -> Result<Vec<(WalletAddress, AccountBalance)>, StoreError> {
        let rtxn = self.env.read_txn().map_err(LmdbError::from)?;
        let mut accounts: BTreeMap<WalletAddress, AccountBalance> = BTreeMap::new();

        for prefix in [keys::DEPOSIT_BALANCE, keys::SPENT_BALANCE] {
            let iter = self
                .db
                .prefix_iter(&rtxn, &[prefix])
                .map_err(LmdbError::from)?;
            for result in iter {
                let (key, val) = result.map_err(LmdbError::from)?;
                let address = keys::address_from_key(key)?;
                let amount = decode_amount(val)?;
                let entry = accounts.entry(address).or_default();
                if prefix == keys::DEPOSIT_BALANCE {
                    entry.balance = amount;
                } else {
                    entry.spent = amount;
                }
            }
        }
        Ok(accounts.into_iter().collect())
    }
}
