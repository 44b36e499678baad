//! LMDB implementation of CursorStore.

use std::ops::Bound;

use heed::{RoTxn, RwTxn};

use escrow_store::cursor::CursorStore;
use escrow_store::StoreError;
use escrow_types::BlockHeight;

use crate::environment::LmdbLedgerStore;
use crate::keys;
use crate::LmdbError;

impl LmdbLedgerStore {
    fn read_cursor(&self, txn: &RoTxn) -> Result<Option<BlockHeight>, LmdbError> {
        match self.db.get(txn, &keys::cursor_key())? {
            None => Ok(None),
            Some(bytes) => keys::decode_height(bytes).map(Some),
        }
    }

    /// Returns `true` when the cursor moved.
    fn advance_cursor(&self, txn: &mut RwTxn, next: BlockHeight) -> Result<bool, LmdbError> {
        if let Some(current) = self.read_cursor(txn)? {
            if current >= next {
                return Ok(false);
            }
        }
        self.db.put(txn, &keys::cursor_key(), &next.to_be_bytes())?;
        Ok(true)
    }
}

impl CursorStore for LmdbLedgerStore {
    fn next_height(&self) -> Result<Option<BlockHeight>, StoreError> {
        let rtxn = self.env.read_txn().map_err(LmdbError::from)?;
        Ok(self.read_cursor(&rtxn)?)
    }

    fn set_next_height(&self, height: BlockHeight) -> Result<(), StoreError> {
        let mut wtxn = self.env.write_txn().map_err(LmdbError::from)?;
        if self.advance_cursor(&mut wtxn, height)? {
            wtxn.commit().map_err(LmdbError::from)?;
        } else {
            tracing::debug!(height, "cursor already past requested height");
        }
        Ok(())
    }

    fn commit_block(&self, height: BlockHeight) -> Result<(), StoreError> {
        let lower = [keys::BLOCK_TX_MARKER];
        let upper = keys::height_upper_bound(keys::BLOCK_TX_MARKER, height);
        let bounds = (
            Bound::Included(lower.as_slice()),
            Bound::Excluded(upper.as_slice()),
        );

        let mut wtxn = self.env.write_txn().map_err(LmdbError::from)?;
        let reclaimed = self
            .db
            .delete_range(&mut wtxn, &bounds)
            .map_err(LmdbError::from)?;
        self.advance_cursor(&mut wtxn, height.saturating_add(1))?;
        wtxn.commit().map_err(LmdbError::from)?;

        if reclaimed > 0 {
            tracing::debug!(height, reclaimed, "replay markers reclaimed");
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::LmdbEnvironment;
    use escrow_store::balance::BalanceStore;
    use escrow_types::{Amount, TxId, WalletAddress};

    fn temp_store() -> (tempfile::TempDir, LmdbLedgerStore) {
        let dir = tempfile::tempdir().expect("temp dir");
        let env = LmdbEnvironment::open(dir.path(), 16 * 1024 * 1024).expect("open env");
        (dir, env.ledger_store())
    }

    #[test]
    fn fresh_store_has_no_cursor() {
        let (_dir, store) = temp_store();
        assert_eq!(store.next_height().unwrap(), None);
    }

    #[test]
    fn commit_block_advances_cursor_past_height() {
        let (_dir, store) = temp_store();
        store.commit_block(41).unwrap();
        assert_eq!(store.next_height().unwrap(), Some(42));
    }

    #[test]
    fn cursor_never_moves_backwards() {
        let (_dir, store) = temp_store();
        store.set_next_height(100).unwrap();
        store.set_next_height(50).unwrap();
        store.commit_block(10).unwrap();
        assert_eq!(store.next_height().unwrap(), Some(100));
    }

    #[test]
    fn commit_block_reclaims_markers_up_to_height() {
        let (_dir, store) = temp_store();
        let addr = WalletAddress::new("0xa");
        let (t1, t2, t3) = (TxId::new("0x1"), TxId::new("0x2"), TxId::new("0x3"));
        store.deposit(&t1, &addr, Amount::new(1), 9).unwrap();
        store.deposit(&t2, &addr, Amount::new(1), 10).unwrap();
        store.deposit(&t3, &addr, Amount::new(1), 11).unwrap();

        store.commit_block(10).unwrap();

        assert!(!store.has_marker(9, &t1).unwrap());
        assert!(!store.has_marker(10, &t2).unwrap());
        assert!(store.has_marker(11, &t3).unwrap());
        // Balances are untouched by reclamation.
        assert_eq!(store.balance(&addr).unwrap(), Amount::new(3));
    }
}
