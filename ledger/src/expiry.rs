//! Withdrawal expiry tracker — pending withdrawals indexed by expiration and nonce.
//!
//! The ordered index is keyed by `(expiration, sequence)`: several withdrawals
//! may share an expiration height, and the insertion sequence keeps them
//! distinct and independently removable while preserving FIFO order within a
//! height. The nonce index maps each nonce to its ordered-index key.
//!
//! Not synchronised; [`crate::LedgerProcessor`] owns it behind its mutex.

use std::collections::{BTreeMap, HashMap};

use escrow_types::{BlockHeight, Nonce, PendingWithdrawal};

#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
struct ExpiryKey {
    expiration: BlockHeight,
    seq: u64,
}

#[derive(Debug, Default)]
pub struct WithdrawalExpiryTracker {
    by_expiration: BTreeMap<ExpiryKey, PendingWithdrawal>,
    by_nonce: HashMap<Nonce, ExpiryKey>,
    next_seq: u64,
}

impl WithdrawalExpiryTracker {
    pub fn new() -> Self {
        Self::default()
    }

    /// Track a withdrawal. Returns `false`, leaving the tracker unchanged, if
    /// its nonce is already tracked.
    #[must_use]
    pub fn insert(&mut self, withdrawal: PendingWithdrawal) -> bool {
        if self.by_nonce.contains_key(&withdrawal.nonce) {
            return false;
        }
        let key = ExpiryKey {
            expiration: withdrawal.expiration,
            seq: self.next_seq,
        };
        self.next_seq = self.next_seq.wrapping_add(1);
        self.by_nonce.insert(withdrawal.nonce.clone(), key);
        self.by_expiration.insert(key, withdrawal);
        true
    }

    pub fn remove_by_nonce(&mut self, nonce: &Nonce) -> Option<PendingWithdrawal> {
        let key = self.by_nonce.remove(nonce)?;
        self.by_expiration.remove(&key)
    }

    /// Remove and return every withdrawal with `expiration <= height`,
    /// ascending by expiration.
    pub fn pop_expired(&mut self, height: BlockHeight) -> Vec<PendingWithdrawal> {
        let mut expired = Vec::new();
        while let Some(entry) = self.by_expiration.first_entry() {
            if entry.key().expiration > height {
                break;
            }
            let withdrawal = entry.remove();
            self.by_nonce.remove(&withdrawal.nonce);
            expired.push(withdrawal);
        }
        expired
    }

    pub fn get_by_nonce(&self, nonce: &Nonce) -> Option<&PendingWithdrawal> {
        let key = self.by_nonce.get(nonce)?;
        self.by_expiration.get(key)
    }

    pub(crate) fn get_by_nonce_mut(&mut self, nonce: &Nonce) -> Option<&mut PendingWithdrawal> {
        let key = self.by_nonce.get(nonce)?;
        self.by_expiration.get_mut(key)
    }

    pub fn contains(&self, nonce: &Nonce) -> bool {
        self.by_nonce.contains_key(nonce)
    }

    /// Lowest expiration height currently tracked.
    pub fn min_expiration(&self) -> Option<BlockHeight> {
        self.by_expiration.keys().next().map(|k| k.expiration)
    }

    pub fn len(&self) -> usize {
        self.by_expiration.len()
    }

    pub fn is_empty(&self) -> bool {
        self.by_expiration.is_empty()
    }

    /// Tracked withdrawals in expiration order.
    pub fn iter(&self) -> impl Iterator<Item = &PendingWithdrawal> {
        self.by_expiration.values()
    }

    /// Release capacity the nonce index kept after removals.
    ///
    /// `HashMap` never shrinks on its own; the ordered index is node-based
    /// and frees as it goes, so it is left alone.
    pub fn run_gc(&mut self) {
        self.by_nonce.shrink_to_fit();
    }

    #[cfg(test)]
    fn nonce_index_capacity(&self) -> usize {
        self.by_nonce.capacity()
    }
}
