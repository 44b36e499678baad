//! Per-account accounting rules.
//!
//! Both the in-memory processor and the durable store apply the same
//! transitions, so the arithmetic lives here once. Every method validates
//! before mutating: on error the entry is unchanged.

use serde::{Deserialize, Serialize};

use crate::{AccountError, Amount};

/// The `{balance, spent}` pair kept for each address.
///
/// An entry with both fields zero is logically absent; stores drop it
/// instead of materialising it.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct AccountBalance {
    pub balance: Amount,
    pub spent: Amount,
}

/// Outcome of opening a withdrawal against an account.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct WithdrawalSplit {
    /// Amount actually withdrawn, `min(requested, balance)`.
    pub withdrawn: Amount,
    /// The `spent` counter as it was before the request; restored on expiry.
    pub spent_snapshot: Amount,
}

impl AccountBalance {
    pub const EMPTY: Self = Self {
        balance: Amount::ZERO,
        spent: Amount::ZERO,
    };

    pub fn new(balance: Amount, spent: Amount) -> Self {
        Self { balance, spent }
    }

    pub fn is_empty(&self) -> bool {
        self.balance.is_zero() && self.spent.is_zero()
    }

    pub fn credit(&mut self, amount: Amount) -> Result<(), AccountError> {
        self.balance = self
            .balance
            .checked_add(amount)
            .ok_or(AccountError::Overflow)?;
        Ok(())
    }

    /// Move `amount` from balance to spent.
    pub fn spend(&mut self, amount: Amount) -> Result<(), AccountError> {
        let balance = self
            .balance
            .checked_sub(amount)
            .ok_or(AccountError::InsufficientFunds {
                needed: amount.raw(),
                available: self.balance.raw(),
            })?;
        let spent = self.spent.checked_add(amount).ok_or(AccountError::Overflow)?;
        self.balance = balance;
        self.spent = spent;
        Ok(())
    }

    /// Open a withdrawal of up to `requested`.
    ///
    /// Fails only when the account has neither balance nor spent. Otherwise
    /// the withdrawn amount is truncated to the balance and the spent counter
    /// is reset, its prior value returned as the snapshot.
    pub fn begin_withdrawal(&mut self, requested: Amount) -> Result<WithdrawalSplit, AccountError> {
        if self.is_empty() {
            return Err(AccountError::InsufficientFunds {
                needed: requested.raw(),
                available: 0,
            });
        }
        let withdrawn = requested.min(self.balance);
        let split = WithdrawalSplit {
            withdrawn,
            spent_snapshot: self.spent,
        };
        self.balance = self.balance.saturating_sub(withdrawn);
        self.spent = Amount::ZERO;
        Ok(split)
    }

    /// Undo a withdrawal that expired unconfirmed.
    pub fn refund(&mut self, withdrawn: Amount, spent_snapshot: Amount) -> Result<(), AccountError> {
        let balance = self
            .balance
            .checked_add(withdrawn)
            .ok_or(AccountError::Overflow)?;
        let spent = self
            .spent
            .checked_add(spent_snapshot)
            .ok_or(AccountError::Overflow)?;
        self.balance = balance;
        self.spent = spent;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn acct(balance: u128, spent: u128) -> AccountBalance {
        AccountBalance::new(Amount::new(balance), Amount::new(spent))
    }

    #[test]
    fn spend_moves_balance_to_spent() {
        let mut a = acct(100, 0);
        a.spend(Amount::new(40)).unwrap();
        assert_eq!(a, acct(60, 40));
    }

    #[test]
    fn overspend_leaves_entry_untouched() {
        let mut a = acct(10, 5);
        let err = a.spend(Amount::new(11)).unwrap_err();
        assert_eq!(
            err,
            AccountError::InsufficientFunds {
                needed: 11,
                available: 10
            }
        );
        assert_eq!(a, acct(10, 5));
    }

    #[test]
    fn withdrawal_truncates_to_balance() {
        let mut a = acct(30, 20);
        let split = a.begin_withdrawal(Amount::new(50)).unwrap();
        assert_eq!(split.withdrawn, Amount::new(30));
        assert_eq!(split.spent_snapshot, Amount::new(20));
        assert_eq!(a, AccountBalance::EMPTY);
    }

    #[test]
    fn withdrawal_with_only_spent_withdraws_nothing() {
        let mut a = acct(0, 20);
        let split = a.begin_withdrawal(Amount::new(50)).unwrap();
        assert_eq!(split.withdrawn, Amount::ZERO);
        assert_eq!(split.spent_snapshot, Amount::new(20));
        assert!(a.is_empty());
    }

    #[test]
    fn withdrawal_on_empty_account_fails() {
        let mut a = AccountBalance::EMPTY;
        assert!(matches!(
            a.begin_withdrawal(Amount::new(1)),
            Err(AccountError::InsufficientFunds { .. })
        ));
    }

    #[test]
    fn refund_restores_pre_withdrawal_state() {
        let mut a = acct(50, 50);
        let split = a.begin_withdrawal(Amount::new(50)).unwrap();
        a.refund(split.withdrawn, split.spent_snapshot).unwrap();
        assert_eq!(a, acct(50, 50));
    }

    #[test]
    fn credit_overflow_is_reported() {
        let mut a = acct(u128::MAX, 0);
        assert_eq!(a.credit(Amount::new(1)), Err(AccountError::Overflow));
        assert_eq!(a.balance.raw(), u128::MAX);
    }
}
