use proptest::prelude::*;

use escrow_types::{AccountBalance, Amount};

proptest! {
    /// Any u128 rendered in decimal parses back to the same amount.
    #[test]
    fn amount_parses_its_display(raw in any::<u128>()) {
        let amount = Amount::new(raw);
        prop_assert_eq!(amount.to_string().parse::<Amount>().unwrap(), amount);
    }

    /// Strings containing a non-digit never parse.
    #[test]
    fn amount_rejects_non_digits(prefix in "[0-9]{0,5}", bad in "[^0-9]", suffix in "[0-9]{0,5}") {
        let s = format!("{prefix}{bad}{suffix}");
        prop_assert!(s.parse::<Amount>().is_err());
    }

    /// Deposits and spends conserve balance + spent and never drive balance negative.
    #[test]
    fn balance_plus_spent_is_conserved(
        ops in prop::collection::vec((any::<bool>(), 0u128..1_000_000), 1..64)
    ) {
        let mut acct = AccountBalance::EMPTY;
        let mut deposited: u128 = 0;
        for (is_deposit, amount) in ops {
            if is_deposit {
                acct.credit(Amount::new(amount)).unwrap();
                deposited += amount;
            } else {
                let before = acct;
                if acct.spend(Amount::new(amount)).is_err() {
                    prop_assert_eq!(acct, before);
                }
            }
            prop_assert_eq!(acct.balance.raw() + acct.spent.raw(), deposited);
        }
    }

    /// A withdrawal followed by its refund is a no-op.
    #[test]
    fn refund_undoes_withdrawal(
        balance in 0u128..1_000_000,
        spent in 0u128..1_000_000,
        requested in 0u128..2_000_000,
    ) {
        let original = AccountBalance::new(Amount::new(balance), Amount::new(spent));
        let mut acct = original;
        match acct.begin_withdrawal(Amount::new(requested)) {
            Ok(split) => {
                prop_assert!(split.withdrawn.raw() <= balance);
                acct.refund(split.withdrawn, split.spent_snapshot).unwrap();
                prop_assert_eq!(acct, original);
            }
            Err(_) => prop_assert!(original.is_empty()),
        }
    }
}
