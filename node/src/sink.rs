//! Where the sync coordinator delivers chain events.

use std::sync::Arc;

use async_trait::async_trait;

use escrow_ledger::Ledger;
use escrow_types::{BlockHeight, DepositEvent, WithdrawalConfirmedEvent};

use crate::SinkError;

/// Downstream consumer of reconciled chain events.
///
/// Events arrive ordered by height, deposits before confirmations within a
/// height. `finalize_block(h)` promises nothing at or below `h` follows.
#[async_trait]
pub trait LedgerSink: Send + Sync {
    async fn deposit(&self, event: &DepositEvent) -> Result<(), SinkError>;

    async fn withdrawal_confirmed(&self, event: &WithdrawalConfirmedEvent)
        -> Result<(), SinkError>;

    async fn finalize_block(&self, height: BlockHeight) -> Result<(), SinkError>;
}

/// Applies events directly to a [`Ledger`].
pub struct LedgerApplier<L> {
    ledger: Arc<L>,
}

impl<L: Ledger> LedgerApplier<L> {
    pub fn new(ledger: Arc<L>) -> Self {
        Self { ledger }
    }

    pub fn ledger(&self) -> &Arc<L> {
        &self.ledger
    }
}

#[async_trait]
impl<L: Ledger + 'static> LedgerSink for LedgerApplier<L> {
    async fn deposit(&self, event: &DepositEvent) -> Result<(), SinkError> {
        self.ledger.deposit(event)?;
        tracing::debug!(
            caller = %event.caller,
            amount = %event.amount,
            height = event.height,
            tx_id = %event.tx_id,
            "deposit applied"
        );
        Ok(())
    }

    async fn withdrawal_confirmed(
        &self,
        event: &WithdrawalConfirmedEvent,
    ) -> Result<(), SinkError> {
        self.ledger.confirm_withdrawal(event)?;
        Ok(())
    }

    async fn finalize_block(&self, height: BlockHeight) -> Result<(), SinkError> {
        let refunded = self.ledger.finalize_block(height)?;
        for w in &refunded {
            tracing::info!(
                nonce = %w.nonce,
                wallet = %w.wallet,
                amount = %w.amount,
                expiration = w.expiration,
                "withdrawal expired and refunded"
            );
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use escrow_ledger::LedgerProcessor;
    use escrow_types::{Amount, Nonce, TxId, WalletAddress, WithdrawalRequestEvent};

    fn deposit(amount: &str) -> DepositEvent {
        DepositEvent {
            tx_id: TxId::new("0x1"),
            caller: WalletAddress::new("0xa"),
            amount: amount.into(),
            height: 3,
        }
    }

    #[tokio::test]
    async fn applier_forwards_to_ledger() {
        let ledger = Arc::new(LedgerProcessor::new());
        let sink = LedgerApplier::new(Arc::clone(&ledger));

        sink.deposit(&deposit("100")).await.unwrap();
        ledger
            .request_withdrawal(&WithdrawalRequestEvent {
                wallet: WalletAddress::new("0xa"),
                amount: "40".into(),
                nonce: Nonce::new("n1"),
                expiration: 10,
            })
            .unwrap();
        sink.finalize_block(10).await.unwrap();

        assert_eq!(ledger.balance(&WalletAddress::new("0xa")), Amount::new(100));
        assert!(!ledger.nonce_exists(&Nonce::new("n1")));
    }

    #[tokio::test]
    async fn malformed_deposit_is_a_rejection() {
        let sink = LedgerApplier::new(Arc::new(LedgerProcessor::new()));
        let err = sink.deposit(&deposit("abc")).await.unwrap_err();
        assert!(err.is_rejection());
        assert!(!err.is_duplicate());
    }
}
