use async_trait::async_trait;

use escrow_types::{BlockHeight, DepositEvent, WalletAddress, WithdrawalConfirmedEvent};

use crate::{BlockSubscription, ChainError};

/// Access to an external chain.
///
/// Log queries take inclusive height ranges and must be safe to repeat:
/// the sync layer re-requests a range after any failure.
#[async_trait]
pub trait ChainClient: Send + Sync {
    /// Subscribe to new block headers. `buffer` bounds the header channel.
    async fn subscribe_blocks(&self, buffer: usize) -> Result<BlockSubscription, ChainError>;

    /// Height of the current chain tip.
    async fn latest_block(&self) -> Result<BlockHeight, ChainError>;

    /// Deposits into `escrow` in blocks `from..=to`, ordered by height.
    async fn deposits(
        &self,
        from: BlockHeight,
        to: BlockHeight,
        escrow: &WalletAddress,
    ) -> Result<Vec<DepositEvent>, ChainError>;

    /// Withdrawal payouts from `escrow` in blocks `from..=to`, ordered by height.
    async fn withdrawals(
        &self,
        from: BlockHeight,
        to: BlockHeight,
        escrow: &WalletAddress,
    ) -> Result<Vec<WithdrawalConfirmedEvent>, ChainError>;
}
