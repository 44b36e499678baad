//! Sync coordinator: historical backfill followed by live streaming.
//!
//! The coordinator reconciles the persisted cursor (the next height to
//! consume) against the chain. Historical ranges are fetched in bounded
//! chunks; once caught up, each height emitted by the
//! [`BlockConfirmationFeed`] is processed as a one-block chunk.
//!
//! A chunk is processed strictly in order: fetch deposits and withdrawal
//! confirmations, forward them downstream, finalize the chunk's upper
//! bound, then advance the cursor. Any failure before the cursor write
//! leaves the cursor where it was, so the whole chunk is replayed next time.

use std::sync::Arc;
use std::time::Instant;

use tokio_util::sync::CancellationToken;

use escrow_chain::{ChainClient, ChainError};
use escrow_store::CursorStore;
use escrow_types::{BlockHeight, DepositEvent, WalletAddress, WithdrawalConfirmedEvent};
use escrow_utils::time::{blocks_per_sec, format_elapsed};

use crate::feed::BlockConfirmationFeed;
use crate::{LedgerSink, SyncError, SyncMetrics};

/// Split `[start, end]` into ordered inclusive ranges at most `chunk_size`
/// wide. The last range ends exactly at `end`; `start > end` yields nothing;
/// a chunk size of zero is treated as one.
pub fn split_blocks(
    start: BlockHeight,
    end: BlockHeight,
    chunk_size: u64,
) -> Vec<(BlockHeight, BlockHeight)> {
    let width = chunk_size.max(1);
    let mut ranges = Vec::new();
    let mut lo = start;
    while lo <= end {
        let hi = lo.saturating_add(width - 1).min(end);
        ranges.push((lo, hi));
        if hi == end {
            break;
        }
        lo = hi + 1;
    }
    ranges
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SyncConfig {
    pub chunk_size: u64,
    /// Where to begin when no cursor has been persisted.
    pub start_height: BlockHeight,
    pub escrow_address: WalletAddress,
}

/// A chain event tagged for in-chunk ordering.
#[derive(Debug)]
enum ChainEvent {
    Deposit(DepositEvent),
    Withdrawal(WithdrawalConfirmedEvent),
}

impl ChainEvent {
    /// Height first, deposits before confirmations within a height.
    fn order_key(&self) -> (BlockHeight, u8) {
        match self {
            Self::Deposit(e) => (e.height, 0),
            Self::Withdrawal(e) => (e.height, 1),
        }
    }
}

/// Outcome of processing one range.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ChunkReport {
    pub forwarded: usize,
    pub skipped: usize,
}

pub struct SyncCoordinator<C, K, U> {
    chain: Arc<C>,
    sink: Arc<K>,
    cursor: Arc<U>,
    config: SyncConfig,
    metrics: Option<Arc<SyncMetrics>>,
}

impl<C, K, U> SyncCoordinator<C, K, U>
where
    C: ChainClient + 'static,
    K: LedgerSink,
    U: CursorStore + Send + Sync,
{
    pub fn new(chain: Arc<C>, sink: Arc<K>, cursor: Arc<U>, config: SyncConfig) -> Self {
        Self {
            chain,
            sink,
            cursor,
            config,
            metrics: None,
        }
    }

    pub fn with_metrics(mut self, metrics: Arc<SyncMetrics>) -> Self {
        self.metrics = Some(metrics);
        self
    }

    /// Next height to consume: the persisted cursor, or the configured
    /// start height on first run.
    pub fn next_height(&self) -> Result<BlockHeight, SyncError> {
        Ok(self
            .cursor
            .next_height()?
            .unwrap_or(self.config.start_height))
    }

    /// Process `[from, to]` chunk by chunk.
    pub async fn sync_range(&self, from: BlockHeight, to: BlockHeight) -> Result<(), SyncError> {
        self.sync_range_until(from, to, &CancellationToken::new()).await
    }

    /// Like [`sync_range`](Self::sync_range), but stops before the next chunk
    /// once `cancel` fires. Committed chunks stay committed.
    pub async fn sync_range_until(
        &self,
        from: BlockHeight,
        to: BlockHeight,
        cancel: &CancellationToken,
    ) -> Result<(), SyncError> {
        let chunks = split_blocks(from, to, self.config.chunk_size);
        if chunks.is_empty() {
            return Ok(());
        }
        let started = Instant::now();
        tracing::info!(from, to, chunks = chunks.len(), "backfill started");

        let mut total = ChunkReport::default();
        for (lo, hi) in chunks {
            if cancel.is_cancelled() {
                tracing::info!(next = lo, to, "backfill interrupted by shutdown");
                return Ok(());
            }
            let report = self.process_chunk(lo, hi).await?;
            total.forwarded += report.forwarded;
            total.skipped += report.skipped;
        }

        let elapsed = started.elapsed();
        tracing::info!(
            from,
            to,
            forwarded = total.forwarded,
            skipped = total.skipped,
            elapsed = %format_elapsed(elapsed),
            blocks_per_sec = blocks_per_sec((to - from).saturating_add(1), elapsed),
            "backfill complete"
        );
        Ok(())
    }

    /// Fetch, forward, finalize, and commit one inclusive range.
    pub async fn process_chunk(
        &self,
        lo: BlockHeight,
        hi: BlockHeight,
    ) -> Result<ChunkReport, SyncError> {
        let started = Instant::now();
        let escrow = &self.config.escrow_address;
        let fetch_err = |source: ChainError| SyncError::ChunkFetch {
            from: lo,
            to: hi,
            source,
        };

        let deposits = self
            .chain
            .deposits(lo, hi, escrow)
            .await
            .map_err(fetch_err)?;
        let withdrawals = self
            .chain
            .withdrawals(lo, hi, escrow)
            .await
            .map_err(fetch_err)?;

        let mut events: Vec<ChainEvent> = deposits
            .into_iter()
            .map(ChainEvent::Deposit)
            .chain(withdrawals.into_iter().map(ChainEvent::Withdrawal))
            .collect();
        // Stable: keeps the chain's order within a height and kind.
        events.sort_by_key(ChainEvent::order_key);

        let mut report = ChunkReport::default();
        for event in &events {
            if self.forward(event).await? {
                report.forwarded += 1;
            } else {
                report.skipped += 1;
            }
        }

        self.sink.finalize_block(hi).await?;
        let next = hi.saturating_add(1);
        self.cursor.set_next_height(next)?;

        if let Some(m) = &self.metrics {
            m.chunks_synced.inc();
            m.events_forwarded.inc_by(report.forwarded as u64);
            m.events_skipped.inc_by(report.skipped as u64);
            m.set_cursor(next);
            m.chunk_duration_ms
                .observe(started.elapsed().as_secs_f64() * 1_000.0);
        }
        tracing::debug!(lo, hi, forwarded = report.forwarded, skipped = report.skipped, "chunk committed");
        Ok(report)
    }

    /// Deliver one event. `Ok(false)` means the sink refused it and it was
    /// skipped; sink failures that are not rejections abort the chunk.
    async fn forward(&self, event: &ChainEvent) -> Result<bool, SyncError> {
        let result = match event {
            ChainEvent::Deposit(e) => self.sink.deposit(e).await,
            ChainEvent::Withdrawal(e) => self.sink.withdrawal_confirmed(e).await,
        };
        match result {
            Ok(()) => Ok(true),
            Err(e) if e.is_duplicate() => {
                tracing::debug!(event = ?event, "replayed event skipped");
                Ok(false)
            }
            Err(e) if e.is_rejection() => {
                tracing::warn!(event = ?event, error = %e, "event rejected, skipping");
                Ok(false)
            }
            Err(e) => Err(SyncError::Sink(e)),
        }
    }

    /// Handle one live confirmed height.
    pub async fn process_live(&self, height: BlockHeight) -> Result<(), SyncError> {
        let next = self.next_height()?;
        if height < next {
            tracing::debug!(height, next, "live height already synced");
            return Ok(());
        }
        if height > next {
            tracing::info!(from = next, to = height - 1, "catching up before live height");
            self.sync_range(next, height - 1).await?;
        }
        self.process_chunk(height, height).await?;
        Ok(())
    }

    /// Backfill to the last confirmed block, then follow the feed until
    /// `cancel` fires or the feed gives up.
    pub async fn run(
        &self,
        feed: &BlockConfirmationFeed<C>,
        cancel: CancellationToken,
    ) -> Result<(), SyncError> {
        let start = self.next_height()?;
        let confirmed = feed
            .last_confirmed_block()
            .await
            .map_err(SyncError::Tip)?;
        if start <= confirmed {
            self.sync_range_until(start, confirmed, &cancel).await?;
            if cancel.is_cancelled() {
                return Ok(());
            }
        } else {
            tracing::info!(start, confirmed, "cursor ahead of confirmed tip, nothing to backfill");
        }

        let feed_token = cancel.child_token();
        let mut handle = feed.listen(feed_token.clone()).await?;
        let outcome = loop {
            tokio::select! {
                biased;
                _ = cancel.cancelled() => break Ok(()),
                height = handle.heights.recv() => match height {
                    Some(h) => {
                        if let Err(e) = self.process_live(h).await {
                            break Err(e);
                        }
                    }
                    None => {
                        break match handle.errors.try_recv() {
                            Ok(e) => Err(SyncError::Feed(e)),
                            Err(_) => Ok(()),
                        }
                    }
                },
            }
        };

        feed_token.cancel();
        if let Err(e) = (&mut handle.task).await {
            tracing::warn!(error = %e, "feed task ended abnormally");
        }
        if let Err(e) = &outcome {
            tracing::error!(error = %e, "sync stopped");
        }
        outcome
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn split_covers_range_in_bounded_chunks() {
        assert_eq!(
            split_blocks(0, 25, 10),
            vec![(0, 9), (10, 19), (20, 25)]
        );
    }

    #[test]
    fn split_single_block() {
        assert_eq!(split_blocks(7, 7, 10), vec![(7, 7)]);
    }

    #[test]
    fn split_exact_multiple() {
        assert_eq!(split_blocks(1, 20, 10), vec![(1, 10), (11, 20)]);
    }

    #[test]
    fn split_empty_when_start_after_end() {
        assert!(split_blocks(10, 9, 10).is_empty());
    }

    #[test]
    fn split_zero_chunk_size_is_one() {
        assert_eq!(split_blocks(3, 5, 0), vec![(3, 3), (4, 4), (5, 5)]);
    }

    #[test]
    fn split_reaches_u64_max_without_overflow() {
        let ranges = split_blocks(u64::MAX - 3, u64::MAX, 2);
        assert_eq!(ranges, vec![(u64::MAX - 3, u64::MAX - 2), (u64::MAX - 1, u64::MAX)]);
    }

    #[test]
    fn deposits_sort_before_confirmations_within_height() {
        use escrow_types::{Nonce, TxId};
        let w = ChainEvent::Withdrawal(WithdrawalConfirmedEvent {
            tx_id: TxId::new("0x2"),
            nonce: Nonce::new("n"),
            receiver: WalletAddress::new("0xa"),
            amount: "1".into(),
            height: 5,
        });
        let d = ChainEvent::Deposit(DepositEvent {
            tx_id: TxId::new("0x1"),
            caller: WalletAddress::new("0xa"),
            amount: "1".into(),
            height: 5,
        });
        assert!(d.order_key() < w.order_key());
    }
}
