//! Block confirmation feed.
//!
//! Turns the chain's raw header stream, which may skip, repeat, or replay
//! heights and may drop out entirely, into an ordered, gap-free stream of
//! heights that are `required_confirmations` blocks deep.
//!
//! The feed runs as one background task per [`BlockConfirmationFeed::listen`]
//! call. Lost or idle subscriptions are replaced following the configured
//! [`RetrySchedule`]; the ordering state survives resubscription, so no
//! height is ever emitted twice.

use std::collections::VecDeque;
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use escrow_chain::{BlockSubscription, ChainClient, ChainError};
use escrow_types::BlockHeight;
use escrow_utils::RetrySchedule;

use crate::{FeedError, SyncMetrics};

#[derive(Debug, Clone)]
pub struct FeedConfig {
    pub required_confirmations: u64,
    /// Resubscribe when no header arrives for this long.
    pub idle_timeout: Duration,
    /// Capacity of the header and confirmed-height channels.
    pub header_buffer: usize,
    /// Pause before each confirmed-height emission.
    pub emit_interval: Duration,
    pub retry: RetrySchedule,
}

impl Default for FeedConfig {
    fn default() -> Self {
        Self {
            required_confirmations: 12,
            idle_timeout: Duration::from_secs(30),
            header_buffer: 100,
            emit_interval: Duration::from_millis(50),
            retry: RetrySchedule::default(),
        }
    }
}

/// Gap-filling, deduplicating finality queue.
///
/// Heights enter as headers are observed and leave, oldest first, once
/// `required` newer heights are queued behind them.
#[derive(Debug)]
pub struct ConfirmationQueue {
    required: u64,
    last: Option<BlockHeight>,
    pending: VecDeque<BlockHeight>,
}

impl ConfirmationQueue {
    pub fn new(required: u64) -> Self {
        Self {
            required,
            last: None,
            pending: VecDeque::new(),
        }
    }

    /// Observe a header and return the heights that became final, ascending.
    ///
    /// The first header seeds the queue with itself only. Later headers
    /// above the last one enqueue every height up to and including them;
    /// headers at or below it are stale and ignored.
    pub fn push(&mut self, header: BlockHeight) -> Vec<BlockHeight> {
        match self.last {
            None => self.pending.push_back(header),
            Some(last) if header <= last => {
                tracing::trace!(header, last, "stale header dropped");
                return Vec::new();
            }
            Some(last) => {
                if header > last + 1 {
                    tracing::debug!(from = last + 1, to = header, "filling header gap");
                }
                self.pending.extend(last + 1..=header);
            }
        }
        self.last = Some(header);

        let mut ready = Vec::new();
        while self.pending.len() as u64 > self.required {
            match self.pending.pop_front() {
                Some(height) => ready.push(height),
                None => break,
            }
        }
        ready
    }

    /// Highest header observed so far.
    pub fn last_seen(&self) -> Option<BlockHeight> {
        self.last
    }

    /// Heights observed but not yet final.
    pub fn pending_len(&self) -> usize {
        self.pending.len()
    }
}

/// Receiving side of a running feed.
///
/// `heights` closes when the feed stops. A feed that stops because it could
/// not resubscribe reports [`FeedError::ReconnectExhausted`] on `errors`
/// first; a cancelled feed stops without an error.
#[derive(Debug)]
pub struct FeedHandle {
    pub heights: mpsc::Receiver<BlockHeight>,
    pub errors: mpsc::Receiver<FeedError>,
    pub task: JoinHandle<()>,
}

pub struct BlockConfirmationFeed<C> {
    chain: Arc<C>,
    config: FeedConfig,
    metrics: Option<Arc<SyncMetrics>>,
}

impl<C: ChainClient + 'static> BlockConfirmationFeed<C> {
    pub fn new(chain: Arc<C>, config: FeedConfig) -> Self {
        Self {
            chain,
            config,
            metrics: None,
        }
    }

    pub fn with_metrics(mut self, metrics: Arc<SyncMetrics>) -> Self {
        self.metrics = Some(metrics);
        self
    }

    pub fn config(&self) -> &FeedConfig {
        &self.config
    }

    /// Chain tip minus the confirmation depth, saturating at zero.
    pub async fn last_confirmed_block(&self) -> Result<BlockHeight, ChainError> {
        let tip = self.chain.latest_block().await?;
        Ok(tip.saturating_sub(self.config.required_confirmations))
    }

    /// Subscribe and start emitting confirmed heights.
    ///
    /// Fails only if the initial subscription cannot be established; later
    /// failures are retried in the background.
    pub async fn listen(&self, cancel: CancellationToken) -> Result<FeedHandle, FeedError> {
        let subscription = self
            .chain
            .subscribe_blocks(self.config.header_buffer)
            .await
            .map_err(FeedError::Subscribe)?;

        let (heights_tx, heights_rx) = mpsc::channel(self.config.header_buffer.max(1));
        let (errors_tx, errors_rx) = mpsc::channel(1);
        let worker = FeedWorker {
            chain: Arc::clone(&self.chain),
            config: self.config.clone(),
            metrics: self.metrics.clone(),
            queue: ConfirmationQueue::new(self.config.required_confirmations),
            heights: heights_tx,
            errors: errors_tx,
            cancel,
        };
        tracing::info!(
            required_confirmations = self.config.required_confirmations,
            "block feed started"
        );
        let task = tokio::spawn(worker.run(subscription));
        Ok(FeedHandle {
            heights: heights_rx,
            errors: errors_rx,
            task,
        })
    }
}

enum SessionEnd {
    /// Cancelled, or nobody is listening any more.
    Stopped,
    Failed { received: bool, reason: String },
}

struct FeedWorker<C> {
    chain: Arc<C>,
    config: FeedConfig,
    metrics: Option<Arc<SyncMetrics>>,
    queue: ConfirmationQueue,
    heights: mpsc::Sender<BlockHeight>,
    errors: mpsc::Sender<FeedError>,
    cancel: CancellationToken,
}

impl<C: ChainClient> FeedWorker<C> {
    async fn run(mut self, first: BlockSubscription) {
        let mut next = Some(first);
        // Index into the retry schedule; reset by any session that delivered a header.
        let mut attempt = 0usize;
        let mut last_failure = String::new();

        loop {
            let mut subscription = match next.take() {
                Some(s) => s,
                None => match self.resubscribe(&mut attempt, &mut last_failure).await {
                    Resubscribe::Connected(s) => s,
                    Resubscribe::Retry => continue,
                    Resubscribe::Stop => return,
                },
            };

            let end = self.session(&mut subscription).await;
            subscription.unsubscribe();
            match end {
                SessionEnd::Stopped => {
                    tracing::info!(last_seen = ?self.queue.last_seen(), "block feed stopped");
                    return;
                }
                SessionEnd::Failed { received, reason } => {
                    if received {
                        attempt = 0;
                    }
                    tracing::warn!(%reason, "block subscription lost, resubscribing");
                    last_failure = reason;
                }
            }
        }
    }

    async fn resubscribe(&mut self, attempt: &mut usize, last_failure: &mut String) -> Resubscribe {
        let Some(delay) = self.config.retry.delay(*attempt) else {
            tracing::error!(attempts = *attempt, last = %last_failure, "block subscription retries exhausted");
            let _ = self
                .errors
                .send(FeedError::ReconnectExhausted {
                    attempts: *attempt,
                    last: std::mem::take(last_failure),
                })
                .await;
            return Resubscribe::Stop;
        };
        *attempt += 1;
        if let Some(m) = &self.metrics {
            m.reconnects.inc();
        }

        if !delay.is_zero() {
            tokio::select! {
                _ = self.cancel.cancelled() => return Resubscribe::Stop,
                _ = tokio::time::sleep(delay) => {}
            }
        }
        let result = tokio::select! {
            _ = self.cancel.cancelled() => return Resubscribe::Stop,
            r = self.chain.subscribe_blocks(self.config.header_buffer) => r,
        };
        match result {
            Ok(s) => {
                tracing::info!(attempt = *attempt, "block subscription re-established");
                Resubscribe::Connected(s)
            }
            Err(e) => {
                tracing::warn!(attempt = *attempt, error = %e, "resubscribe failed");
                *last_failure = e.to_string();
                Resubscribe::Retry
            }
        }
    }

    async fn session(&mut self, subscription: &mut BlockSubscription) -> SessionEnd {
        let mut received = false;
        let mut errors_open = true;
        loop {
            let idle = tokio::time::sleep(self.config.idle_timeout);
            tokio::select! {
                biased;
                _ = self.cancel.cancelled() => return SessionEnd::Stopped,
                header = subscription.headers.recv() => match header {
                    Some(h) => {
                        received = true;
                        if let Some(m) = &self.metrics {
                            m.set_chain_head(h);
                        }
                        if !self.accept(h).await {
                            return SessionEnd::Stopped;
                        }
                    }
                    None => {
                        return SessionEnd::Failed {
                            received,
                            reason: ChainError::SubscriptionClosed.to_string(),
                        }
                    }
                },
                error = subscription.errors.recv(), if errors_open => match error {
                    Some(e) => return SessionEnd::Failed { received, reason: e.to_string() },
                    None => errors_open = false,
                },
                _ = idle => {
                    return SessionEnd::Failed {
                        received,
                        reason: format!("no header within {:?}", self.config.idle_timeout),
                    }
                }
            }
        }
    }

    /// Queue a header and emit whatever became final. Returns `false` when
    /// the feed should stop.
    async fn accept(&mut self, header: BlockHeight) -> bool {
        for height in self.queue.push(header) {
            if !self.config.emit_interval.is_zero() {
                tokio::select! {
                    _ = self.cancel.cancelled() => return false,
                    _ = tokio::time::sleep(self.config.emit_interval) => {}
                }
            }
            let sent = tokio::select! {
                _ = self.cancel.cancelled() => return false,
                r = self.heights.send(height) => r.is_ok(),
            };
            if !sent {
                tracing::debug!("height receiver dropped");
                return false;
            }
            if let Some(m) = &self.metrics {
                m.heights_emitted.inc();
            }
            tracing::trace!(height, "confirmed height emitted");
        }
        true
    }
}

enum Resubscribe {
    Connected(BlockSubscription),
    Retry,
    Stop,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn first_header_seeds_queue_with_itself() {
        let mut q = ConfirmationQueue::new(2);
        assert!(q.push(100).is_empty());
        assert_eq!(q.pending_len(), 1);
        assert_eq!(q.last_seen(), Some(100));
    }

    #[test]
    fn emits_once_depth_exceeds_confirmations() {
        let mut q = ConfirmationQueue::new(2);
        assert!(q.push(1).is_empty());
        assert!(q.push(2).is_empty());
        assert_eq!(q.push(3), vec![1]);
        assert_eq!(q.push(4), vec![2]);
    }

    #[test]
    fn gaps_are_filled() {
        let mut q = ConfirmationQueue::new(1);
        q.push(10);
        assert_eq!(q.push(14), vec![10, 11, 12, 13]);
        assert_eq!(q.pending_len(), 1);
    }

    #[test]
    fn stale_and_duplicate_headers_are_dropped() {
        let mut q = ConfirmationQueue::new(0);
        assert_eq!(q.push(5), vec![5]);
        assert!(q.push(5).is_empty());
        assert!(q.push(3).is_empty());
        assert_eq!(q.push(6), vec![6]);
        assert_eq!(q.last_seen(), Some(6));
    }

    #[test]
    fn zero_confirmations_emit_immediately() {
        let mut q = ConfirmationQueue::new(0);
        assert_eq!(q.push(7), vec![7]);
        assert_eq!(q.push(9), vec![8, 9]);
        assert_eq!(q.pending_len(), 0);
    }
}
