use thiserror::Error;

use escrow_chain::ChainError;
use escrow_ledger::LedgerError;
use escrow_store::StoreError;
use escrow_types::{BlockHeight, EnvelopeError};

#[derive(Debug, Error)]
pub enum FeedError {
    #[error("block subscription failed: {0}")]
    Subscribe(ChainError),

    #[error("gave up resubscribing after {attempts} attempts: {last}")]
    ReconnectExhausted { attempts: usize, last: String },
}

#[derive(Debug, Error)]
pub enum SinkError {
    #[error(transparent)]
    Ledger(#[from] LedgerError),

    #[error("event encoding failed: {0}")]
    Encode(#[from] EnvelopeError),

    #[error("partition {0} consumer is gone")]
    PartitionClosed(usize),
}

impl SinkError {
    /// A replayed event the ledger has already applied.
    pub fn is_duplicate(&self) -> bool {
        matches!(self, SinkError::Ledger(LedgerError::DuplicateTransaction { .. }))
    }

    /// The event was refused on its own merits; the sink is healthy.
    pub fn is_rejection(&self) -> bool {
        matches!(self, SinkError::Ledger(e) if e.is_rejection())
    }
}

#[derive(Debug, Error)]
pub enum SyncError {
    #[error("fetching logs for blocks {from}..={to} failed: {source}")]
    ChunkFetch {
        from: BlockHeight,
        to: BlockHeight,
        #[source]
        source: ChainError,
    },

    #[error("reading chain tip failed: {0}")]
    Tip(ChainError),

    #[error("sink error: {0}")]
    Sink(#[from] SinkError),

    #[error("feed error: {0}")]
    Feed(#[from] FeedError),

    #[error("cursor error: {0}")]
    Cursor(#[from] StoreError),
}

#[derive(Debug, Error)]
pub enum NodeError {
    #[error("ledger error: {0}")]
    Ledger(#[from] LedgerError),

    #[error("store error: {0}")]
    Store(#[from] StoreError),

    #[error("storage backend error: {0}")]
    Lmdb(#[from] escrow_store_lmdb::LmdbError),

    #[error("sync error: {0}")]
    Sync(#[from] SyncError),

    #[error("metrics error: {0}")]
    Metrics(#[from] prometheus::Error),

    #[error("config error: {0}")]
    Config(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}
