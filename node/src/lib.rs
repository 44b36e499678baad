//! Escrow sync node.
//!
//! Reconciles an escrow contract's on-chain deposits and withdrawal payouts
//! into the escrow ledger:
//! - [`BlockConfirmationFeed`] turns raw headers into confirmed heights
//! - [`SyncCoordinator`] backfills history in chunks, then follows the feed
//! - [`LedgerSink`] implementations apply events to a ledger
//!   ([`LedgerApplier`]) or fan them out to consumers ([`EventPublisher`])
//! - [`EscrowNode`] wires these to an LMDB-backed durable ledger

pub mod config;
pub mod error;
pub mod feed;
pub mod metrics;
pub mod node;
pub mod publisher;
pub mod shutdown;
pub mod sink;
pub mod sync;

pub use config::NodeConfig;
pub use error::{FeedError, NodeError, SinkError, SyncError};
pub use escrow_utils::{init_logging, LogFormat};
pub use feed::{BlockConfirmationFeed, ConfirmationQueue, FeedConfig, FeedHandle};
pub use metrics::SyncMetrics;
pub use node::EscrowNode;
pub use publisher::EventPublisher;
pub use shutdown::ShutdownController;
pub use sink::{LedgerApplier, LedgerSink};
pub use sync::{split_blocks, ChunkReport, SyncConfig, SyncCoordinator};
