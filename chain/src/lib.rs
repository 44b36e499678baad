//! The chain boundary.
//!
//! [`ChainClient`] is everything the sync layer needs from an external
//! chain: a stream of new block headers and inclusive-range queries for the
//! escrow contract's deposit and withdrawal logs. A concrete RPC client
//! lives outside this workspace; tests use `escrow_nullables::NullChain`.

pub mod client;
pub mod error;
pub mod subscription;

pub use client::ChainClient;
pub use error::ChainError;
pub use subscription::BlockSubscription;
