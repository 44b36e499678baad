//! Nullable infrastructure for deterministic testing.
//!
//! External dependencies (the chain, the cursor store) are abstracted behind
//! traits. This crate provides test-friendly implementations that:
//! - Return scripted, deterministic values
//! - Can be controlled and inspected programmatically
//! - Never touch the filesystem or network
//!
//! Usage: swap real implementations for nullables in tests.

pub mod chain;
pub mod cursor;

pub use chain::{NullChain, ScriptStep};
pub use cursor::NullCursor;
