//! Shared utilities for the escrow ledger.

pub mod logging;
pub mod retry;
pub mod time;

pub use logging::{init_logging, init_tracing, LogFormat};
pub use retry::RetrySchedule;
pub use time::format_elapsed;
