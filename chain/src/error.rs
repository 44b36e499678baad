use escrow_types::BlockHeight;
use thiserror::Error;

#[derive(Debug, Clone, Error)]
pub enum ChainError {
    #[error("rpc error: {0}")]
    Rpc(String),

    #[error("subscription failed: {0}")]
    Subscription(String),

    #[error("subscription closed by the remote end")]
    SubscriptionClosed,

    #[error("log query for blocks {from}..={to} failed: {reason}")]
    LogQuery {
        from: BlockHeight,
        to: BlockHeight,
        reason: String,
    },

    #[error("malformed log: {0}")]
    MalformedLog(String),
}
