//! Live header subscription handle.

use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

use escrow_types::BlockHeight;

use crate::ChainError;

/// A live header subscription.
///
/// Heights arrive on `headers`; transport failures arrive on `errors`. The
/// producer watches the subscription's token and stops when it is
/// cancelled, which happens on [`unsubscribe`](Self::unsubscribe) or drop.
#[derive(Debug)]
pub struct BlockSubscription {
    pub headers: mpsc::Receiver<BlockHeight>,
    pub errors: mpsc::Receiver<ChainError>,
    cancel: CancellationToken,
}

impl BlockSubscription {
    pub fn new(
        headers: mpsc::Receiver<BlockHeight>,
        errors: mpsc::Receiver<ChainError>,
        cancel: CancellationToken,
    ) -> Self {
        Self {
            headers,
            errors,
            cancel,
        }
    }

    /// Build a subscription plus the producer's ends: header sender, error
    /// sender, and the token the producer should stop on.
    pub fn channel(
        buffer: usize,
    ) -> (
        Self,
        mpsc::Sender<BlockHeight>,
        mpsc::Sender<ChainError>,
        CancellationToken,
    ) {
        let (header_tx, header_rx) = mpsc::channel(buffer.max(1));
        let (error_tx, error_rx) = mpsc::channel(1);
        let cancel = CancellationToken::new();
        let producer_token = cancel.clone();
        (
            Self::new(header_rx, error_rx, cancel),
            header_tx,
            error_tx,
            producer_token,
        )
    }

    pub fn unsubscribe(&mut self) {
        if !self.cancel.is_cancelled() {
            tracing::debug!("block subscription released");
            self.cancel.cancel();
        }
        self.headers.close();
        self.errors.close();
    }

    pub fn is_unsubscribed(&self) -> bool {
        self.cancel.is_cancelled()
    }
}

impl Drop for BlockSubscription {
    fn drop(&mut self) {
        self.cancel.cancel();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn headers_flow_until_unsubscribe() {
        let (mut sub, headers, _errors, token) = BlockSubscription::channel(4);
        headers.send(7).await.unwrap();
        assert_eq!(sub.headers.recv().await, Some(7));

        sub.unsubscribe();
        assert!(token.is_cancelled());
        assert!(sub.is_unsubscribed());
        assert!(headers.send(8).await.is_err());
    }

    #[tokio::test]
    async fn drop_cancels_producer_token() {
        let (sub, _headers, _errors, token) = BlockSubscription::channel(1);
        drop(sub);
        assert!(token.is_cancelled());
    }
}
