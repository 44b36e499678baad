//! Graceful shutdown controller for the sync node.
//!
//! Listens for SIGINT/SIGTERM and cancels a shared
//! [`CancellationToken`]. Subsystems receive child tokens and `select!` on
//! them alongside their main loop.

use tokio::signal;
use tokio_util::sync::CancellationToken;

/// Coordinates graceful shutdown across node subsystems.
#[derive(Debug, Clone, Default)]
pub struct ShutdownController {
    token: CancellationToken,
}

impl ShutdownController {
    pub fn new() -> Self {
        Self::default()
    }

    /// A token cancelled when shutdown is triggered. Cancelling the child
    /// does not shut down the rest of the node.
    pub fn token(&self) -> CancellationToken {
        self.token.child_token()
    }

    /// Trigger shutdown programmatically.
    pub fn shutdown(&self) {
        self.token.cancel();
    }

    pub fn is_shutdown(&self) -> bool {
        self.token.is_cancelled()
    }

    /// Wait for SIGTERM or SIGINT, then trigger shutdown. Returns early if
    /// shutdown was triggered some other way.
    pub async fn wait_for_signal(&self) {
        let ctrl_c = signal::ctrl_c();

        #[cfg(unix)]
        let terminate = async {
            match signal::unix::signal(signal::unix::SignalKind::terminate()) {
                Ok(mut sigterm) => {
                    sigterm.recv().await;
                }
                Err(e) => {
                    tracing::warn!(error = %e, "SIGTERM handler unavailable");
                    std::future::pending::<()>().await;
                }
            }
        };

        #[cfg(not(unix))]
        let terminate = std::future::pending::<()>();

        tokio::select! {
            _ = ctrl_c => { tracing::info!("received SIGINT, shutting down"); }
            _ = terminate => { tracing::info!("received SIGTERM, shutting down"); }
            _ = self.token.cancelled() => { return; }
        }

        self.shutdown();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn programmatic_shutdown_cancels_tokens() {
        let controller = ShutdownController::new();
        let token = controller.token();
        controller.shutdown();
        token.cancelled().await;
        assert!(controller.is_shutdown());
    }

    #[tokio::test]
    async fn cancelling_a_child_leaves_others_running() {
        let controller = ShutdownController::new();
        let a = controller.token();
        let b = controller.token();
        a.cancel();
        assert!(!b.is_cancelled());
        assert!(!controller.is_shutdown());
    }

    #[tokio::test]
    async fn wait_for_signal_returns_after_programmatic_shutdown() {
        let controller = ShutdownController::new();
        let waiter = controller.clone();
        let handle = tokio::spawn(async move { waiter.wait_for_signal().await });
        controller.shutdown();
        handle.await.unwrap();
    }
}
