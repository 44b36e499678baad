//! The escrow sync node: wires the LMDB-backed ledger, the block feed, and
//! the sync coordinator together.

use std::sync::Arc;
use std::time::Duration;

use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use escrow_chain::ChainClient;
use escrow_ledger::{DurableLedger, Ledger};
use escrow_store_lmdb::{LmdbEnvironment, LmdbLedgerStore};
use escrow_types::{PendingWithdrawal, WalletAddress, WithdrawalRequestEvent};

use crate::config::NodeConfig;
use crate::feed::BlockConfirmationFeed;
use crate::sink::LedgerApplier;
use crate::sync::SyncCoordinator;
use crate::{NodeError, ShutdownController, SyncMetrics};

/// A running escrow sync node.
pub struct EscrowNode<C> {
    config: NodeConfig,
    chain: Arc<C>,
    ledger: Arc<DurableLedger<LmdbLedgerStore>>,
    cursor: Arc<LmdbLedgerStore>,
    metrics: Arc<SyncMetrics>,
    shutdown: ShutdownController,
}

impl<C: ChainClient + 'static> EscrowNode<C> {
    /// Validate `config`, open the LMDB environment under `data_dir`, and
    /// load the ledger from it.
    pub fn open(config: NodeConfig, chain: Arc<C>) -> Result<Self, NodeError> {
        config.validate()?;
        let env = LmdbEnvironment::open(&config.data_dir, config.map_size)?;
        let store = env.ledger_store();
        let ledger = Arc::new(DurableLedger::open(store.clone())?);
        let metrics = Arc::new(SyncMetrics::new()?);
        tracing::info!(
            data_dir = %config.data_dir.display(),
            escrow = %config.escrow_address,
            "escrow node opened"
        );
        Ok(Self {
            config,
            chain,
            ledger,
            cursor: Arc::new(store),
            metrics,
            shutdown: ShutdownController::new(),
        })
    }

    pub fn config(&self) -> &NodeConfig {
        &self.config
    }

    pub fn ledger(&self) -> &Arc<DurableLedger<LmdbLedgerStore>> {
        &self.ledger
    }

    pub fn metrics(&self) -> &Arc<SyncMetrics> {
        &self.metrics
    }

    pub fn shutdown(&self) -> &ShutdownController {
        &self.shutdown
    }

    /// Apply an off-chain withdrawal request.
    pub fn request_withdrawal(
        &self,
        event: &WithdrawalRequestEvent,
    ) -> Result<PendingWithdrawal, NodeError> {
        Ok(self.ledger.request_withdrawal(event)?)
    }

    /// Move funds from an address's balance to its spent counter.
    pub fn spend(&self, address: &WalletAddress, amount: &str) -> Result<(), NodeError> {
        Ok(self.ledger.spend(address, amount)?)
    }

    /// Sync until shutdown is triggered or the feed gives up.
    pub async fn run(&self) -> Result<(), NodeError> {
        let feed = BlockConfirmationFeed::new(Arc::clone(&self.chain), self.config.feed_config())
            .with_metrics(Arc::clone(&self.metrics));
        let sink = Arc::new(LedgerApplier::new(Arc::clone(&self.ledger)));
        let coordinator = SyncCoordinator::new(
            Arc::clone(&self.chain),
            sink,
            Arc::clone(&self.cursor),
            self.config.sync_config(),
        )
        .with_metrics(Arc::clone(&self.metrics));

        let cancel = self.shutdown.token();
        let gc = self.spawn_gc(cancel.clone());
        let result = coordinator.run(&feed, cancel).await;
        if let Some(gc) = gc {
            gc.abort();
        }
        result?;
        tracing::info!("escrow node stopped");
        Ok(())
    }

    fn spawn_gc(&self, cancel: CancellationToken) -> Option<JoinHandle<()>> {
        if self.config.gc_interval_secs == 0 {
            return None;
        }
        let period = Duration::from_secs(self.config.gc_interval_secs);
        let ledger = Arc::clone(&self.ledger);
        Some(tokio::spawn(async move {
            let mut interval = tokio::time::interval(period);
            // The first tick fires immediately; there is nothing to compact yet.
            interval.tick().await;
            loop {
                tokio::select! {
                    _ = cancel.cancelled() => break,
                    _ = interval.tick() => ledger.run_gc(),
                }
            }
        }))
    }
}
