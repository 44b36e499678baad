//! Prometheus metrics for the sync node.
//!
//! [`SyncMetrics`] owns a dedicated [`Registry`] so an embedding service can
//! encode it into the Prometheus text exposition format alongside its own.

use prometheus::{
    register_histogram_with_registry, register_int_counter_with_registry,
    register_int_gauge_with_registry, Histogram, HistogramOpts, IntCounter, IntGauge, Opts,
    Registry,
};

/// Counters and gauges covering the feed, backfill, and ledger cache.
pub struct SyncMetrics {
    /// The Prometheus registry that owns every metric below.
    pub registry: Registry,

    // ── Counters ────────────────────────────────────────────────────────
    /// Confirmed heights emitted by the block feed.
    pub heights_emitted: IntCounter,
    /// Resubscribe attempts after a subscription failed or went idle.
    pub reconnects: IntCounter,
    /// Block ranges fully processed and committed.
    pub chunks_synced: IntCounter,
    /// Chain events accepted by the sink.
    pub events_forwarded: IntCounter,
    /// Chain events the sink refused (replays and rejections).
    pub events_skipped: IntCounter,

    // ── Gauges ──────────────────────────────────────────────────────────
    /// Next height the coordinator will consume.
    pub cursor: IntGauge,
    /// Highest height announced by the chain's header stream.
    pub chain_head: IntGauge,

    // ── Histograms ──────────────────────────────────────────────────────
    /// Wall time to fetch, apply, and commit one range, in milliseconds.
    pub chunk_duration_ms: Histogram,
}

impl SyncMetrics {
    pub fn new() -> Result<Self, prometheus::Error> {
        let registry = Registry::new();

        let heights_emitted = register_int_counter_with_registry!(
            Opts::new(
                "escrow_feed_heights_emitted_total",
                "Confirmed block heights emitted by the feed"
            ),
            registry
        )?;

        let reconnects = register_int_counter_with_registry!(
            Opts::new(
                "escrow_feed_reconnects_total",
                "Block subscription resubscribe attempts"
            ),
            registry
        )?;

        let chunks_synced = register_int_counter_with_registry!(
            Opts::new("escrow_sync_chunks_total", "Block ranges synced and committed"),
            registry
        )?;

        let events_forwarded = register_int_counter_with_registry!(
            Opts::new(
                "escrow_sync_events_forwarded_total",
                "Chain events applied by the sink"
            ),
            registry
        )?;

        let events_skipped = register_int_counter_with_registry!(
            Opts::new(
                "escrow_sync_events_skipped_total",
                "Chain events refused by the sink"
            ),
            registry
        )?;

        let cursor = register_int_gauge_with_registry!(
            Opts::new("escrow_sync_cursor", "Next block height to be consumed"),
            registry
        )?;

        let chain_head = register_int_gauge_with_registry!(
            Opts::new("escrow_chain_head", "Latest header height seen"),
            registry
        )?;

        // 1 ms to ~16 s.
        let chunk_duration_ms = register_histogram_with_registry!(
            HistogramOpts::new(
                "escrow_sync_chunk_duration_ms",
                "Time to sync one block range in milliseconds"
            )
            .buckets(prometheus::exponential_buckets(1.0, 2.0, 15)?),
            registry
        )?;

        Ok(Self {
            registry,
            heights_emitted,
            reconnects,
            chunks_synced,
            events_forwarded,
            events_skipped,
            cursor,
            chain_head,
            chunk_duration_ms,
        })
    }

    /// Set the cursor gauge, clamping heights beyond `i64::MAX`.
    pub fn set_cursor(&self, next: u64) {
        self.cursor.set(i64::try_from(next).unwrap_or(i64::MAX));
    }

    pub fn set_chain_head(&self, height: u64) {
        self.chain_head.set(i64::try_from(height).unwrap_or(i64::MAX));
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn metrics_register_and_gather() {
        let metrics = SyncMetrics::new().unwrap();
        metrics.heights_emitted.inc();
        metrics.set_cursor(42);
        metrics.chunk_duration_ms.observe(3.0);

        let families = metrics.registry.gather();
        assert_eq!(families.len(), 8);
        assert_eq!(metrics.cursor.get(), 42);
    }

    #[test]
    fn huge_heights_clamp() {
        let metrics = SyncMetrics::new().unwrap();
        metrics.set_chain_head(u64::MAX);
        assert_eq!(metrics.chain_head.get(), i64::MAX);
    }
}
