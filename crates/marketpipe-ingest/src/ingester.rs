//! The ingester: bounded queues, a worker pool, and the dedup cache.

use crate::config::IngestConfig;
use crate::error::{IngestError, IngestResult};
use crate::normalize::normalize;
use chrono::{DateTime, Duration, Utc};
use dashmap::DashMap;
use marketpipe_core::{NormalizedTick, RawTick};
use marketpipe_telemetry::{DropStage, PipelineStats};
use std::sync::Arc;
use std::time::Instant;
use tokio::sync::{mpsc, Mutex};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

/// Seen window inside which an identical tick id is a duplicate.
const DEDUP_WINDOW_SECS: i64 = 5;

/// Dedup cache entries older than this are purged by the sweep.
const DEDUP_RETENTION_SECS: i64 = 300;

/// Cadence of the dedup cache sweep.
const DEDUP_SWEEP_INTERVAL: std::time::Duration = std::time::Duration::from_secs(60);

/// Last accepted quote per symbol, for ordering and sanity checks.
#[derive(Debug, Clone, Copy)]
struct LastQuote {
    timestamp: DateTime<Utc>,
    bid: f64,
}

/// Normalizes, validates, deduplicates and orders raw ticks.
///
/// Submission is synchronous and never blocks: a full input queue
/// drops the tick and returns [`IngestError::BufferFull`].
pub struct Ingester {
    config: IngestConfig,
    stats: Arc<PipelineStats>,
    raw_tx: mpsc::Sender<RawTick>,
    raw_rx: Arc<Mutex<mpsc::Receiver<RawTick>>>,
    out_tx: mpsc::Sender<NormalizedTick>,
    out_rx: parking_lot::Mutex<Option<mpsc::Receiver<NormalizedTick>>>,
    seen: DashMap<String, DateTime<Utc>>,
    last_by_symbol: DashMap<String, LastQuote>,
}

impl Ingester {
    pub fn new(config: IngestConfig, stats: Arc<PipelineStats>) -> Self {
        let (raw_tx, raw_rx) = mpsc::channel(config.tick_buffer_size);
        let (out_tx, out_rx) = mpsc::channel(config.tick_buffer_size);
        Self {
            config,
            stats,
            raw_tx,
            raw_rx: Arc::new(Mutex::new(raw_rx)),
            out_tx,
            out_rx: parking_lot::Mutex::new(Some(out_rx)),
            seen: DashMap::new(),
            last_by_symbol: DashMap::new(),
        }
    }

    /// Queue a raw tick for processing. Non-blocking.
    pub fn submit(&self, raw: RawTick) -> IngestResult<()> {
        match self.raw_tx.try_send(raw) {
            Ok(()) => {
                self.stats.tick_received();
                Ok(())
            }
            Err(_) => {
                self.stats.tick_dropped(DropStage::IngestInput);
                Err(IngestError::BufferFull)
            }
        }
    }

    /// Take the normalized output stream. Can be taken exactly once;
    /// a fresh ingester starts with an empty stream.
    pub fn take_output(&self) -> IngestResult<mpsc::Receiver<NormalizedTick>> {
        self.out_rx.lock().take().ok_or(IngestError::OutputTaken)
    }

    /// Spawn the worker pool and the dedup cache sweep.
    pub fn spawn(self: &Arc<Self>, cancel: &CancellationToken) {
        for _ in 0..self.config.worker_count {
            let this = Arc::clone(self);
            let cancel = cancel.clone();
            tokio::spawn(async move { this.worker_loop(cancel).await });
        }

        let this = Arc::clone(self);
        let cancel = cancel.clone();
        tokio::spawn(async move { this.dedup_sweep_loop(cancel).await });

        info!(workers = self.config.worker_count, "Ingester started");
    }

    async fn worker_loop(self: Arc<Self>, cancel: CancellationToken) {
        loop {
            let raw = {
                let mut rx = self.raw_rx.lock().await;
                tokio::select! {
                    _ = cancel.cancelled() => return,
                    item = rx.recv() => match item {
                        Some(raw) => raw,
                        None => return,
                    },
                }
            };
            self.process(raw);
        }
    }

    /// Run one raw tick through the full normalization path.
    fn process(&self, raw: RawTick) {
        let started = Instant::now();
        let now = Utc::now();

        let tick = match normalize(&raw, now, self.config.max_tick_age_secs) {
            Ok(tick) => tick,
            Err(reason) => {
                debug!(
                    source = %raw.source,
                    symbol = %raw.symbol,
                    reason = reason.as_str(),
                    "Tick rejected"
                );
                self.stats.tick_invalid(reason.as_str());
                return;
            }
        };

        if self.config.enable_deduplication && self.is_duplicate(&tick, now) {
            self.stats.tick_duplicate();
            return;
        }

        // Ordering is advisory: flagged and counted, never dropped.
        if self.config.enable_out_of_order_check && self.is_out_of_order(&tick) {
            self.stats.tick_out_of_order();
            debug!(symbol = %tick.symbol, "Out-of-order tick detected");
        }

        // A spike beyond the sanity threshold may still be legitimate;
        // forward it and let the monitor alert.
        if let Some(last_bid) = self.last_bid(&tick.symbol) {
            let change = ((tick.bid - last_bid) / last_bid).abs();
            if change > self.config.price_sanity_threshold {
                warn!(
                    symbol = %tick.symbol,
                    last_bid,
                    bid = tick.bid,
                    "Abnormal price spike detected"
                );
                self.stats.abnormal_spike_detected();
            }
        }

        self.last_by_symbol.insert(
            tick.symbol.clone(),
            LastQuote {
                timestamp: tick.timestamp,
                bid: tick.bid,
            },
        );

        match self.out_tx.try_send(tick) {
            Ok(()) => {
                let latency_ms = started.elapsed().as_secs_f64() * 1_000.0;
                self.stats.tick_processed(latency_ms);
            }
            Err(_) => self.stats.tick_dropped(DropStage::IngestOutput),
        }
    }

    /// Seen within the dedup window? Marks the id as seen either way.
    fn is_duplicate(&self, tick: &NormalizedTick, now: DateTime<Utc>) -> bool {
        let duplicate = self
            .seen
            .get(&tick.tick_id)
            .map(|seen_at| now - *seen_at < Duration::seconds(DEDUP_WINDOW_SECS))
            .unwrap_or(false);
        if !duplicate {
            self.seen.insert(tick.tick_id.clone(), now);
        }
        duplicate
    }

    fn is_out_of_order(&self, tick: &NormalizedTick) -> bool {
        self.last_by_symbol
            .get(&tick.symbol)
            .map(|last| tick.timestamp < last.timestamp)
            .unwrap_or(false)
    }

    fn last_bid(&self, symbol: &str) -> Option<f64> {
        self.last_by_symbol.get(symbol).map(|last| last.bid)
    }

    async fn dedup_sweep_loop(self: Arc<Self>, cancel: CancellationToken) {
        let mut interval = tokio::time::interval(DEDUP_SWEEP_INTERVAL);
        loop {
            tokio::select! {
                _ = cancel.cancelled() => return,
                _ = interval.tick() => self.purge_dedup_cache(Utc::now()),
            }
        }
    }

    /// Drop dedup entries past retention to bound memory.
    fn purge_dedup_cache(&self, now: DateTime<Utc>) {
        let cutoff = Duration::seconds(DEDUP_RETENTION_SECS);
        self.seen.retain(|_, seen_at| now - *seen_at <= cutoff);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use marketpipe_core::TickStamp;

    fn ingester(config: IngestConfig) -> Ingester {
        Ingester::new(config, Arc::new(PipelineStats::new()))
    }

    fn raw_at(ts: DateTime<Utc>, bid: f64, ask: f64) -> RawTick {
        RawTick::new("oanda", "EURUSD", bid, ask, TickStamp::from(ts))
    }

    #[tokio::test]
    async fn accepted_tick_reaches_output_exactly_once() {
        let ing = ingester(IngestConfig::default());
        let mut out = ing.take_output().unwrap();

        ing.process(raw_at(Utc::now(), 1.08450, 1.08452));

        let tick = out.try_recv().unwrap();
        assert!((tick.spread - 0.00002).abs() < 1e-9);
        assert!(out.try_recv().is_err());
        assert_eq!(ing.stats.ticks_processed_count(), 1);
    }

    #[tokio::test]
    async fn invalid_tick_never_reaches_output() {
        let ing = ingester(IngestConfig::default());
        let mut out = ing.take_output().unwrap();

        // Inverted quote.
        ing.process(raw_at(Utc::now(), 1.08452, 1.08450));

        assert!(out.try_recv().is_err());
        assert_eq!(ing.stats.snapshot().ticks_invalid, 1);
    }

    #[tokio::test]
    async fn duplicate_within_window_is_suppressed() {
        let ing = ingester(IngestConfig::default());
        let mut out = ing.take_output().unwrap();

        let ts = Utc::now();
        ing.process(raw_at(ts, 1.1000, 1.1002));
        ing.process(raw_at(ts, 1.1000, 1.1002));

        assert!(out.try_recv().is_ok());
        assert!(out.try_recv().is_err());
        assert_eq!(ing.stats.snapshot().ticks_duplicate, 1);
    }

    #[tokio::test]
    async fn out_of_order_tick_is_flagged_but_forwarded() {
        let ing = ingester(IngestConfig::default());
        let mut out = ing.take_output().unwrap();

        let now = Utc::now();
        ing.process(raw_at(now, 1.1000, 1.1002));
        ing.process(raw_at(now - Duration::seconds(3), 1.1001, 1.1003));

        assert!(out.try_recv().is_ok());
        assert!(out.try_recv().is_ok());
        assert_eq!(ing.stats.snapshot().ticks_out_of_order, 1);
    }

    #[tokio::test]
    async fn spike_is_flagged_but_forwarded() {
        let ing = ingester(IngestConfig::default());
        let mut out = ing.take_output().unwrap();

        let now = Utc::now();
        ing.process(raw_at(now, 1.1000, 1.1002));
        // +20% bid, well past the 10% default threshold.
        ing.process(RawTick::new(
            "oanda",
            "EURUSD",
            1.3200,
            1.3202,
            TickStamp::from(now + Duration::seconds(1)),
        ));

        assert!(out.try_recv().is_ok());
        assert!(out.try_recv().is_ok());
        assert_eq!(ing.stats.snapshot().abnormal_spikes_detected, 1);
    }

    #[tokio::test]
    async fn submit_never_blocks_when_saturated() {
        let config = IngestConfig {
            tick_buffer_size: 2,
            ..IngestConfig::default()
        };
        let ing = ingester(config);

        // No workers running, so the third submit must fail fast.
        assert!(ing.submit(raw_at(Utc::now(), 1.1, 1.2)).is_ok());
        assert!(ing.submit(raw_at(Utc::now(), 1.1, 1.2)).is_ok());
        let before = ing.stats.ticks_dropped_count();
        assert!(matches!(
            ing.submit(raw_at(Utc::now(), 1.1, 1.2)),
            Err(IngestError::BufferFull)
        ));
        assert!(ing.stats.ticks_dropped_count() > before);
    }

    #[tokio::test]
    async fn dedup_cache_purges_old_entries() {
        let ing = ingester(IngestConfig::default());
        let _out = ing.take_output().unwrap();

        let ts = Utc::now();
        ing.process(raw_at(ts, 1.1000, 1.1002));
        assert_eq!(ing.seen.len(), 1);

        ing.purge_dedup_cache(ts + Duration::seconds(DEDUP_RETENTION_SECS + 1));
        assert!(ing.seen.is_empty());
    }
}
