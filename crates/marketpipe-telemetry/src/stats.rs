//! Process-wide pipeline statistics.
//!
//! Counters are independent atomics so unrelated stages never contend
//! on a shared lock; only the smoothed latencies live behind a mutex,
//! and that mutex is dedicated to stats, never a data-plane lock.

use crate::metrics::Metrics;
use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use serde::Serialize;
use std::sync::atomic::{AtomicU64, Ordering};

/// Weight of the previous value in the latency EWMA.
const EWMA_DECAY: f64 = 0.9;

/// Stage at which a tick was dropped on a full bounded queue.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DropStage {
    IngestInput,
    IngestOutput,
    Distribution,
    Storage,
}

impl DropStage {
    pub const fn as_str(self) -> &'static str {
        match self {
            DropStage::IngestInput => "ingest_input",
            DropStage::IngestOutput => "ingest_output",
            DropStage::Distribution => "distribution",
            DropStage::Storage => "storage",
        }
    }
}

#[derive(Debug, Default)]
struct StageLatencies {
    ingest_ms: f64,
    ohlc_ms: f64,
    distribution_ms: f64,
}

/// Shared pipeline counters. One instance per pipeline, `Arc`-shared
/// into every component.
#[derive(Debug, Default)]
pub struct PipelineStats {
    ticks_received: AtomicU64,
    ticks_processed: AtomicU64,
    ticks_dropped: AtomicU64,
    ticks_duplicate: AtomicU64,
    ticks_out_of_order: AtomicU64,
    ticks_invalid: AtomicU64,
    candles_generated: AtomicU64,
    candles_dropped: AtomicU64,
    quotes_distributed: AtomicU64,
    publish_errors: AtomicU64,
    storage_errors: AtomicU64,
    stale_feeds_detected: AtomicU64,
    abnormal_spikes_detected: AtomicU64,
    latencies: Mutex<StageLatencies>,
    last_tick_at: Mutex<Option<DateTime<Utc>>>,
}

fn ewma(current: f64, sample: f64) -> f64 {
    if current == 0.0 {
        sample
    } else {
        current * EWMA_DECAY + sample * (1.0 - EWMA_DECAY)
    }
}

impl PipelineStats {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn tick_received(&self) {
        self.ticks_received.fetch_add(1, Ordering::Relaxed);
        Metrics::tick_received();
    }

    /// Record one tick forwarded downstream, with its ingest latency.
    pub fn tick_processed(&self, latency_ms: f64) {
        self.ticks_processed.fetch_add(1, Ordering::Relaxed);
        Metrics::tick_processed();
        Metrics::stage_latency("ingest", latency_ms);
        {
            let mut lat = self.latencies.lock();
            lat.ingest_ms = ewma(lat.ingest_ms, latency_ms);
        }
        *self.last_tick_at.lock() = Some(Utc::now());
    }

    pub fn tick_dropped(&self, stage: DropStage) {
        self.ticks_dropped.fetch_add(1, Ordering::Relaxed);
        Metrics::tick_dropped(stage.as_str());
    }

    pub fn tick_invalid(&self, reason: &str) {
        self.ticks_invalid.fetch_add(1, Ordering::Relaxed);
        Metrics::tick_rejected(reason);
    }

    pub fn tick_duplicate(&self) {
        self.ticks_duplicate.fetch_add(1, Ordering::Relaxed);
        Metrics::tick_duplicate();
    }

    pub fn tick_out_of_order(&self) {
        self.ticks_out_of_order.fetch_add(1, Ordering::Relaxed);
        Metrics::tick_out_of_order();
    }

    pub fn candle_generated(&self, timeframe: &str) {
        self.candles_generated.fetch_add(1, Ordering::Relaxed);
        Metrics::candle_generated(timeframe);
    }

    pub fn candle_dropped(&self) {
        self.candles_dropped.fetch_add(1, Ordering::Relaxed);
        Metrics::candle_dropped();
    }

    pub fn quote_distributed(&self, latency_ms: f64) {
        self.quotes_distributed.fetch_add(1, Ordering::Relaxed);
        Metrics::quote_distributed();
        Metrics::stage_latency("distribution", latency_ms);
        let mut lat = self.latencies.lock();
        lat.distribution_ms = ewma(lat.distribution_ms, latency_ms);
    }

    pub fn ohlc_latency(&self, latency_ms: f64) {
        Metrics::stage_latency("ohlc", latency_ms);
        let mut lat = self.latencies.lock();
        lat.ohlc_ms = ewma(lat.ohlc_ms, latency_ms);
    }

    pub fn publish_error(&self, kind: &str) {
        self.publish_errors.fetch_add(1, Ordering::Relaxed);
        Metrics::publish_error(kind);
    }

    pub fn storage_error(&self, op: &str) {
        self.storage_errors.fetch_add(1, Ordering::Relaxed);
        Metrics::storage_error(op);
    }

    pub fn stale_feed_detected(&self) {
        self.stale_feeds_detected.fetch_add(1, Ordering::Relaxed);
        Metrics::stale_feed();
    }

    pub fn abnormal_spike_detected(&self) {
        self.abnormal_spikes_detected.fetch_add(1, Ordering::Relaxed);
        Metrics::abnormal_spike();
    }

    pub fn ticks_dropped_count(&self) -> u64 {
        self.ticks_dropped.load(Ordering::Relaxed)
    }

    pub fn ticks_processed_count(&self) -> u64 {
        self.ticks_processed.load(Ordering::Relaxed)
    }

    /// Atomic point-in-time view for the stats surface.
    pub fn snapshot(&self) -> StatsSnapshot {
        let (avg_ingest_ms, avg_ohlc_ms, avg_distribution_ms) = {
            let lat = self.latencies.lock();
            (lat.ingest_ms, lat.ohlc_ms, lat.distribution_ms)
        };
        StatsSnapshot {
            ticks_received: self.ticks_received.load(Ordering::Relaxed),
            ticks_processed: self.ticks_processed.load(Ordering::Relaxed),
            ticks_dropped: self.ticks_dropped.load(Ordering::Relaxed),
            ticks_duplicate: self.ticks_duplicate.load(Ordering::Relaxed),
            ticks_out_of_order: self.ticks_out_of_order.load(Ordering::Relaxed),
            ticks_invalid: self.ticks_invalid.load(Ordering::Relaxed),
            candles_generated: self.candles_generated.load(Ordering::Relaxed),
            candles_dropped: self.candles_dropped.load(Ordering::Relaxed),
            quotes_distributed: self.quotes_distributed.load(Ordering::Relaxed),
            publish_errors: self.publish_errors.load(Ordering::Relaxed),
            storage_errors: self.storage_errors.load(Ordering::Relaxed),
            stale_feeds_detected: self.stale_feeds_detected.load(Ordering::Relaxed),
            abnormal_spikes_detected: self.abnormal_spikes_detected.load(Ordering::Relaxed),
            avg_ingest_latency_ms: avg_ingest_ms,
            avg_ohlc_latency_ms: avg_ohlc_ms,
            avg_distribution_latency_ms: avg_distribution_ms,
            last_tick_at: *self.last_tick_at.lock(),
        }
    }
}

/// Serializable snapshot of all counters.
#[derive(Debug, Clone, Serialize)]
pub struct StatsSnapshot {
    pub ticks_received: u64,
    pub ticks_processed: u64,
    pub ticks_dropped: u64,
    pub ticks_duplicate: u64,
    pub ticks_out_of_order: u64,
    pub ticks_invalid: u64,
    pub candles_generated: u64,
    pub candles_dropped: u64,
    pub quotes_distributed: u64,
    pub publish_errors: u64,
    pub storage_errors: u64,
    pub stale_feeds_detected: u64,
    pub abnormal_spikes_detected: u64,
    pub avg_ingest_latency_ms: f64,
    pub avg_ohlc_latency_ms: f64,
    pub avg_distribution_latency_ms: f64,
    pub last_tick_at: Option<DateTime<Utc>>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn counters_accumulate() {
        let stats = PipelineStats::new();
        stats.tick_received();
        stats.tick_received();
        stats.tick_processed(0.5);
        stats.tick_dropped(DropStage::IngestInput);
        stats.tick_duplicate();

        let snap = stats.snapshot();
        assert_eq!(snap.ticks_received, 2);
        assert_eq!(snap.ticks_processed, 1);
        assert_eq!(snap.ticks_dropped, 1);
        assert_eq!(snap.ticks_duplicate, 1);
        assert!(snap.last_tick_at.is_some());
    }

    #[test]
    fn ewma_seeds_then_smooths() {
        let stats = PipelineStats::new();
        stats.tick_processed(10.0);
        assert!((stats.snapshot().avg_ingest_latency_ms - 10.0).abs() < 1e-9);

        stats.tick_processed(20.0);
        // 10 * 0.9 + 20 * 0.1
        assert!((stats.snapshot().avg_ingest_latency_ms - 11.0).abs() < 1e-9);
    }

    #[test]
    fn snapshot_serializes() {
        let stats = PipelineStats::new();
        stats.quote_distributed(1.0);
        let json = serde_json::to_string(&stats.snapshot()).unwrap();
        assert!(json.contains("\"quotes_distributed\":1"));
    }
}
