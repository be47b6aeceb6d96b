//! Prometheus metrics for the market-data pipeline.
//!
//! Observability for:
//! - Tick throughput and drops per stage
//! - Rejection reasons at the ingest boundary
//! - Candle generation per timeframe
//! - Distribution volume and publish failures
//! - Feed health status and alerts
//!
//! # Panics
//!
//! Metric registration uses `unwrap()` intentionally. A registration
//! failure means duplicate metric names, which is a fatal configuration
//! error that should crash at startup rather than fail silently. These
//! panics only occur during static initialization, never at runtime.

use once_cell::sync::Lazy;
use prometheus::{
    register_histogram_vec, register_int_counter, register_int_counter_vec, register_int_gauge_vec,
    HistogramVec, IntCounter, IntCounterVec, IntGaugeVec,
};

/// Raw ticks accepted onto the input queue.
pub static TICKS_RECEIVED_TOTAL: Lazy<IntCounter> = Lazy::new(|| {
    register_int_counter!(
        "marketpipe_ticks_received_total",
        "Raw ticks accepted onto the ingest input queue"
    )
    .unwrap()
});

/// Ticks that made it through normalization onto the output stream.
pub static TICKS_PROCESSED_TOTAL: Lazy<IntCounter> = Lazy::new(|| {
    register_int_counter!(
        "marketpipe_ticks_processed_total",
        "Normalized ticks forwarded to the pipeline"
    )
    .unwrap()
});

/// Ticks dropped because a bounded queue was full.
pub static TICKS_DROPPED_TOTAL: Lazy<IntCounterVec> = Lazy::new(|| {
    register_int_counter_vec!(
        "marketpipe_ticks_dropped_total",
        "Ticks dropped at a full bounded queue",
        &["stage"]
    )
    .unwrap()
});

/// Ticks rejected at the ingest boundary.
pub static TICKS_REJECTED_TOTAL: Lazy<IntCounterVec> = Lazy::new(|| {
    register_int_counter_vec!(
        "marketpipe_ticks_rejected_total",
        "Ticks rejected during normalization or validation",
        &["reason"]
    )
    .unwrap()
});

/// Duplicate ticks suppressed by the dedup cache.
pub static TICKS_DUPLICATE_TOTAL: Lazy<IntCounter> = Lazy::new(|| {
    register_int_counter!(
        "marketpipe_ticks_duplicate_total",
        "Duplicate ticks suppressed within the dedup window"
    )
    .unwrap()
});

/// Ticks observed behind the last accepted timestamp for their symbol.
pub static TICKS_OUT_OF_ORDER_TOTAL: Lazy<IntCounter> = Lazy::new(|| {
    register_int_counter!(
        "marketpipe_ticks_out_of_order_total",
        "Ticks flagged out-of-order (advisory, still forwarded)"
    )
    .unwrap()
});

/// Candles emitted, by timeframe.
pub static CANDLES_GENERATED_TOTAL: Lazy<IntCounterVec> = Lazy::new(|| {
    register_int_counter_vec!(
        "marketpipe_candles_generated_total",
        "Closed candles emitted",
        &["timeframe"]
    )
    .unwrap()
});

/// Closed candles dropped at a full emission queue.
pub static CANDLES_DROPPED_TOTAL: Lazy<IntCounter> = Lazy::new(|| {
    register_int_counter!(
        "marketpipe_candles_dropped_total",
        "Closed candles dropped at a full emission queue"
    )
    .unwrap()
});

/// Quotes published to subscribers.
pub static QUOTES_DISTRIBUTED_TOTAL: Lazy<IntCounter> = Lazy::new(|| {
    register_int_counter!(
        "marketpipe_quotes_distributed_total",
        "Quotes published on the pub/sub channels"
    )
    .unwrap()
});

/// Publish failures, by payload kind.
pub static PUBLISH_ERRORS_TOTAL: Lazy<IntCounterVec> = Lazy::new(|| {
    register_int_counter_vec!(
        "marketpipe_publish_errors_total",
        "Failed pub/sub publishes (logged, never retried)",
        &["kind"]
    )
    .unwrap()
});

/// Storage write failures, by operation.
pub static STORAGE_ERRORS_TOTAL: Lazy<IntCounterVec> = Lazy::new(|| {
    register_int_counter_vec!(
        "marketpipe_storage_errors_total",
        "Failed storage operations (logged, never block the hot path)",
        &["op"]
    )
    .unwrap()
});

/// Stale feed detections.
pub static STALE_FEEDS_TOTAL: Lazy<IntCounter> = Lazy::new(|| {
    register_int_counter!(
        "marketpipe_stale_feeds_total",
        "Feeds that transitioned healthy -> stale"
    )
    .unwrap()
});

/// Feed recoveries.
pub static FEED_RECOVERIES_TOTAL: Lazy<IntCounter> = Lazy::new(|| {
    register_int_counter!(
        "marketpipe_feed_recoveries_total",
        "Feeds that recovered to healthy"
    )
    .unwrap()
});

/// Abnormal price spikes flagged.
pub static ABNORMAL_SPIKES_TOTAL: Lazy<IntCounter> = Lazy::new(|| {
    register_int_counter!(
        "marketpipe_abnormal_spikes_total",
        "Price moves beyond the sanity threshold (advisory)"
    )
    .unwrap()
});

/// Per-stage processing latency.
pub static STAGE_LATENCY_MS: Lazy<HistogramVec> = Lazy::new(|| {
    register_histogram_vec!(
        "marketpipe_stage_latency_ms",
        "Per-stage processing latency in milliseconds",
        &["stage"],
        vec![0.05, 0.1, 0.5, 1.0, 2.0, 5.0, 10.0, 20.0, 50.0, 100.0]
    )
    .unwrap()
});

/// Feed status per symbol (0 = healthy, 1 = stale, 2 = dead).
pub static FEED_STATUS: Lazy<IntGaugeVec> = Lazy::new(|| {
    register_int_gauge_vec!(
        "marketpipe_feed_status",
        "Feed status per symbol (0=healthy, 1=stale, 2=dead)",
        &["symbol"]
    )
    .unwrap()
});

/// Alerts raised, by kind.
pub static ALERTS_TOTAL: Lazy<IntCounterVec> = Lazy::new(|| {
    register_int_counter_vec!(
        "marketpipe_alerts_total",
        "Alerts raised by the health monitor",
        &["kind"]
    )
    .unwrap()
});

/// Metrics facade. Stages record through these helpers so metric names
/// and label sets stay in one place.
pub struct Metrics;

impl Metrics {
    pub fn tick_received() {
        TICKS_RECEIVED_TOTAL.inc();
    }

    pub fn tick_processed() {
        TICKS_PROCESSED_TOTAL.inc();
    }

    pub fn tick_dropped(stage: &str) {
        TICKS_DROPPED_TOTAL.with_label_values(&[stage]).inc();
    }

    pub fn tick_rejected(reason: &str) {
        TICKS_REJECTED_TOTAL.with_label_values(&[reason]).inc();
    }

    pub fn tick_duplicate() {
        TICKS_DUPLICATE_TOTAL.inc();
    }

    pub fn tick_out_of_order() {
        TICKS_OUT_OF_ORDER_TOTAL.inc();
    }

    pub fn candle_generated(timeframe: &str) {
        CANDLES_GENERATED_TOTAL
            .with_label_values(&[timeframe])
            .inc();
    }

    pub fn candle_dropped() {
        CANDLES_DROPPED_TOTAL.inc();
    }

    pub fn quote_distributed() {
        QUOTES_DISTRIBUTED_TOTAL.inc();
    }

    pub fn publish_error(kind: &str) {
        PUBLISH_ERRORS_TOTAL.with_label_values(&[kind]).inc();
    }

    pub fn storage_error(op: &str) {
        STORAGE_ERRORS_TOTAL.with_label_values(&[op]).inc();
    }

    pub fn stale_feed() {
        STALE_FEEDS_TOTAL.inc();
    }

    pub fn feed_recovered() {
        FEED_RECOVERIES_TOTAL.inc();
    }

    pub fn abnormal_spike() {
        ABNORMAL_SPIKES_TOTAL.inc();
    }

    pub fn stage_latency(stage: &str, latency_ms: f64) {
        STAGE_LATENCY_MS
            .with_label_values(&[stage])
            .observe(latency_ms);
    }

    pub fn feed_status(symbol: &str, status: i64) {
        FEED_STATUS.with_label_values(&[symbol]).set(status);
    }

    pub fn alert(kind: &str) {
        ALERTS_TOTAL.with_label_values(&[kind]).inc();
    }
}
