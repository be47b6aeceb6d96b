//! Ingester configuration.

use serde::{Deserialize, Serialize};

/// Ingestion tuning knobs. All fields default to the production values.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IngestConfig {
    /// Worker tasks pulling from the raw queue. Default: 4.
    #[serde(default = "default_worker_count")]
    pub worker_count: usize,
    /// Capacity of the raw and normalized queues. Default: 10,000.
    #[serde(default = "default_tick_buffer_size")]
    pub tick_buffer_size: usize,
    /// Suppress duplicate ticks seen within the dedup window. Default: true.
    #[serde(default = "default_true")]
    pub enable_deduplication: bool,
    /// Flag ticks older than the last accepted per-symbol timestamp. Default: true.
    #[serde(default = "default_true")]
    pub enable_out_of_order_check: bool,
    /// Reject ticks older than this. Default: 60s.
    #[serde(default = "default_max_tick_age_secs")]
    pub max_tick_age_secs: i64,
    /// Relative bid change treated as an abnormal spike. Default: 0.10 (10%).
    #[serde(default = "default_price_sanity_threshold")]
    pub price_sanity_threshold: f64,
}

fn default_worker_count() -> usize {
    4
}

fn default_tick_buffer_size() -> usize {
    10_000
}

fn default_true() -> bool {
    true
}

fn default_max_tick_age_secs() -> i64 {
    60
}

fn default_price_sanity_threshold() -> f64 {
    0.10
}

impl Default for IngestConfig {
    fn default() -> Self {
        Self {
            worker_count: default_worker_count(),
            tick_buffer_size: default_tick_buffer_size(),
            enable_deduplication: true,
            enable_out_of_order_check: true,
            max_tick_age_secs: default_max_tick_age_secs(),
            price_sanity_threshold: default_price_sanity_threshold(),
        }
    }
}
