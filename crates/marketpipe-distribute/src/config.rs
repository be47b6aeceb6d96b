//! Distributor configuration.

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DistributeConfig {
    /// Capacity of the quote fanout queue. Default: 5,000.
    #[serde(default = "default_quote_buffer_size")]
    pub quote_buffer_size: usize,
    /// Capacity of the candle fanout queue. Default: 1,000.
    #[serde(default = "default_candle_buffer_size")]
    pub candle_buffer_size: usize,
    /// Fanout workers per stream. Default: 2.
    #[serde(default = "default_worker_count")]
    pub worker_count: usize,
    /// Skip publishing quotes whose bid barely moved. Default: true.
    #[serde(default = "default_enable_throttling")]
    pub enable_throttling: bool,
    /// Minimum relative bid change that defeats throttling.
    #[serde(default = "default_min_price_change")]
    pub min_price_change: f64,
    /// Token bucket capacity per client. Default: 100.
    #[serde(default = "default_rate_limit_capacity")]
    pub rate_limit_capacity: f64,
    /// Token refill per client per second. Default: 100.
    #[serde(default = "default_rate_limit_refill_per_sec")]
    pub rate_limit_refill_per_sec: f64,
}

fn default_quote_buffer_size() -> usize {
    5_000
}

fn default_candle_buffer_size() -> usize {
    1_000
}

fn default_worker_count() -> usize {
    2
}

fn default_enable_throttling() -> bool {
    true
}

fn default_min_price_change() -> f64 {
    1e-5
}

fn default_rate_limit_capacity() -> f64 {
    100.0
}

fn default_rate_limit_refill_per_sec() -> f64 {
    100.0
}

impl Default for DistributeConfig {
    fn default() -> Self {
        Self {
            quote_buffer_size: default_quote_buffer_size(),
            candle_buffer_size: default_candle_buffer_size(),
            worker_count: default_worker_count(),
            enable_throttling: default_enable_throttling(),
            min_price_change: default_min_price_change(),
            rate_limit_capacity: default_rate_limit_capacity(),
            rate_limit_refill_per_sec: default_rate_limit_refill_per_sec(),
        }
    }
}
