//! OHLC engine configuration.

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OhlcConfig {
    /// Capacity of the candle emission queue. Default: 1,000.
    #[serde(default = "default_candle_buffer_size")]
    pub candle_buffer_size: usize,
    /// Cadence of the proactive close sweep. Default: 1,000ms.
    #[serde(default = "default_sweep_interval_ms")]
    pub sweep_interval_ms: u64,
}

fn default_candle_buffer_size() -> usize {
    1_000
}

fn default_sweep_interval_ms() -> u64 {
    1_000
}

impl Default for OhlcConfig {
    fn default() -> Self {
        Self {
            candle_buffer_size: default_candle_buffer_size(),
            sweep_interval_ms: default_sweep_interval_ms(),
        }
    }
}
