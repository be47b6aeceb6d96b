//! Health monitor configuration.

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MonitorConfig {
    /// Cadence of the liveness sweep. Default: 10s.
    #[serde(default = "default_check_interval_secs")]
    pub check_interval_secs: u64,
    /// Silence before a feed is flagged stale. Default: 10s.
    #[serde(default = "default_stale_threshold_secs")]
    pub stale_threshold_secs: i64,
    /// Relative price move treated as an abnormal spike. Default: 0.10.
    #[serde(default = "default_price_sanity_threshold")]
    pub price_sanity_threshold: f64,
    /// Alerts kept in the in-memory ring. Default: 1,000.
    #[serde(default = "default_alert_capacity")]
    pub alert_capacity: usize,
}

fn default_check_interval_secs() -> u64 {
    10
}

fn default_stale_threshold_secs() -> i64 {
    10
}

fn default_price_sanity_threshold() -> f64 {
    0.10
}

fn default_alert_capacity() -> usize {
    1_000
}

impl Default for MonitorConfig {
    fn default() -> Self {
        Self {
            check_interval_secs: default_check_interval_secs(),
            stale_threshold_secs: default_stale_threshold_secs(),
            price_sanity_threshold: default_price_sanity_threshold(),
            alert_capacity: default_alert_capacity(),
        }
    }
}
