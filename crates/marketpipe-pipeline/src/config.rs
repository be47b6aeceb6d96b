//! Top-level pipeline configuration.
//!
//! Loaded from a TOML file, every section and field optional with
//! production defaults. `MARKETPIPE_CONFIG` overrides the path.

use crate::error::PipelineResult;
use marketpipe_distribute::DistributeConfig;
use marketpipe_ingest::IngestConfig;
use marketpipe_monitor::MonitorConfig;
use marketpipe_ohlc::OhlcConfig;
use marketpipe_store::StoreConfig;
use serde::{Deserialize, Serialize};
use std::path::Path;
use tracing::info;

pub const CONFIG_ENV_VAR: &str = "MARKETPIPE_CONFIG";
pub const DEFAULT_CONFIG_PATH: &str = "marketpipe.toml";

/// Which storage backend the pipeline persists to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum StoreBackend {
    #[default]
    Redis,
    Memory,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PipelineConfig {
    #[serde(default)]
    pub backend: StoreBackend,
    /// Capacity of the storage write queue. Default: 5,000.
    #[serde(default = "default_storage_buffer_size")]
    pub storage_buffer_size: usize,
    /// Storage writer tasks. Default: 2.
    #[serde(default = "default_storage_worker_count")]
    pub storage_worker_count: usize,
    /// Time allowed for in-flight work to drain on shutdown.
    #[serde(default = "default_shutdown_grace_ms")]
    pub shutdown_grace_ms: u64,
    /// Base log level, overridable via `RUST_LOG`.
    #[serde(default = "default_log_level")]
    pub log_level: String,
    #[serde(default)]
    pub ingest: IngestConfig,
    #[serde(default)]
    pub ohlc: OhlcConfig,
    #[serde(default)]
    pub distribute: DistributeConfig,
    #[serde(default)]
    pub monitor: MonitorConfig,
    #[serde(default)]
    pub store: StoreConfig,
}

fn default_storage_buffer_size() -> usize {
    5_000
}

fn default_storage_worker_count() -> usize {
    2
}

fn default_shutdown_grace_ms() -> u64 {
    500
}

fn default_log_level() -> String {
    "info".to_string()
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            backend: StoreBackend::default(),
            storage_buffer_size: default_storage_buffer_size(),
            storage_worker_count: default_storage_worker_count(),
            shutdown_grace_ms: default_shutdown_grace_ms(),
            log_level: default_log_level(),
            ingest: IngestConfig::default(),
            ohlc: OhlcConfig::default(),
            distribute: DistributeConfig::default(),
            monitor: MonitorConfig::default(),
            store: StoreConfig::default(),
        }
    }
}

impl PipelineConfig {
    pub fn from_file(path: impl AsRef<Path>) -> PipelineResult<Self> {
        let raw = std::fs::read_to_string(path.as_ref())?;
        let config = toml::from_str(&raw)?;
        info!(path = %path.as_ref().display(), "Loaded config");
        Ok(config)
    }

    /// Load from `MARKETPIPE_CONFIG`, the default path, or fall back to
    /// defaults when no config file exists.
    pub fn load() -> PipelineResult<Self> {
        let path =
            std::env::var(CONFIG_ENV_VAR).unwrap_or_else(|_| DEFAULT_CONFIG_PATH.to_string());
        if Path::new(&path).exists() {
            Self::from_file(&path)
        } else {
            info!(%path, "No config file found, using defaults");
            Ok(Self::default())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_toml_yields_defaults() {
        let config: PipelineConfig = toml::from_str("").unwrap();
        assert_eq!(config.backend, StoreBackend::Redis);
        assert_eq!(config.storage_buffer_size, 5_000);
        assert_eq!(config.ingest.worker_count, 4);
        assert_eq!(config.ohlc.candle_buffer_size, 1_000);
        assert_eq!(config.monitor.stale_threshold_secs, 10);
    }

    #[test]
    fn partial_sections_keep_remaining_defaults() {
        let config: PipelineConfig = toml::from_str(
            r#"
            backend = "memory"

            [ingest]
            worker_count = 8

            [store]
            url = "redis://redis.internal:6379"
            "#,
        )
        .unwrap();

        assert_eq!(config.backend, StoreBackend::Memory);
        assert_eq!(config.ingest.worker_count, 8);
        assert_eq!(config.ingest.tick_buffer_size, 10_000);
        assert_eq!(config.store.url, "redis://redis.internal:6379");
        assert_eq!(config.store.hot_tick_retention, 1_000);
    }
}
