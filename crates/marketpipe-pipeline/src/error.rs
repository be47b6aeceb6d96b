//! Pipeline orchestration errors.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum PipelineError {
    #[error("Pipeline already running")]
    AlreadyRunning,

    #[error("Pipeline is not running")]
    NotRunning,

    #[error("Failed to read config file: {0}")]
    ConfigRead(#[from] std::io::Error),

    #[error("Failed to parse config file: {0}")]
    ConfigParse(#[from] toml::de::Error),

    #[error("Storage error: {0}")]
    Store(#[from] marketpipe_store::StoreError),

    #[error("Ingest error: {0}")]
    Ingest(#[from] marketpipe_ingest::IngestError),

    #[error("OHLC error: {0}")]
    Ohlc(#[from] marketpipe_ohlc::OhlcError),
}

pub type PipelineResult<T> = Result<T, PipelineError>;
