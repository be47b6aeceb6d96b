//! Tick ingestion for marketpipe.
//!
//! Normalizes raw source ticks into the canonical internal format,
//! validates prices and timestamps, suppresses duplicates, flags
//! out-of-order and abnormal-spike ticks, and exposes the normalized
//! stream consumed by the rest of the pipeline.

pub mod config;
pub mod error;
pub mod ingester;
pub mod normalize;

pub use config::IngestConfig;
pub use error::{IngestError, IngestResult};
pub use ingester::Ingester;
pub use normalize::{normalize, RejectReason};
