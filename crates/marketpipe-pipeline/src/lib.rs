//! Pipeline orchestration for marketpipe.
//!
//! Wires the ingester, OHLC engine, distributor, health monitor, and
//! storage backend together behind bounded queues, and owns startup,
//! shutdown, and the top-level configuration surface.

pub mod config;
pub mod error;
pub mod pipeline;

pub use config::{PipelineConfig, StoreBackend};
pub use error::{PipelineError, PipelineResult};
pub use pipeline::Pipeline;
