//! Statistics, Prometheus metrics and structured logging for marketpipe.
//!
//! - `PipelineStats`: process-wide counters shared by every stage,
//!   implemented as independent atomics so unrelated stages never
//!   contend on one lock
//! - Prometheus metric statics with a `Metrics` facade
//! - Structured JSON logging with tracing

pub mod error;
pub mod logging;
pub mod metrics;
pub mod stats;

pub use error::{TelemetryError, TelemetryResult};
pub use logging::init_logging;
pub use metrics::Metrics;
pub use stats::{DropStage, PipelineStats, StatsSnapshot};
