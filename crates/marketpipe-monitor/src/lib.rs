//! Feed health monitoring for marketpipe.
//!
//! Tracks per-symbol feed liveness, flags stale and dead feeds, detects
//! abnormal price spikes, and keeps a bounded ring of recent alerts.

pub mod alert;
pub mod config;
pub mod monitor;

pub use alert::{Alert, AlertKind, AlertLevel};
pub use config::MonitorConfig;
pub use monitor::{FeedHealth, FeedStatus, HealthMonitor, HealthSummary};
