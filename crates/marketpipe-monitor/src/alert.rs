//! Alert types.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AlertLevel {
    Info,
    Warning,
    Critical,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AlertKind {
    StaleFeed,
    DeadFeed,
    FeedRecovered,
    AbnormalSpike,
}

impl AlertKind {
    pub const fn as_str(self) -> &'static str {
        match self {
            AlertKind::StaleFeed => "stale_feed",
            AlertKind::DeadFeed => "dead_feed",
            AlertKind::FeedRecovered => "feed_recovered",
            AlertKind::AbnormalSpike => "abnormal_spike",
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Alert {
    pub timestamp: DateTime<Utc>,
    pub level: AlertLevel,
    pub kind: AlertKind,
    pub symbol: String,
    pub message: String,
    /// Structured context, alert-kind specific.
    pub details: serde_json::Value,
}
