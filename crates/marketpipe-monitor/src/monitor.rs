//! Feed liveness tracking and alerting.

use crate::alert::{Alert, AlertKind, AlertLevel};
use crate::config::MonitorConfig;
use chrono::{DateTime, Utc};
use dashmap::DashMap;
use marketpipe_core::NormalizedTick;
use marketpipe_telemetry::{Metrics, PipelineStats};
use parking_lot::Mutex;
use serde::Serialize;
use serde_json::json;
use std::collections::VecDeque;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

/// A feed is dead after this many stale thresholds of silence.
const DEAD_MULTIPLIER: i64 = 5;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum FeedStatus {
    Healthy,
    Stale,
    Dead,
}

impl FeedStatus {
    pub const fn as_str(self) -> &'static str {
        match self {
            FeedStatus::Healthy => "healthy",
            FeedStatus::Stale => "stale",
            FeedStatus::Dead => "dead",
        }
    }

    const fn gauge(self) -> i64 {
        match self {
            FeedStatus::Healthy => 0,
            FeedStatus::Stale => 1,
            FeedStatus::Dead => 2,
        }
    }
}

#[derive(Debug)]
struct FeedState {
    status: FeedStatus,
    last_tick_at: DateTime<Utc>,
    ticks_seen: u64,
    last_bid: f64,
}

/// Per-symbol health view.
#[derive(Debug, Clone, Serialize)]
pub struct FeedHealth {
    pub symbol: String,
    pub status: FeedStatus,
    pub last_tick_at: DateTime<Utc>,
    pub ticks_seen: u64,
}

/// Aggregate health of the pipeline's feeds.
#[derive(Debug, Clone, Serialize)]
pub struct HealthSummary {
    pub status: &'static str,
    pub feeds_total: usize,
    pub feeds_healthy: usize,
    pub feeds_stale: usize,
    pub feeds_dead: usize,
}

/// Watches feed liveness and price sanity.
///
/// Tick recording only updates timestamps and counters; all status
/// transitions happen in the sweep, so there is a single writer for
/// feed status and transitions cannot race.
pub struct HealthMonitor {
    config: MonitorConfig,
    stats: Arc<PipelineStats>,
    feeds: DashMap<String, FeedState>,
    alerts: Mutex<VecDeque<Alert>>,
}

impl HealthMonitor {
    pub fn new(config: MonitorConfig, stats: Arc<PipelineStats>) -> Self {
        Self {
            config,
            stats,
            feeds: DashMap::new(),
            alerts: Mutex::new(VecDeque::new()),
        }
    }

    pub fn spawn(self: &Arc<Self>, cancel: &CancellationToken) {
        let this = Arc::clone(self);
        let cancel = cancel.clone();
        let interval = std::time::Duration::from_secs(this.config.check_interval_secs);
        tokio::spawn(async move {
            let mut timer = tokio::time::interval(interval);
            loop {
                tokio::select! {
                    _ = cancel.cancelled() => return,
                    _ = timer.tick() => this.sweep_at(Utc::now()),
                }
            }
        });
        info!(
            check_interval_secs = self.config.check_interval_secs,
            "Health monitor started"
        );
    }

    /// Note a tick arrival for its symbol's feed.
    pub fn record_tick(&self, tick: &NormalizedTick) {
        self.record_tick_at(tick, Utc::now());
    }

    pub fn record_tick_at(&self, tick: &NormalizedTick, now: DateTime<Utc>) {
        match self.feeds.get_mut(&tick.symbol) {
            Some(mut feed) => {
                feed.last_tick_at = now;
                feed.ticks_seen += 1;
            }
            None => {
                self.feeds.insert(
                    tick.symbol.clone(),
                    FeedState {
                        status: FeedStatus::Healthy,
                        last_tick_at: now,
                        ticks_seen: 1,
                        last_bid: 0.0,
                    },
                );
                Metrics::feed_status(&tick.symbol, FeedStatus::Healthy.gauge());
            }
        }
    }

    /// Flag a bid that jumped more than the sanity threshold against
    /// the previous bid for the symbol. Advisory; the tick still flows.
    ///
    /// Raises the alert only. The `abnormal_spikes_detected` counter is
    /// owned by the ingester's sanity check, which sees the same
    /// baseline, so one spike event is counted exactly once.
    pub fn detect_abnormal_spike(&self, tick: &NormalizedTick) -> bool {
        let mut feed = match self.feeds.get_mut(&tick.symbol) {
            Some(feed) => feed,
            None => return false,
        };
        let previous = feed.last_bid;
        feed.last_bid = tick.bid;
        drop(feed);

        if previous <= 0.0 {
            return false;
        }
        let change = (tick.bid - previous).abs() / previous;
        if change <= self.config.price_sanity_threshold {
            return false;
        }

        warn!(
            symbol = %tick.symbol,
            previous,
            current = tick.bid,
            change = format!("{:.2}%", change * 100.0),
            "Abnormal price spike"
        );
        self.push_alert(Alert {
            timestamp: Utc::now(),
            level: AlertLevel::Warning,
            kind: AlertKind::AbnormalSpike,
            symbol: tick.symbol.clone(),
            message: format!(
                "{} bid moved {:.2}% in one tick",
                tick.symbol,
                change * 100.0
            ),
            details: json!({ "previous_bid": previous, "current_bid": tick.bid }),
        });
        true
    }

    /// Evaluate every feed's liveness against `now`.
    ///
    /// Sole writer of feed status. Feeds go stale after the configured
    /// silence, dead after five times that, and recover on the first
    /// sweep after ticks resume.
    pub fn sweep_at(&self, now: DateTime<Utc>) {
        let stale_after = self.config.stale_threshold_secs;
        let dead_after = stale_after * DEAD_MULTIPLIER;
        let mut alerts = Vec::new();

        for mut entry in self.feeds.iter_mut() {
            let symbol = entry.key().clone();
            let feed = entry.value_mut();
            let silent_secs = (now - feed.last_tick_at).num_seconds();

            let next = if silent_secs > dead_after {
                FeedStatus::Dead
            } else if silent_secs > stale_after {
                FeedStatus::Stale
            } else {
                FeedStatus::Healthy
            };
            if next == feed.status {
                continue;
            }

            match next {
                FeedStatus::Stale => {
                    warn!(%symbol, silent_secs, "Feed went stale");
                    self.stats.stale_feed_detected();
                    alerts.push(Alert {
                        timestamp: now,
                        level: AlertLevel::Warning,
                        kind: AlertKind::StaleFeed,
                        symbol: symbol.clone(),
                        message: format!("{symbol} silent for {silent_secs}s"),
                        details: json!({ "silent_secs": silent_secs }),
                    });
                }
                FeedStatus::Dead => {
                    warn!(%symbol, silent_secs, "Feed declared dead");
                    alerts.push(Alert {
                        timestamp: now,
                        level: AlertLevel::Critical,
                        kind: AlertKind::DeadFeed,
                        symbol: symbol.clone(),
                        message: format!("{symbol} silent for {silent_secs}s, feed dead"),
                        details: json!({ "silent_secs": silent_secs }),
                    });
                }
                FeedStatus::Healthy => {
                    info!(%symbol, "Feed recovered");
                    Metrics::feed_recovered();
                    alerts.push(Alert {
                        timestamp: now,
                        level: AlertLevel::Info,
                        kind: AlertKind::FeedRecovered,
                        symbol: symbol.clone(),
                        message: format!("{symbol} receiving ticks again"),
                        details: json!({ "was": feed.status.as_str() }),
                    });
                }
            }
            feed.status = next;
            Metrics::feed_status(&symbol, next.gauge());
        }

        for alert in alerts {
            self.push_alert(alert);
        }
    }

    fn push_alert(&self, alert: Alert) {
        Metrics::alert(alert.kind.as_str());
        let mut ring = self.alerts.lock();
        ring.push_back(alert);
        while ring.len() > self.config.alert_capacity {
            ring.pop_front();
        }
    }

    /// Most recent alerts, newest first, at most `limit`.
    pub fn alerts(&self, limit: usize) -> Vec<Alert> {
        self.alerts.lock().iter().rev().take(limit).cloned().collect()
    }

    pub fn feed(&self, symbol: &str) -> Option<FeedHealth> {
        self.feeds.get(symbol).map(|feed| FeedHealth {
            symbol: symbol.to_string(),
            status: feed.status,
            last_tick_at: feed.last_tick_at,
            ticks_seen: feed.ticks_seen,
        })
    }

    pub fn feed_health(&self) -> Vec<FeedHealth> {
        self.feeds
            .iter()
            .map(|entry| FeedHealth {
                symbol: entry.key().clone(),
                status: entry.status,
                last_tick_at: entry.last_tick_at,
                ticks_seen: entry.ticks_seen,
            })
            .collect()
    }

    /// Overall classification: any dead feed is critical, any stale
    /// feed degraded, otherwise healthy.
    pub fn health_summary(&self) -> HealthSummary {
        let mut healthy = 0;
        let mut stale = 0;
        let mut dead = 0;
        for entry in self.feeds.iter() {
            match entry.status {
                FeedStatus::Healthy => healthy += 1,
                FeedStatus::Stale => stale += 1,
                FeedStatus::Dead => dead += 1,
            }
        }
        let status = if dead > 0 {
            "critical"
        } else if stale > 0 {
            "degraded"
        } else {
            "healthy"
        };
        HealthSummary {
            status,
            feeds_total: healthy + stale + dead,
            feeds_healthy: healthy,
            feeds_stale: stale,
            feeds_dead: dead,
        }
    }
}
