//! Quote and candle fanout.

use crate::config::DistributeConfig;
use crate::error::{DistributeError, DistributeResult};
use crate::rate_limit::TokenBucket;
use dashmap::DashMap;
use marketpipe_core::{Candle, NormalizedTick};
use marketpipe_store::Publisher;
use marketpipe_telemetry::{DropStage, PipelineStats};
use parking_lot::RwLock;
use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use std::time::Instant;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

/// Broadcast channel carrying every quote.
pub const QUOTES_CHANNEL: &str = "quotes";
/// Broadcast channel carrying every closed candle.
pub const CANDLES_CHANNEL: &str = "candles";

pub fn quote_channel(symbol: &str) -> String {
    format!("quotes:{symbol}")
}

pub fn candle_channel(candle: &Candle) -> String {
    format!("candles:{}:{}", candle.symbol, candle.timeframe)
}

/// Fans quotes and candles out to pub/sub channels.
///
/// Quotes and candles arrive on separate bounded queues so a candle
/// burst never starves quote delivery. Subscription bookkeeping and
/// per-client rate limits live here; the transport is behind
/// [`Publisher`].
pub struct Distributor {
    config: DistributeConfig,
    stats: Arc<PipelineStats>,
    publisher: Arc<dyn Publisher>,
    tick_tx: mpsc::Sender<NormalizedTick>,
    tick_rx: Arc<tokio::sync::Mutex<mpsc::Receiver<NormalizedTick>>>,
    candle_tx: mpsc::Sender<Candle>,
    candle_rx: Arc<tokio::sync::Mutex<mpsc::Receiver<Candle>>>,
    /// Last published bid per symbol, for throttling.
    last_sent: DashMap<String, f64>,
    /// client id -> subscribed channels.
    subscriptions: RwLock<HashMap<String, HashSet<String>>>,
    limiters: DashMap<String, Arc<TokenBucket>>,
}

impl Distributor {
    pub fn new(
        config: DistributeConfig,
        stats: Arc<PipelineStats>,
        publisher: Arc<dyn Publisher>,
    ) -> Self {
        let (tick_tx, tick_rx) = mpsc::channel(config.quote_buffer_size);
        let (candle_tx, candle_rx) = mpsc::channel(config.candle_buffer_size);
        Self {
            config,
            stats,
            publisher,
            tick_tx,
            tick_rx: Arc::new(tokio::sync::Mutex::new(tick_rx)),
            candle_tx,
            candle_rx: Arc::new(tokio::sync::Mutex::new(candle_rx)),
            last_sent: DashMap::new(),
            subscriptions: RwLock::new(HashMap::new()),
            limiters: DashMap::new(),
        }
    }

    /// Queue a quote for fanout. Never blocks; a full queue drops the
    /// quote and counts it.
    pub fn submit_tick(&self, tick: NormalizedTick) -> DistributeResult<()> {
        match self.tick_tx.try_send(tick) {
            Ok(()) => Ok(()),
            Err(_) => {
                self.stats.tick_dropped(DropStage::Distribution);
                Err(DistributeError::BufferFull)
            }
        }
    }

    /// Queue a closed candle for fanout.
    pub fn submit_candle(&self, candle: Candle) -> DistributeResult<()> {
        match self.candle_tx.try_send(candle) {
            Ok(()) => Ok(()),
            Err(_) => {
                self.stats.candle_dropped();
                Err(DistributeError::BufferFull)
            }
        }
    }

    pub fn spawn(self: &Arc<Self>, cancel: &CancellationToken) {
        for worker in 0..self.config.worker_count {
            let this = Arc::clone(self);
            let cancel = cancel.clone();
            tokio::spawn(async move { this.tick_worker_loop(worker, cancel).await });
        }
        {
            let this = Arc::clone(self);
            let cancel = cancel.clone();
            tokio::spawn(async move { this.candle_worker_loop(cancel).await });
        }
        info!(workers = self.config.worker_count, "Distributor started");
    }

    async fn tick_worker_loop(&self, worker: usize, cancel: CancellationToken) {
        debug!(worker, "Distribution worker started");
        loop {
            let tick = {
                let mut rx = self.tick_rx.lock().await;
                tokio::select! {
                    _ = cancel.cancelled() => return,
                    tick = rx.recv() => match tick {
                        Some(tick) => tick,
                        None => return,
                    },
                }
            };
            self.distribute_tick(&tick).await;
        }
    }

    async fn candle_worker_loop(&self, cancel: CancellationToken) {
        loop {
            let candle = {
                let mut rx = self.candle_rx.lock().await;
                tokio::select! {
                    _ = cancel.cancelled() => return,
                    candle = rx.recv() => match candle {
                        Some(candle) => candle,
                        None => return,
                    },
                }
            };
            self.distribute_candle(&candle).await;
        }
    }

    /// Publish one quote to the broadcast and per-symbol channels,
    /// unless throttled.
    async fn distribute_tick(&self, tick: &NormalizedTick) {
        if self.config.enable_throttling && self.is_throttled(tick) {
            return;
        }
        let started = Instant::now();

        let payload = match serde_json::to_string(tick) {
            Ok(payload) => payload,
            Err(err) => {
                warn!(error = %err, symbol = %tick.symbol, "Failed to encode quote");
                self.stats.publish_error("encode");
                return;
            }
        };

        let mut ok = true;
        for channel in [QUOTES_CHANNEL.to_string(), quote_channel(&tick.symbol)] {
            if let Err(err) = self.publisher.publish(&channel, &payload).await {
                warn!(error = %err, %channel, "Quote publish failed");
                self.stats.publish_error("transport");
                ok = false;
            }
        }

        if ok {
            self.last_sent.insert(tick.symbol.clone(), tick.bid);
            self.stats
                .quote_distributed(started.elapsed().as_secs_f64() * 1_000.0);
        }
    }

    async fn distribute_candle(&self, candle: &Candle) {
        let payload = match serde_json::to_string(candle) {
            Ok(payload) => payload,
            Err(err) => {
                warn!(error = %err, symbol = %candle.symbol, "Failed to encode candle");
                self.stats.publish_error("encode");
                return;
            }
        };

        for channel in [CANDLES_CHANNEL.to_string(), candle_channel(candle)] {
            if let Err(err) = self.publisher.publish(&channel, &payload).await {
                warn!(error = %err, %channel, "Candle publish failed");
                self.stats.publish_error("transport");
            }
        }
    }

    /// A quote is throttled when the bid moved less than the configured
    /// relative threshold since the last published quote.
    fn is_throttled(&self, tick: &NormalizedTick) -> bool {
        match self.last_sent.get(&tick.symbol) {
            Some(last) if *last != 0.0 => {
                let change = (tick.bid - *last).abs() / *last;
                change < self.config.min_price_change
            }
            _ => false,
        }
    }

    pub fn subscribe(&self, client_id: &str, channel: &str) {
        let mut subs = self.subscriptions.write();
        subs.entry(client_id.to_string())
            .or_default()
            .insert(channel.to_string());
        debug!(client = client_id, channel, "Client subscribed");
    }

    pub fn unsubscribe(&self, client_id: &str, channel: &str) {
        let mut subs = self.subscriptions.write();
        if let Some(channels) = subs.get_mut(client_id) {
            channels.remove(channel);
            if channels.is_empty() {
                subs.remove(client_id);
            }
        }
    }

    /// Drop all state for a client.
    pub fn disconnect(&self, client_id: &str) {
        self.subscriptions.write().remove(client_id);
        self.limiters.remove(client_id);
        debug!(client = client_id, "Client disconnected");
    }

    pub fn is_subscribed(&self, client_id: &str, channel: &str) -> bool {
        self.subscriptions
            .read()
            .get(client_id)
            .map(|channels| channels.contains(channel))
            .unwrap_or(false)
    }

    pub fn client_count(&self) -> usize {
        self.subscriptions.read().len()
    }

    /// Consume one rate-limit token for a client, creating the bucket
    /// on first use.
    pub fn check_rate_limit(&self, client_id: &str) -> bool {
        let bucket = self
            .limiters
            .entry(client_id.to_string())
            .or_insert_with(|| {
                Arc::new(TokenBucket::new(
                    self.config.rate_limit_capacity,
                    self.config.rate_limit_refill_per_sec,
                ))
            })
            .clone();
        bucket.allow()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{DateTime, Utc};
    use marketpipe_core::Timeframe;
    use marketpipe_store::MemoryStore;

    fn at(s: &str) -> DateTime<Utc> {
        DateTime::parse_from_rfc3339(s).unwrap().with_timezone(&Utc)
    }

    fn tick(bid: f64) -> NormalizedTick {
        NormalizedTick {
            symbol: "EURUSD".into(),
            bid,
            ask: bid + 0.0002,
            spread: 0.0002,
            timestamp: at("2024-01-01T12:00:00Z"),
            source: "test".into(),
            tick_id: "t".into(),
            received_at: at("2024-01-01T12:00:00Z"),
        }
    }

    fn setup() -> (Arc<Distributor>, Arc<MemoryStore>) {
        let store = Arc::new(MemoryStore::new());
        let dist = Arc::new(Distributor::new(
            DistributeConfig::default(),
            Arc::new(PipelineStats::new()),
            store.clone(),
        ));
        (dist, store)
    }

    #[tokio::test]
    async fn quote_reaches_broadcast_and_symbol_channels() {
        let (dist, store) = setup();
        dist.distribute_tick(&tick(1.1000)).await;

        assert_eq!(store.published_on("quotes").len(), 1);
        assert_eq!(store.published_on("quotes:EURUSD").len(), 1);
        assert_eq!(dist.stats.snapshot().quotes_distributed, 1);
    }

    #[tokio::test]
    async fn tiny_price_move_is_throttled() {
        let (dist, store) = setup();
        dist.distribute_tick(&tick(1.1000)).await;
        // Relative change ~9e-7, below the 1e-5 threshold.
        dist.distribute_tick(&tick(1.1000001)).await;

        assert_eq!(store.published_on("quotes").len(), 1);

        // A real move goes through.
        dist.distribute_tick(&tick(1.1010)).await;
        assert_eq!(store.published_on("quotes").len(), 2);
    }

    #[tokio::test]
    async fn throttling_can_be_disabled() {
        let store = Arc::new(MemoryStore::new());
        let dist = Distributor::new(
            DistributeConfig {
                enable_throttling: false,
                ..DistributeConfig::default()
            },
            Arc::new(PipelineStats::new()),
            store.clone(),
        );

        dist.distribute_tick(&tick(1.1000)).await;
        dist.distribute_tick(&tick(1.1000001)).await;
        assert_eq!(store.published_on("quotes").len(), 2);
    }

    #[tokio::test]
    async fn candle_reaches_broadcast_and_scoped_channels() {
        let (dist, store) = setup();
        let mut candle = Candle::open_at("EURUSD", Timeframe::M1, at("2024-01-01T12:00:00Z"));
        candle.apply(1.1, 0.0002);
        candle.seal();
        dist.distribute_candle(&candle).await;

        assert_eq!(store.published_on("candles").len(), 1);
        assert_eq!(store.published_on("candles:EURUSD:m1").len(), 1);
    }

    #[tokio::test]
    async fn full_queue_drops_and_counts() {
        let store = Arc::new(MemoryStore::new());
        let stats = Arc::new(PipelineStats::new());
        let dist = Distributor::new(
            DistributeConfig {
                quote_buffer_size: 1,
                ..DistributeConfig::default()
            },
            stats.clone(),
            store,
        );

        assert!(dist.submit_tick(tick(1.1)).is_ok());
        assert!(matches!(
            dist.submit_tick(tick(1.1)),
            Err(DistributeError::BufferFull)
        ));
        assert_eq!(stats.ticks_dropped_count(), 1);
    }

    #[tokio::test]
    async fn subscription_bookkeeping() {
        let (dist, _) = setup();
        dist.subscribe("client-1", "quotes:EURUSD");
        dist.subscribe("client-1", "candles:EURUSD:m1");
        dist.subscribe("client-2", "quotes");

        assert_eq!(dist.client_count(), 2);
        assert!(dist.is_subscribed("client-1", "quotes:EURUSD"));

        dist.unsubscribe("client-1", "quotes:EURUSD");
        assert!(!dist.is_subscribed("client-1", "quotes:EURUSD"));
        assert!(dist.is_subscribed("client-1", "candles:EURUSD:m1"));

        dist.disconnect("client-1");
        assert_eq!(dist.client_count(), 1);
    }

    #[tokio::test]
    async fn rate_limit_is_per_client() {
        let store = Arc::new(MemoryStore::new());
        let dist = Distributor::new(
            DistributeConfig {
                rate_limit_capacity: 2.0,
                rate_limit_refill_per_sec: 0.0,
                ..DistributeConfig::default()
            },
            Arc::new(PipelineStats::new()),
            store,
        );

        assert!(dist.check_rate_limit("client-1"));
        assert!(dist.check_rate_limit("client-1"));
        assert!(!dist.check_rate_limit("client-1"));
        // Fresh client gets a fresh bucket.
        assert!(dist.check_rate_limit("client-2"));
    }
}
