//! Pipeline assembly and lifecycle.

use crate::config::{PipelineConfig, StoreBackend};
use crate::error::{PipelineError, PipelineResult};
use chrono::{Duration, Utc};
use marketpipe_core::{Candle, NormalizedTick, RawTick};
use marketpipe_distribute::Distributor;
use marketpipe_ingest::Ingester;
use marketpipe_monitor::{Alert, FeedHealth, HealthMonitor, HealthSummary};
use marketpipe_ohlc::OhlcEngine;
use marketpipe_store::{MemoryStore, Publisher, RedisStore, TickStore};
use marketpipe_telemetry::{DropStage, PipelineStats, StatsSnapshot};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

const CLEANUP_INTERVAL_SECS: u64 = 3_600;

enum StorageItem {
    Tick(NormalizedTick),
    Candle(Candle),
}

/// Owns every pipeline component and the tasks wiring them together.
///
/// Data flows ingester -> OHLC engine -> distributor, with storage fed
/// from a separate bounded queue so a slow backend sheds writes instead
/// of stalling the hot path.
pub struct Pipeline {
    config: PipelineConfig,
    stats: Arc<PipelineStats>,
    ingester: Arc<Ingester>,
    engine: Arc<OhlcEngine>,
    distributor: Arc<Distributor>,
    monitor: Arc<HealthMonitor>,
    store: Arc<dyn TickStore>,
    storage_tx: mpsc::Sender<StorageItem>,
    storage_rx: Arc<tokio::sync::Mutex<mpsc::Receiver<StorageItem>>>,
    cancel: CancellationToken,
    running: AtomicBool,
}

impl Pipeline {
    /// Build the pipeline against the configured storage backend.
    ///
    /// A failed storage ping is the only fatal startup condition; every
    /// later storage failure is counted and shed.
    pub async fn connect(config: PipelineConfig) -> PipelineResult<Self> {
        let (store, publisher): (Arc<dyn TickStore>, Arc<dyn Publisher>) = match config.backend {
            StoreBackend::Redis => {
                let store = Arc::new(RedisStore::connect(config.store.clone()).await?);
                (store.clone(), store)
            }
            StoreBackend::Memory => {
                let store = Arc::new(MemoryStore::new());
                (store.clone(), store)
            }
        };
        Self::with_store(config, store, publisher).await
    }

    /// Build against explicit storage and fanout implementations.
    pub async fn with_store(
        config: PipelineConfig,
        store: Arc<dyn TickStore>,
        publisher: Arc<dyn Publisher>,
    ) -> PipelineResult<Self> {
        store.ping().await?;

        let stats = Arc::new(PipelineStats::new());
        let ingester = Arc::new(Ingester::new(config.ingest.clone(), stats.clone()));
        let engine = Arc::new(OhlcEngine::new(config.ohlc.clone(), stats.clone()));
        let distributor = Arc::new(Distributor::new(
            config.distribute.clone(),
            stats.clone(),
            publisher,
        ));
        let monitor = Arc::new(HealthMonitor::new(config.monitor.clone(), stats.clone()));
        let (storage_tx, storage_rx) = mpsc::channel(config.storage_buffer_size);

        Ok(Self {
            config,
            stats,
            ingester,
            engine,
            distributor,
            monitor,
            store,
            storage_tx,
            storage_rx: Arc::new(tokio::sync::Mutex::new(storage_rx)),
            cancel: CancellationToken::new(),
            running: AtomicBool::new(false),
        })
    }

    /// Start every component and the wiring tasks between them.
    /// Starting twice is an error; nothing is re-spawned.
    pub fn start(self: &Arc<Self>) -> PipelineResult<()> {
        if self.running.swap(true, Ordering::AcqRel) {
            return Err(PipelineError::AlreadyRunning);
        }
        self.ingester.spawn(&self.cancel);
        self.engine.spawn(&self.cancel);
        self.distributor.spawn(&self.cancel);
        self.monitor.spawn(&self.cancel);

        self.spawn_tick_wiring()?;
        self.spawn_candle_wiring()?;
        for worker in 0..self.config.storage_worker_count {
            self.spawn_storage_worker(worker);
        }
        self.spawn_cleanup();

        info!("Pipeline started");
        Ok(())
    }

    /// Hand a raw source tick to the ingester. Never blocks; rejected
    /// unless the pipeline is running.
    pub fn submit(&self, raw: RawTick) -> PipelineResult<()> {
        if !self.running.load(Ordering::Acquire) {
            return Err(PipelineError::NotRunning);
        }
        self.ingester.submit(raw)?;
        Ok(())
    }

    /// Cancel all tasks, then give in-flight work a grace period.
    /// New submissions are rejected from the moment stop begins.
    pub async fn stop(&self) {
        info!("Stopping pipeline");
        self.running.store(false, Ordering::Release);
        self.cancel.cancel();
        tokio::time::sleep(std::time::Duration::from_millis(self.config.shutdown_grace_ms)).await;

        let snap = self.stats.snapshot();
        info!(
            ticks_processed = snap.ticks_processed,
            ticks_dropped = snap.ticks_dropped,
            candles_generated = snap.candles_generated,
            quotes_distributed = snap.quotes_distributed,
            "Pipeline stopped"
        );
    }

    fn spawn_tick_wiring(self: &Arc<Self>) -> PipelineResult<()> {
        let mut rx = self.ingester.take_output()?;
        let this = Arc::clone(self);
        tokio::spawn(async move {
            loop {
                let tick = tokio::select! {
                    _ = this.cancel.cancelled() => return,
                    tick = rx.recv() => match tick {
                        Some(tick) => tick,
                        None => return,
                    },
                };
                this.monitor.record_tick(&tick);
                this.monitor.detect_abnormal_spike(&tick);
                this.engine.process_tick(&tick);
                // Fanout and storage failures are counted at the site.
                let _ = this.distributor.submit_tick(tick.clone());
                if this.storage_tx.try_send(StorageItem::Tick(tick)).is_err() {
                    this.stats.tick_dropped(DropStage::Storage);
                }
            }
        });
        Ok(())
    }

    fn spawn_candle_wiring(self: &Arc<Self>) -> PipelineResult<()> {
        let mut rx = self.engine.take_output()?;
        let this = Arc::clone(self);
        tokio::spawn(async move {
            loop {
                let candle = tokio::select! {
                    _ = this.cancel.cancelled() => return,
                    candle = rx.recv() => match candle {
                        Some(candle) => candle,
                        None => return,
                    },
                };
                let _ = this.distributor.submit_candle(candle.clone());
                if this
                    .storage_tx
                    .try_send(StorageItem::Candle(candle))
                    .is_err()
                {
                    this.stats.candle_dropped();
                }
            }
        });
        Ok(())
    }

    fn spawn_storage_worker(self: &Arc<Self>, worker: usize) {
        let this = Arc::clone(self);
        tokio::spawn(async move {
            debug!(worker, "Storage worker started");
            loop {
                let item = {
                    let mut rx = this.storage_rx.lock().await;
                    tokio::select! {
                        _ = this.cancel.cancelled() => return,
                        item = rx.recv() => match item {
                            Some(item) => item,
                            None => return,
                        },
                    }
                };
                match item {
                    StorageItem::Tick(tick) => {
                        if let Err(err) = this.store.store_tick(&tick).await {
                            warn!(error = %err, symbol = %tick.symbol, "Tick write failed");
                            this.stats.storage_error("tick");
                        }
                    }
                    StorageItem::Candle(candle) => {
                        if let Err(err) = this.store.store_candle(&candle).await {
                            warn!(error = %err, symbol = %candle.symbol, "Candle write failed");
                            this.stats.storage_error("candle");
                        }
                    }
                }
            }
        });
    }

    fn spawn_cleanup(self: &Arc<Self>) {
        let this = Arc::clone(self);
        tokio::spawn(async move {
            let mut timer =
                tokio::time::interval(std::time::Duration::from_secs(CLEANUP_INTERVAL_SECS));
            // The first tick fires immediately; skip it.
            timer.tick().await;
            loop {
                tokio::select! {
                    _ = this.cancel.cancelled() => return,
                    _ = timer.tick() => {
                        let horizon =
                            Utc::now() - Duration::days(this.config.store.warm_retention_days as i64);
                        match this.store.cleanup_old_data(horizon).await {
                            Ok(removed) => debug!(removed, "Retention cleanup done"),
                            Err(err) => {
                                warn!(error = %err, "Retention cleanup failed");
                                this.stats.storage_error("cleanup");
                            }
                        }
                    }
                }
            }
        });
    }

    pub fn stats(&self) -> StatsSnapshot {
        self.stats.snapshot()
    }

    pub fn health(&self) -> HealthSummary {
        self.monitor.health_summary()
    }

    pub fn feed_health(&self) -> Vec<FeedHealth> {
        self.monitor.feed_health()
    }

    pub fn alerts(&self, limit: usize) -> Vec<Alert> {
        self.monitor.alerts(limit)
    }

    /// Partial candles currently being built for a symbol.
    pub fn active_candles(&self, symbol: &str) -> Vec<Candle> {
        self.engine.active_candles(symbol)
    }

    pub fn distributor(&self) -> &Arc<Distributor> {
        &self.distributor
    }

    pub fn store(&self) -> &Arc<dyn TickStore> {
        &self.store
    }
}
