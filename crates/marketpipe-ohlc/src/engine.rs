//! The OHLC aggregation engine.

use crate::config::OhlcConfig;
use crate::error::{OhlcError, OhlcResult};
use chrono::{DateTime, Utc};
use marketpipe_core::{Candle, NormalizedTick, Timeframe};
use marketpipe_telemetry::PipelineStats;
use parking_lot::RwLock;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Instant;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
struct CandleKey {
    symbol: String,
    timeframe: Timeframe,
}

/// Aggregates normalized ticks into candles across all timeframes.
///
/// The active-candle index is guarded by a single RwLock; emission
/// happens after the lock is released so no lock is held across a
/// channel send.
pub struct OhlcEngine {
    config: OhlcConfig,
    stats: Arc<PipelineStats>,
    active: RwLock<HashMap<CandleKey, Candle>>,
    out_tx: mpsc::Sender<Candle>,
    out_rx: parking_lot::Mutex<Option<mpsc::Receiver<Candle>>>,
}

impl OhlcEngine {
    pub fn new(config: OhlcConfig, stats: Arc<PipelineStats>) -> Self {
        let (out_tx, out_rx) = mpsc::channel(config.candle_buffer_size);
        Self {
            config,
            stats,
            active: RwLock::new(HashMap::new()),
            out_tx,
            out_rx: parking_lot::Mutex::new(Some(out_rx)),
        }
    }

    /// Take the closed-candle stream. Can be taken exactly once.
    pub fn take_output(&self) -> OhlcResult<mpsc::Receiver<Candle>> {
        self.out_rx.lock().take().ok_or(OhlcError::OutputTaken)
    }

    /// Spawn the proactive close sweep so low-activity symbols still
    /// produce timely closes.
    pub fn spawn(self: &Arc<Self>, cancel: &CancellationToken) {
        let this = Arc::clone(self);
        let cancel = cancel.clone();
        let interval = std::time::Duration::from_millis(self.config.sweep_interval_ms);
        tokio::spawn(async move {
            let mut timer = tokio::time::interval(interval);
            loop {
                tokio::select! {
                    _ = cancel.cancelled() => return,
                    _ = timer.tick() => this.close_expired_at(Utc::now()),
                }
            }
        });
        info!(timeframes = Timeframe::ALL.len(), "OHLC engine started");
    }

    /// Fold one tick into the active candle of every timeframe.
    ///
    /// A tick landing in a new window closes and emits the previous
    /// candle for that (symbol, timeframe) before opening the new one.
    pub fn process_tick(&self, tick: &NormalizedTick) {
        let started = Instant::now();
        let price = tick.mid();

        let mut closed = Vec::new();
        {
            let mut active = self.active.write();
            for timeframe in Timeframe::ALL {
                let key = CandleKey {
                    symbol: tick.symbol.clone(),
                    timeframe,
                };
                let open_time = timeframe.align(tick.timestamp);

                let same_window = active
                    .get(&key)
                    .map(|candle| candle.open_time == open_time)
                    .unwrap_or(false);

                if same_window {
                    if let Some(candle) = active.get_mut(&key) {
                        candle.apply(price, tick.spread);
                    }
                } else {
                    let mut fresh = Candle::open_at(&tick.symbol, timeframe, tick.timestamp);
                    fresh.apply(price, tick.spread);
                    if let Some(mut previous) = active.insert(key, fresh) {
                        previous.seal();
                        closed.push(previous);
                    }
                }
            }
        }

        for candle in closed {
            self.emit(candle);
        }

        self.stats
            .ohlc_latency(started.elapsed().as_secs_f64() * 1_000.0);
    }

    /// Close every active candle whose window has ended.
    ///
    /// Called by the sweep; exposed with an injected clock so the
    /// sweep contract is testable without timers.
    pub fn close_expired_at(&self, now: DateTime<Utc>) {
        let mut closed = Vec::new();
        {
            let mut active = self.active.write();
            let expired: Vec<CandleKey> = active
                .iter()
                .filter(|(_, candle)| candle.is_expired(now))
                .map(|(key, _)| key.clone())
                .collect();
            for key in expired {
                if let Some(mut candle) = active.remove(&key) {
                    candle.seal();
                    closed.push(candle);
                }
            }
        }

        for candle in closed {
            self.emit(candle);
        }
    }

    /// Replay historical ticks through the standard update rule to
    /// reconstruct candles after a gap.
    pub fn backfill(&self, ticks: &[NormalizedTick]) {
        info!(count = ticks.len(), "Backfilling candles from ticks");
        for tick in ticks {
            self.process_tick(tick);
        }
    }

    /// Defensive copy of the active candle, if any.
    pub fn active_candle(&self, symbol: &str, timeframe: Timeframe) -> Option<Candle> {
        let key = CandleKey {
            symbol: symbol.to_string(),
            timeframe,
        };
        self.active.read().get(&key).cloned()
    }

    /// Defensive copies of all active candles for a symbol.
    pub fn active_candles(&self, symbol: &str) -> Vec<Candle> {
        self.active
            .read()
            .iter()
            .filter(|(key, _)| key.symbol == symbol)
            .map(|(_, candle)| candle.clone())
            .collect()
    }

    /// Queue failure drops the candle; the index has already advanced,
    /// so subsequent aggregation is unaffected, only history has a gap.
    fn emit(&self, candle: Candle) {
        let timeframe = candle.timeframe;
        match self.out_tx.try_send(candle) {
            Ok(()) => self.stats.candle_generated(&timeframe.to_string()),
            Err(_) => {
                warn!(%timeframe, "Candle buffer full, dropping closed candle");
                self.stats.candle_dropped();
            }
        }
    }
}
