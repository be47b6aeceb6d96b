//! In-process storage backend.
//!
//! Mirrors the Redis backend's retention behavior with bounded rings,
//! and records published messages so tests can assert on fanout.

use crate::error::StoreResult;
use crate::{Publisher, TickStore};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use marketpipe_core::{Candle, NormalizedTick, Timeframe};
use parking_lot::Mutex;
use std::collections::{HashMap, VecDeque};

const DEFAULT_TICK_CAPACITY: usize = 1_000;
const DEFAULT_CANDLE_CAPACITY: usize = 500;

#[derive(Default)]
struct Inner {
    ticks: HashMap<String, VecDeque<NormalizedTick>>,
    candles: HashMap<(String, Timeframe), VecDeque<Candle>>,
    published: Vec<(String, String)>,
}

/// Memory-backed [`TickStore`] and [`Publisher`].
pub struct MemoryStore {
    inner: Mutex<Inner>,
    tick_capacity: usize,
    candle_capacity: usize,
}

impl Default for MemoryStore {
    fn default() -> Self {
        Self::new()
    }
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::with_capacity(DEFAULT_TICK_CAPACITY, DEFAULT_CANDLE_CAPACITY)
    }

    pub fn with_capacity(tick_capacity: usize, candle_capacity: usize) -> Self {
        Self {
            inner: Mutex::new(Inner::default()),
            tick_capacity,
            candle_capacity,
        }
    }

    /// Messages published so far, in order. Test hook.
    pub fn published_messages(&self) -> Vec<(String, String)> {
        self.inner.lock().published.clone()
    }

    /// Messages published to one channel. Test hook.
    pub fn published_on(&self, channel: &str) -> Vec<String> {
        self.inner
            .lock()
            .published
            .iter()
            .filter(|(ch, _)| ch == channel)
            .map(|(_, payload)| payload.clone())
            .collect()
    }
}

#[async_trait]
impl TickStore for MemoryStore {
    async fn ping(&self) -> StoreResult<()> {
        Ok(())
    }

    async fn store_tick(&self, tick: &NormalizedTick) -> StoreResult<()> {
        let mut inner = self.inner.lock();
        let ring = inner.ticks.entry(tick.symbol.clone()).or_default();
        ring.push_back(tick.clone());
        while ring.len() > self.tick_capacity {
            ring.pop_front();
        }
        Ok(())
    }

    async fn store_candle(&self, candle: &Candle) -> StoreResult<()> {
        let mut inner = self.inner.lock();
        let ring = inner
            .candles
            .entry((candle.symbol.clone(), candle.timeframe))
            .or_default();
        // A closed candle supersedes a partial one for the same window.
        ring.retain(|c| c.open_time != candle.open_time);
        ring.push_back(candle.clone());
        while ring.len() > self.candle_capacity {
            ring.pop_front();
        }
        Ok(())
    }

    async fn get_latest_tick(&self, symbol: &str) -> StoreResult<Option<NormalizedTick>> {
        let inner = self.inner.lock();
        Ok(inner
            .ticks
            .get(symbol)
            .and_then(|ring| ring.back())
            .cloned())
    }

    async fn get_recent_ticks(
        &self,
        symbol: &str,
        limit: usize,
    ) -> StoreResult<Vec<NormalizedTick>> {
        let inner = self.inner.lock();
        let ring = match inner.ticks.get(symbol) {
            Some(ring) => ring,
            None => return Ok(Vec::new()),
        };
        let skip = ring.len().saturating_sub(limit);
        Ok(ring.iter().skip(skip).cloned().collect())
    }

    async fn get_candles(
        &self,
        symbol: &str,
        timeframe: Timeframe,
        limit: usize,
    ) -> StoreResult<Vec<Candle>> {
        let inner = self.inner.lock();
        let ring = match inner.candles.get(&(symbol.to_string(), timeframe)) {
            Some(ring) => ring,
            None => return Ok(Vec::new()),
        };
        let skip = ring.len().saturating_sub(limit);
        Ok(ring.iter().skip(skip).cloned().collect())
    }

    async fn get_candles_between(
        &self,
        symbol: &str,
        timeframe: Timeframe,
        from: DateTime<Utc>,
        to: DateTime<Utc>,
    ) -> StoreResult<Vec<Candle>> {
        let inner = self.inner.lock();
        let ring = match inner.candles.get(&(symbol.to_string(), timeframe)) {
            Some(ring) => ring,
            None => return Ok(Vec::new()),
        };
        Ok(ring
            .iter()
            .filter(|c| c.open_time >= from && c.open_time <= to)
            .cloned()
            .collect())
    }

    async fn cleanup_old_data(&self, older_than: DateTime<Utc>) -> StoreResult<u64> {
        let mut inner = self.inner.lock();
        let mut removed = 0u64;
        for ring in inner.ticks.values_mut() {
            let before = ring.len();
            ring.retain(|t| t.timestamp >= older_than);
            removed += (before - ring.len()) as u64;
        }
        Ok(removed)
    }
}

#[async_trait]
impl Publisher for MemoryStore {
    async fn publish(&self, channel: &str, payload: &str) -> StoreResult<()> {
        self.inner
            .lock()
            .published
            .push((channel.to_string(), payload.to_string()));
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn at(s: &str) -> DateTime<Utc> {
        DateTime::parse_from_rfc3339(s).unwrap().with_timezone(&Utc)
    }

    fn tick_at(ts: DateTime<Utc>) -> NormalizedTick {
        NormalizedTick {
            symbol: "EURUSD".into(),
            bid: 1.0999,
            ask: 1.1001,
            spread: 0.0002,
            timestamp: ts,
            source: "test".into(),
            tick_id: format!("{}", ts.timestamp_millis()),
            received_at: ts,
        }
    }

    #[tokio::test]
    async fn tick_ring_is_bounded_and_ascending() {
        let store = MemoryStore::with_capacity(3, 10);
        let base = at("2024-01-01T12:00:00Z");
        for i in 0..5 {
            store
                .store_tick(&tick_at(base + chrono::Duration::seconds(i)))
                .await
                .unwrap();
        }

        let ticks = store.get_recent_ticks("EURUSD", 10).await.unwrap();
        assert_eq!(ticks.len(), 3);
        assert!(ticks.windows(2).all(|w| w[0].timestamp <= w[1].timestamp));

        let latest = store.get_latest_tick("EURUSD").await.unwrap().unwrap();
        assert_eq!(latest.timestamp, base + chrono::Duration::seconds(4));
    }

    #[tokio::test]
    async fn zero_limit_reads_are_empty() {
        let store = MemoryStore::new();
        store.store_tick(&tick_at(at("2024-01-01T12:00:00Z"))).await.unwrap();
        let mut candle = Candle::open_at("EURUSD", Timeframe::M1, at("2024-01-01T12:00:00Z"));
        candle.apply(1.1, 0.0002);
        store.store_candle(&candle).await.unwrap();

        assert!(store.get_recent_ticks("EURUSD", 0).await.unwrap().is_empty());
        assert!(store
            .get_candles("EURUSD", Timeframe::M1, 0)
            .await
            .unwrap()
            .is_empty());
    }

    #[tokio::test]
    async fn closed_candle_supersedes_partial_window() {
        let store = MemoryStore::new();
        let mut candle = Candle::open_at("EURUSD", Timeframe::M1, at("2024-01-01T12:00:00Z"));
        candle.apply(1.1, 0.0002);
        store.store_candle(&candle).await.unwrap();

        candle.apply(1.2, 0.0002);
        candle.seal();
        store.store_candle(&candle).await.unwrap();

        let candles = store.get_candles("EURUSD", Timeframe::M1, 10).await.unwrap();
        assert_eq!(candles.len(), 1);
        assert!(candles[0].closed);
        assert_eq!(candles[0].tick_count, 2);
    }

    #[tokio::test]
    async fn candles_between_filters_by_open_time() {
        let store = MemoryStore::new();
        for minute in 0..5 {
            let ts = at("2024-01-01T12:00:00Z") + chrono::Duration::minutes(minute);
            let mut candle = Candle::open_at("EURUSD", Timeframe::M1, ts);
            candle.apply(1.1, 0.0002);
            store.store_candle(&candle).await.unwrap();
        }

        let slice = store
            .get_candles_between(
                "EURUSD",
                Timeframe::M1,
                at("2024-01-01T12:01:00Z"),
                at("2024-01-01T12:03:00Z"),
            )
            .await
            .unwrap();
        assert_eq!(slice.len(), 3);
    }

    #[tokio::test]
    async fn cleanup_removes_older_ticks() {
        let store = MemoryStore::new();
        let base = at("2024-01-01T12:00:00Z");
        for i in 0..4 {
            store
                .store_tick(&tick_at(base + chrono::Duration::minutes(i)))
                .await
                .unwrap();
        }

        let removed = store
            .cleanup_old_data(base + chrono::Duration::minutes(2))
            .await
            .unwrap();
        assert_eq!(removed, 2);
        assert_eq!(store.get_recent_ticks("EURUSD", 10).await.unwrap().len(), 2);
    }

    #[tokio::test]
    async fn publish_records_messages() {
        let store = MemoryStore::new();
        store.publish("quotes", "{}").await.unwrap();
        store.publish("quotes:EURUSD", "{}").await.unwrap();

        assert_eq!(store.published_messages().len(), 2);
        assert_eq!(store.published_on("quotes").len(), 1);
    }
}
