//! Redis-backed tick and candle storage.
//!
//! Hot tick history lives in sorted sets scored by timestamp, trimmed
//! on every write so the hot window stays bounded. Candle history gets
//! a rolling expiry so warm data ages out without an external job.

use crate::error::StoreResult;
use crate::{Publisher, TickStore};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use marketpipe_core::{Candle, NormalizedTick, Timeframe};
use redis::AsyncCommands;
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

/// Latest-tick keys expire after an hour of feed silence.
const LATEST_TICK_TTL_SECS: u64 = 3_600;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StoreConfig {
    /// Redis connection URL.
    #[serde(default = "default_url")]
    pub url: String,
    /// Ticks kept per symbol in the hot window. Default: 1,000.
    #[serde(default = "default_hot_retention")]
    pub hot_tick_retention: usize,
    /// Candles kept per (symbol, timeframe). Default: 500.
    #[serde(default = "default_candle_retention")]
    pub candle_retention: usize,
    /// Days before candle history expires. Default: 30.
    #[serde(default = "default_warm_retention_days")]
    pub warm_retention_days: u64,
}

fn default_url() -> String {
    "redis://127.0.0.1:6379".to_string()
}

fn default_hot_retention() -> usize {
    1_000
}

fn default_candle_retention() -> usize {
    500
}

fn default_warm_retention_days() -> u64 {
    30
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            url: default_url(),
            hot_tick_retention: default_hot_retention(),
            candle_retention: default_candle_retention(),
            warm_retention_days: default_warm_retention_days(),
        }
    }
}

/// Redis implementation of [`TickStore`] and [`Publisher`].
///
/// Uses a multiplexed connection, so clones share one TCP stream and
/// the store can be handed to several writer tasks cheaply.
#[derive(Clone)]
pub struct RedisStore {
    conn: redis::aio::MultiplexedConnection,
    config: StoreConfig,
}

impl RedisStore {
    pub async fn connect(config: StoreConfig) -> StoreResult<Self> {
        let client = redis::Client::open(config.url.as_str())?;
        let conn = client.get_multiplexed_async_connection().await?;
        info!(url = %config.url, "Connected to Redis");
        Ok(Self { conn, config })
    }

    fn ticks_key(symbol: &str) -> String {
        format!("ticks:{symbol}")
    }

    fn latest_tick_key(symbol: &str) -> String {
        format!("tick:latest:{symbol}")
    }

    fn candles_key(symbol: &str, timeframe: Timeframe) -> String {
        format!("candles:{symbol}:{timeframe}")
    }
}

#[async_trait]
impl TickStore for RedisStore {
    async fn ping(&self) -> StoreResult<()> {
        let mut conn = self.conn.clone();
        let _: String = redis::cmd("PING").query_async(&mut conn).await?;
        Ok(())
    }

    async fn store_tick(&self, tick: &NormalizedTick) -> StoreResult<()> {
        let mut conn = self.conn.clone();
        let key = Self::ticks_key(&tick.symbol);
        let payload = serde_json::to_string(tick)?;
        let score = tick.timestamp.timestamp_millis();

        let _: () = conn.zadd(&key, &payload, score).await?;
        // Keep only the newest hot_tick_retention entries.
        let cutoff = -(self.config.hot_tick_retention as isize) - 1;
        let _: () = conn.zremrangebyrank(&key, 0, cutoff).await?;
        let _: () = conn
            .set_ex(
                Self::latest_tick_key(&tick.symbol),
                &payload,
                LATEST_TICK_TTL_SECS,
            )
            .await?;
        Ok(())
    }

    async fn store_candle(&self, candle: &Candle) -> StoreResult<()> {
        let mut conn = self.conn.clone();
        let key = Self::candles_key(&candle.symbol, candle.timeframe);
        let payload = serde_json::to_string(candle)?;
        let score = candle.open_time.timestamp();

        // Re-adding the same open time replaces the member only if the
        // payload is identical, so remove the window's entry first and
        // the closed candle supersedes any partial one.
        let _: () = conn.zrembyscore(&key, score, score).await?;
        let _: () = conn.zadd(&key, &payload, score).await?;
        let cutoff = -(self.config.candle_retention as isize) - 1;
        let _: () = conn.zremrangebyrank(&key, 0, cutoff).await?;
        let _: () = conn
            .expire(&key, (self.config.warm_retention_days * 86_400) as i64)
            .await?;
        Ok(())
    }

    async fn get_latest_tick(&self, symbol: &str) -> StoreResult<Option<NormalizedTick>> {
        let mut conn = self.conn.clone();
        let payload: Option<String> = conn.get(Self::latest_tick_key(symbol)).await?;
        match payload {
            Some(json) => Ok(Some(serde_json::from_str(&json)?)),
            None => Ok(None),
        }
    }

    async fn get_recent_ticks(
        &self,
        symbol: &str,
        limit: usize,
    ) -> StoreResult<Vec<NormalizedTick>> {
        // -0 is 0, which zrange reads as "from the start".
        if limit == 0 {
            return Ok(Vec::new());
        }
        let mut conn = self.conn.clone();
        let raw: Vec<String> = conn
            .zrange(Self::ticks_key(symbol), -(limit as isize), -1)
            .await?;
        let mut ticks = Vec::with_capacity(raw.len());
        for json in raw {
            ticks.push(serde_json::from_str(&json)?);
        }
        Ok(ticks)
    }

    async fn get_candles(
        &self,
        symbol: &str,
        timeframe: Timeframe,
        limit: usize,
    ) -> StoreResult<Vec<Candle>> {
        if limit == 0 {
            return Ok(Vec::new());
        }
        let mut conn = self.conn.clone();
        let raw: Vec<String> = conn
            .zrange(Self::candles_key(symbol, timeframe), -(limit as isize), -1)
            .await?;
        let mut candles = Vec::with_capacity(raw.len());
        for json in raw {
            candles.push(serde_json::from_str(&json)?);
        }
        Ok(candles)
    }

    async fn get_candles_between(
        &self,
        symbol: &str,
        timeframe: Timeframe,
        from: DateTime<Utc>,
        to: DateTime<Utc>,
    ) -> StoreResult<Vec<Candle>> {
        let mut conn = self.conn.clone();
        let raw: Vec<String> = conn
            .zrangebyscore(
                Self::candles_key(symbol, timeframe),
                from.timestamp(),
                to.timestamp(),
            )
            .await?;
        let mut candles = Vec::with_capacity(raw.len());
        for json in raw {
            candles.push(serde_json::from_str(&json)?);
        }
        Ok(candles)
    }

    async fn cleanup_old_data(&self, older_than: DateTime<Utc>) -> StoreResult<u64> {
        let mut conn = self.conn.clone();
        let keys: Vec<String> = {
            let mut iter = conn.scan_match::<_, String>("ticks:*").await?;
            let mut keys = Vec::new();
            while let Some(key) = iter.next_item().await {
                keys.push(key);
            }
            keys
        };

        let cutoff = older_than.timestamp_millis();
        let mut removed = 0u64;
        for key in keys {
            let n: u64 = conn.zrembyscore(&key, "-inf", cutoff).await?;
            removed += n;
        }
        debug!(removed, "Cleaned up expired tick history");
        Ok(removed)
    }
}

#[async_trait]
impl Publisher for RedisStore {
    async fn publish(&self, channel: &str, payload: &str) -> StoreResult<()> {
        let mut conn = self.conn.clone();
        let _: () = conn.publish(channel, payload).await?;
        Ok(())
    }
}
