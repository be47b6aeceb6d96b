//! Storage and pub/sub abstractions for marketpipe.
//!
//! The pipeline talks to persistence through the [`TickStore`] trait
//! and to fanout through [`Publisher`]. [`RedisStore`] implements both
//! against Redis; [`MemoryStore`] is an in-process implementation used
//! by tests and for running without external infrastructure.

pub mod error;
pub mod memory;
pub mod redis_store;

pub use error::{StoreError, StoreResult};
pub use memory::MemoryStore;
pub use redis_store::{RedisStore, StoreConfig};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use marketpipe_core::{Candle, NormalizedTick, Timeframe};

/// Persistence contract for ticks and candles.
///
/// All range reads return ascending by timestamp. Implementations are
/// expected to bound hot storage themselves; callers never trim.
#[async_trait]
pub trait TickStore: Send + Sync {
    /// Connectivity probe. The only storage failure treated as fatal
    /// at startup.
    async fn ping(&self) -> StoreResult<()>;

    async fn store_tick(&self, tick: &NormalizedTick) -> StoreResult<()>;

    async fn store_candle(&self, candle: &Candle) -> StoreResult<()>;

    async fn get_latest_tick(&self, symbol: &str) -> StoreResult<Option<NormalizedTick>>;

    /// Most recent ticks for a symbol, ascending, at most `limit`.
    async fn get_recent_ticks(&self, symbol: &str, limit: usize)
        -> StoreResult<Vec<NormalizedTick>>;

    /// Most recent candles for a symbol and timeframe, ascending, at
    /// most `limit`.
    async fn get_candles(
        &self,
        symbol: &str,
        timeframe: Timeframe,
        limit: usize,
    ) -> StoreResult<Vec<Candle>>;

    /// Candles whose open time falls in `[from, to]`, ascending.
    async fn get_candles_between(
        &self,
        symbol: &str,
        timeframe: Timeframe,
        from: DateTime<Utc>,
        to: DateTime<Utc>,
    ) -> StoreResult<Vec<Candle>>;

    /// Remove tick history older than the retention horizon. Returns
    /// the number of entries removed.
    async fn cleanup_old_data(&self, older_than: DateTime<Utc>) -> StoreResult<u64>;
}

/// Fanout contract for distributing quotes and candles to subscribers.
#[async_trait]
pub trait Publisher: Send + Sync {
    async fn publish(&self, channel: &str, payload: &str) -> StoreResult<()>;
}
