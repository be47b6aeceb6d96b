//! Real-time quote and candle fanout for marketpipe.
//!
//! Takes normalized ticks and closed candles off bounded queues and
//! publishes them to broadcast and per-symbol channels, with per-symbol
//! price throttling and per-client token-bucket rate limiting.

pub mod config;
pub mod distributor;
pub mod error;
pub mod rate_limit;

pub use config::DistributeConfig;
pub use distributor::{
    candle_channel, quote_channel, Distributor, CANDLES_CHANNEL, QUOTES_CHANNEL,
};
pub use error::{DistributeError, DistributeResult};
pub use rate_limit::TokenBucket;
