//! Core domain types for marketpipe.
//!
//! Defines the tick and candle model shared by every pipeline stage:
//! raw source ticks, the canonical normalized tick, timeframes with
//! UTC boundary alignment, and OHLC candles.

pub mod candle;
pub mod error;
pub mod timeframe;
pub mod types;

pub use candle::Candle;
pub use error::{CoreError, Result};
pub use timeframe::Timeframe;
pub use types::{NormalizedTick, RawTick, TickStamp};
