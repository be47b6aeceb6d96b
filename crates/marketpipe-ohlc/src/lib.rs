//! Real-time OHLC aggregation for marketpipe.
//!
//! Maintains one active candle per (symbol, timeframe) pair, closes
//! completed candles reactively on boundary crossing and proactively
//! via a periodic sweep, and emits closed candles downstream.

pub mod config;
pub mod engine;
pub mod error;

pub use config::OhlcConfig;
pub use engine::OhlcEngine;
pub use error::{OhlcError, OhlcResult};
