//! Tick types.
//!
//! `RawTick` is untrusted source input; `NormalizedTick` is the
//! canonical internal representation produced exactly once per
//! accepted raw tick and immutable afterwards.

use crate::error::{CoreError, Result};
use chrono::{DateTime, NaiveDateTime, Utc};
use serde::{Deserialize, Serialize};

/// Integer timestamps above this magnitude are epoch milliseconds.
const MILLIS_THRESHOLD: i64 = 1_000_000_000_000;

/// Source-supplied timestamp in one of several representations.
///
/// Resolved exactly once at the ingestion boundary into a canonical
/// `DateTime<Utc>`; nothing downstream sees the raw shape.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(from = "StampRepr")]
pub enum TickStamp {
    /// Epoch seconds.
    Seconds(i64),
    /// Epoch milliseconds.
    Millis(i64),
    /// ISO-8601 / RFC3339 string, or `YYYY-MM-DD HH:MM:SS` (UTC assumed).
    Text(String),
}

/// Wire shapes a timestamp may arrive in.
#[derive(Deserialize)]
#[serde(untagged)]
enum StampRepr {
    Int(i64),
    Float(f64),
    Text(String),
}

impl From<StampRepr> for TickStamp {
    fn from(repr: StampRepr) -> Self {
        match repr {
            StampRepr::Int(v) => TickStamp::from_unix(v),
            StampRepr::Float(v) => TickStamp::from_unix(v as i64),
            StampRepr::Text(s) => TickStamp::Text(s),
        }
    }
}

impl TickStamp {
    /// Classify a bare integer timestamp by magnitude.
    pub fn from_unix(value: i64) -> Self {
        if value.abs() > MILLIS_THRESHOLD {
            TickStamp::Millis(value)
        } else {
            TickStamp::Seconds(value)
        }
    }

    /// Resolve into a canonical UTC time.
    pub fn resolve(&self) -> Result<DateTime<Utc>> {
        match self {
            TickStamp::Seconds(v) => {
                DateTime::from_timestamp(*v, 0).ok_or(CoreError::TimestampOutOfRange(*v))
            }
            TickStamp::Millis(v) => {
                DateTime::from_timestamp_millis(*v).ok_or(CoreError::TimestampOutOfRange(*v))
            }
            TickStamp::Text(s) => parse_text_timestamp(s),
        }
    }
}

impl From<DateTime<Utc>> for TickStamp {
    fn from(ts: DateTime<Utc>) -> Self {
        TickStamp::Millis(ts.timestamp_millis())
    }
}

fn parse_text_timestamp(s: &str) -> Result<DateTime<Utc>> {
    // RFC3339 covers the common ISO-8601 shapes, with or without
    // fractional seconds.
    if let Ok(ts) = DateTime::parse_from_rfc3339(s) {
        return Ok(ts.with_timezone(&Utc));
    }

    // Space-separated variant without zone, UTC assumed.
    if let Ok(naive) = NaiveDateTime::parse_from_str(s, "%Y-%m-%d %H:%M:%S") {
        return Ok(naive.and_utc());
    }

    Err(CoreError::InvalidTimestamp(s.to_string()))
}

/// Unnormalized tick as delivered by a liquidity-provider adapter.
///
/// No invariants hold yet; every field is validated by the ingester.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RawTick {
    /// Source feed name (e.g. "OANDA", "Binance").
    pub source: String,
    pub symbol: String,
    pub bid: f64,
    pub ask: f64,
    pub timestamp: TickStamp,
    /// Original payload kept for diagnostics.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub raw_data: Option<serde_json::Value>,
}

impl RawTick {
    pub fn new(
        source: impl Into<String>,
        symbol: impl Into<String>,
        bid: f64,
        ask: f64,
        timestamp: impl Into<TickStamp>,
    ) -> Self {
        Self {
            source: source.into(),
            symbol: symbol.into(),
            bid,
            ask,
            timestamp: timestamp.into(),
            raw_data: None,
        }
    }
}

/// Canonical tick format used by every stage downstream of the ingester.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NormalizedTick {
    pub symbol: String,
    pub bid: f64,
    pub ask: f64,
    /// ask - bid, non-negative after validation.
    pub spread: f64,
    pub timestamp: DateTime<Utc>,
    pub source: String,
    /// Content-derived short id used for deduplication.
    pub tick_id: String,
    /// Time the pipeline accepted the tick.
    pub received_at: DateTime<Utc>,
}

impl NormalizedTick {
    /// Mid-price used for OHLC aggregation.
    pub fn mid(&self) -> f64 {
        (self.bid + self.ask) / 2.0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn unix_seconds_resolve() {
        let ts = TickStamp::from_unix(1_704_110_096);
        assert_eq!(ts, TickStamp::Seconds(1_704_110_096));
        let resolved = ts.resolve().unwrap();
        assert_eq!(resolved.timestamp(), 1_704_110_096);
    }

    #[test]
    fn unix_millis_disambiguated_by_magnitude() {
        let ts = TickStamp::from_unix(1_704_110_096_000);
        assert_eq!(ts, TickStamp::Millis(1_704_110_096_000));
        let resolved = ts.resolve().unwrap();
        assert_eq!(resolved.timestamp(), 1_704_110_096);
    }

    #[test]
    fn rfc3339_text_resolves() {
        let ts = TickStamp::Text("2024-01-01T12:34:56Z".to_string());
        let resolved = ts.resolve().unwrap();
        assert_eq!(resolved.timestamp(), 1_704_112_496);
    }

    #[test]
    fn fractional_seconds_text_resolves() {
        let ts = TickStamp::Text("2024-01-01T12:34:56.500Z".to_string());
        let resolved = ts.resolve().unwrap();
        assert_eq!(resolved.timestamp_subsec_millis(), 500);
    }

    #[test]
    fn space_separated_text_resolves_as_utc() {
        let ts = TickStamp::Text("2024-01-01 12:34:56".to_string());
        let resolved = ts.resolve().unwrap();
        assert_eq!(resolved.timestamp(), 1_704_112_496);
    }

    #[test]
    fn garbage_text_rejected() {
        let ts = TickStamp::Text("yesterday-ish".to_string());
        assert!(matches!(ts.resolve(), Err(CoreError::InvalidTimestamp(_))));
    }

    #[test]
    fn mid_price() {
        let tick = NormalizedTick {
            symbol: "EURUSD".into(),
            bid: 1.0,
            ask: 1.2,
            spread: 0.2,
            timestamp: Utc::now(),
            source: "test".into(),
            tick_id: "abc".into(),
            received_at: Utc::now(),
        };
        assert!((tick.mid() - 1.1).abs() < 1e-12);
    }
}
