//! OHLC candle type.

use crate::timeframe::Timeframe;
use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};

/// One OHLC bar for a (symbol, timeframe, open-time) triple.
///
/// Updated in place while active; once closed it is never reopened or
/// mutated, a new open-time candle is created instead.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Candle {
    pub symbol: String,
    pub timeframe: Timeframe,
    /// Aligned to an exact multiple of the timeframe duration.
    pub open_time: DateTime<Utc>,
    pub close_time: DateTime<Utc>,
    pub open: f64,
    pub high: f64,
    pub low: f64,
    pub close: f64,
    /// Spread-derived volume proxy, accumulated per tick.
    pub volume: i64,
    pub tick_count: u64,
    pub closed: bool,
}

impl Candle {
    /// Create an empty candle for the window containing `ts`.
    pub fn open_at(symbol: impl Into<String>, timeframe: Timeframe, ts: DateTime<Utc>) -> Self {
        let open_time = timeframe.align(ts);
        Self {
            symbol: symbol.into(),
            timeframe,
            open_time,
            close_time: open_time + Duration::seconds(timeframe.secs()),
            open: 0.0,
            high: 0.0,
            low: 0.0,
            close: 0.0,
            volume: 0,
            tick_count: 0,
            closed: false,
        }
    }

    /// Fold one observation into the bar.
    pub fn apply(&mut self, price: f64, spread: f64) {
        if self.open == 0.0 {
            self.open = price;
        }
        if price > self.high || self.high == 0.0 {
            self.high = price;
        }
        if price < self.low || self.low == 0.0 {
            self.low = price;
        }
        self.close = price;
        self.volume += (spread * 100_000.0) as i64;
        self.tick_count += 1;
    }

    /// End of the window this candle covers.
    pub fn window_end(&self) -> DateTime<Utc> {
        self.open_time + Duration::seconds(self.timeframe.secs())
    }

    /// True once the window end has passed.
    pub fn is_expired(&self, now: DateTime<Utc>) -> bool {
        now > self.window_end()
    }

    /// Seal the bar. The emitted close time is the last second covered
    /// by the window, not the open of the next one.
    pub fn seal(&mut self) {
        self.closed = true;
        self.close_time = self.window_end() - Duration::seconds(1);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn at(s: &str) -> DateTime<Utc> {
        DateTime::parse_from_rfc3339(s).unwrap().with_timezone(&Utc)
    }

    #[test]
    fn open_time_is_aligned() {
        let c = Candle::open_at("EURUSD", Timeframe::M5, at("2024-01-01T12:34:56Z"));
        assert_eq!(c.open_time, at("2024-01-01T12:30:00Z"));
        assert_eq!(c.open_time.timestamp() % Timeframe::M5.secs(), 0);
    }

    #[test]
    fn ohlc_invariants_hold_under_updates() {
        let mut c = Candle::open_at("EURUSD", Timeframe::M1, at("2024-01-01T12:34:00Z"));
        for price in [1.10, 1.15, 1.05, 1.12] {
            c.apply(price, 0.0002);
        }
        assert_eq!(c.open, 1.10);
        assert_eq!(c.high, 1.15);
        assert_eq!(c.low, 1.05);
        assert_eq!(c.close, 1.12);
        assert_eq!(c.tick_count, 4);
        assert!(c.high >= c.open && c.high >= c.close && c.high >= c.low);
        assert!(c.low <= c.open && c.low <= c.close);
    }

    #[test]
    fn volume_accumulates_from_spread() {
        let mut c = Candle::open_at("EURUSD", Timeframe::M1, at("2024-01-01T12:34:00Z"));
        c.apply(1.1, 0.0002);
        c.apply(1.1, 0.0002);
        assert_eq!(c.volume, 40);
    }

    #[test]
    fn expiry_and_seal() {
        let mut c = Candle::open_at("EURUSD", Timeframe::M1, at("2024-01-01T12:34:10Z"));
        assert!(!c.is_expired(at("2024-01-01T12:34:59Z")));
        assert!(c.is_expired(at("2024-01-01T12:35:01Z")));
        c.seal();
        assert!(c.closed);
        assert_eq!(c.close_time, at("2024-01-01T12:34:59Z"));
    }
}
