//! Candle timeframes and boundary alignment.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Fixed set of supported aggregation windows.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Timeframe {
    M1,
    M5,
    M15,
    H1,
    H4,
    D1,
}

impl Timeframe {
    /// All supported timeframes, used by the OHLC engine on every tick.
    pub const ALL: [Timeframe; 6] = [
        Timeframe::M1,
        Timeframe::M5,
        Timeframe::M15,
        Timeframe::H1,
        Timeframe::H4,
        Timeframe::D1,
    ];

    /// Window duration in seconds.
    pub const fn secs(self) -> i64 {
        match self {
            Timeframe::M1 => 60,
            Timeframe::M5 => 300,
            Timeframe::M15 => 900,
            Timeframe::H1 => 3_600,
            Timeframe::H4 => 14_400,
            Timeframe::D1 => 86_400,
        }
    }

    /// Align a timestamp to the open of its window.
    ///
    /// `floor(unix / secs) * secs`, UTC. Every candle boundary lands on
    /// an exact clock-aligned multiple regardless of when the first
    /// tick of the window arrives.
    pub fn align(self, ts: DateTime<Utc>) -> DateTime<Utc> {
        let secs = self.secs();
        let aligned = ts.timestamp().div_euclid(secs) * secs;
        DateTime::from_timestamp(aligned, 0).unwrap_or(DateTime::UNIX_EPOCH)
    }
}

impl fmt::Display for Timeframe {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Timeframe::M1 => "m1",
            Timeframe::M5 => "m5",
            Timeframe::M15 => "m15",
            Timeframe::H1 => "h1",
            Timeframe::H4 => "h4",
            Timeframe::D1 => "d1",
        };
        f.write_str(name)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn at(s: &str) -> DateTime<Utc> {
        DateTime::parse_from_rfc3339(s).unwrap().with_timezone(&Utc)
    }

    #[test]
    fn align_minute() {
        let ts = at("2024-01-01T12:34:56Z");
        assert_eq!(Timeframe::M1.align(ts), at("2024-01-01T12:34:00Z"));
    }

    #[test]
    fn align_hour() {
        let ts = at("2024-01-01T12:34:56Z");
        assert_eq!(Timeframe::H1.align(ts), at("2024-01-01T12:00:00Z"));
    }

    #[test]
    fn align_day() {
        let ts = at("2024-01-01T12:34:56Z");
        assert_eq!(Timeframe::D1.align(ts), at("2024-01-01T00:00:00Z"));
    }

    #[test]
    fn align_is_idempotent() {
        let ts = Utc.with_ymd_and_hms(2024, 3, 7, 9, 41, 13).unwrap();
        for tf in Timeframe::ALL {
            let once = tf.align(ts);
            assert_eq!(tf.align(once), once, "{tf} alignment must be idempotent");
            assert_eq!(once.timestamp() % tf.secs(), 0);
        }
    }

    #[test]
    fn align_already_on_boundary() {
        let ts = at("2024-01-01T12:34:00Z");
        assert_eq!(Timeframe::M1.align(ts), ts);
    }
}
