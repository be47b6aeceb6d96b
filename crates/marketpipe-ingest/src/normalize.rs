//! Raw tick normalization and validation.
//!
//! Pure functions, no shared state: timestamp resolution, structural
//! checks, the age window, and the content-derived dedup id.

use chrono::{DateTime, Duration, Utc};
use marketpipe_core::{NormalizedTick, RawTick};
use sha2::{Digest, Sha256};

/// Ticks stamped further than this into the future are rejected.
const FUTURE_TOLERANCE_SECS: i64 = 60;

/// Hex characters kept from the dedup hash.
const DEDUP_ID_LEN: usize = 16;

/// Why a raw tick was rejected at the boundary.
///
/// Rejections are counted and logged, never surfaced as hard failures.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RejectReason {
    InvalidTimestamp,
    NonFinitePrice,
    NonPositivePrice,
    InvertedQuote,
    TooOld,
    FutureTimestamp,
}

impl RejectReason {
    pub const fn as_str(self) -> &'static str {
        match self {
            RejectReason::InvalidTimestamp => "invalid_timestamp",
            RejectReason::NonFinitePrice => "non_finite_price",
            RejectReason::NonPositivePrice => "non_positive_price",
            RejectReason::InvertedQuote => "inverted_quote",
            RejectReason::TooOld => "too_old",
            RejectReason::FutureTimestamp => "future_timestamp",
        }
    }
}

/// Convert a raw tick into the canonical format, or reject it.
pub fn normalize(
    raw: &RawTick,
    now: DateTime<Utc>,
    max_age_secs: i64,
) -> Result<NormalizedTick, RejectReason> {
    let timestamp = raw
        .timestamp
        .resolve()
        .map_err(|_| RejectReason::InvalidTimestamp)?;

    // NaN compares false against everything, so it would slip through
    // the ordering checks below.
    if !raw.bid.is_finite() || !raw.ask.is_finite() {
        return Err(RejectReason::NonFinitePrice);
    }
    if raw.bid <= 0.0 || raw.ask <= 0.0 {
        return Err(RejectReason::NonPositivePrice);
    }
    if raw.bid > raw.ask {
        return Err(RejectReason::InvertedQuote);
    }

    if now - timestamp > Duration::seconds(max_age_secs) {
        return Err(RejectReason::TooOld);
    }
    if timestamp > now + Duration::seconds(FUTURE_TOLERANCE_SECS) {
        return Err(RejectReason::FutureTimestamp);
    }

    Ok(NormalizedTick {
        symbol: raw.symbol.clone(),
        bid: raw.bid,
        ask: raw.ask,
        spread: raw.ask - raw.bid,
        timestamp,
        source: raw.source.clone(),
        tick_id: dedup_id(&raw.source, &raw.symbol, timestamp, raw.bid, raw.ask),
        received_at: now,
    })
}

/// Deterministic short id over (source, symbol, second, bid, ask).
///
/// Prices are quantized to 1e-5 so float formatting differences across
/// sources cannot defeat deduplication.
pub fn dedup_id(
    source: &str,
    symbol: &str,
    timestamp: DateTime<Utc>,
    bid: f64,
    ask: f64,
) -> String {
    let mut hasher = Sha256::new();
    hasher.update(source.as_bytes());
    hasher.update(symbol.as_bytes());
    hasher.update(timestamp.timestamp().to_le_bytes());
    hasher.update(((bid * 100_000.0) as u64).to_le_bytes());
    hasher.update(((ask * 100_000.0) as u64).to_le_bytes());
    let mut id = hex::encode(hasher.finalize());
    id.truncate(DEDUP_ID_LEN);
    id
}

#[cfg(test)]
mod tests {
    use super::*;
    use marketpipe_core::TickStamp;

    fn raw(bid: f64, ask: f64, ts: TickStamp) -> RawTick {
        RawTick::new("oanda", "EURUSD", bid, ask, ts)
    }

    #[test]
    fn accepted_tick_has_exact_spread() {
        let now = Utc::now();
        let tick = normalize(&raw(1.08450, 1.08452, now.into()), now, 60).unwrap();
        assert!((tick.spread - 0.00002).abs() < 1e-9);
        assert_eq!(tick.symbol, "EURUSD");
        assert_eq!(tick.tick_id.len(), 16);
    }

    #[test]
    fn inverted_quote_rejected() {
        let now = Utc::now();
        let err = normalize(&raw(1.08452, 1.08450, now.into()), now, 60).unwrap_err();
        assert_eq!(err, RejectReason::InvertedQuote);
    }

    #[test]
    fn non_positive_price_rejected() {
        let now = Utc::now();
        assert_eq!(
            normalize(&raw(0.0, 1.1, now.into()), now, 60).unwrap_err(),
            RejectReason::NonPositivePrice
        );
        assert_eq!(
            normalize(&raw(-1.0, 1.1, now.into()), now, 60).unwrap_err(),
            RejectReason::NonPositivePrice
        );
    }

    #[test]
    fn non_finite_price_rejected() {
        let now = Utc::now();
        assert_eq!(
            normalize(&raw(f64::NAN, 1.1, now.into()), now, 60).unwrap_err(),
            RejectReason::NonFinitePrice
        );
        assert_eq!(
            normalize(&raw(1.1, f64::NAN, now.into()), now, 60).unwrap_err(),
            RejectReason::NonFinitePrice
        );
        assert_eq!(
            normalize(&raw(1.1, f64::INFINITY, now.into()), now, 60).unwrap_err(),
            RejectReason::NonFinitePrice
        );
    }

    #[test]
    fn stale_and_future_timestamps_rejected() {
        let now = Utc::now();
        let old = now - Duration::seconds(120);
        assert_eq!(
            normalize(&raw(1.1, 1.2, old.into()), now, 60).unwrap_err(),
            RejectReason::TooOld
        );

        let future = now + Duration::seconds(120);
        assert_eq!(
            normalize(&raw(1.1, 1.2, future.into()), now, 60).unwrap_err(),
            RejectReason::FutureTimestamp
        );
    }

    #[test]
    fn unparseable_timestamp_rejected() {
        let now = Utc::now();
        let tick = raw(1.1, 1.2, TickStamp::Text("not-a-time".into()));
        assert_eq!(
            normalize(&tick, now, 60).unwrap_err(),
            RejectReason::InvalidTimestamp
        );
    }

    #[test]
    fn dedup_id_is_deterministic_per_second() {
        let ts = Utc::now();
        let a = dedup_id("oanda", "EURUSD", ts, 1.08450, 1.08452);
        let b = dedup_id("oanda", "EURUSD", ts, 1.08450, 1.08452);
        assert_eq!(a, b);

        let other_price = dedup_id("oanda", "EURUSD", ts, 1.08451, 1.08452);
        assert_ne!(a, other_price);

        let other_source = dedup_id("binance", "EURUSD", ts, 1.08450, 1.08452);
        assert_ne!(a, other_source);
    }
}
