//! OHLC engine error types.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum OhlcError {
    #[error("Candle output already taken")]
    OutputTaken,
}

pub type OhlcResult<T> = Result<T, OhlcError>;
