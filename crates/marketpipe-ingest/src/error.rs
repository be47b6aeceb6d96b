//! Ingest error types.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum IngestError {
    /// The bounded input queue is full; the tick was dropped and
    /// counted. Submission never blocks.
    #[error("Tick buffer full, tick dropped")]
    BufferFull,

    #[error("Ingester output already taken")]
    OutputTaken,
}

pub type IngestResult<T> = Result<T, IngestError>;
