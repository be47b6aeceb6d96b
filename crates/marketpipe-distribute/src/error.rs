//! Distribution error types.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum DistributeError {
    #[error("Distribution buffer full")]
    BufferFull,
}

pub type DistributeResult<T> = Result<T, DistributeError>;
