//! DAG pool error types.

use crate::ContentAddress;

/// Errors raised by a [`DagPool`](crate::DagPool).
#[derive(Debug, thiserror::Error)]
pub enum PoolError {
    /// No node is stored under the address.
    #[error("dag node not found: {address}")]
    NotFound {
        /// The missing address.
        address: ContentAddress,
    },

    /// A string could not be decoded as a content address.
    #[error("invalid content address: {0}")]
    InvalidAddress(String),

    /// Reading the source stream failed.
    #[error("failed to read source stream: {0}")]
    Io(#[from] std::io::Error),
}

/// Convenience result alias for pool operations.
pub type PoolResult<T> = Result<T, PoolError>;
