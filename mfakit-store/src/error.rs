//! Error types for store operations.

use thiserror::Error;

/// Error returned by [`FactorStore`](crate::FactorStore) operations.
#[derive(Debug, Error)]
pub enum StoreError {
    /// Underlying SQLite failure.
    #[error("sqlite error: {0}")]
    Sqlite(#[from] rusqlite::Error),
    /// A stored row could not be mapped back into a [`Factor`](crate::Factor).
    #[error("invalid row: {0}")]
    InvalidRow(String),
}

/// Result type for store operations.
pub type StoreResult<T> = Result<T, StoreError>;
