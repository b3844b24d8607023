//! Ledger error types.

/// Ledger error.
#[derive(Debug, thiserror::Error)]
pub enum LedgerError {
    /// The database URL scheme is not a supported ledger backend.
    #[error("unsupported database URL: {0}")]
    UnsupportedDatabase(String),

    /// Statement or connection failure reported by the driver.
    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),

    /// A stored value could not be interpreted.
    #[error("decode error: {0}")]
    Decode(String),

    /// Referenced row does not exist.
    #[error("not found: {0}")]
    NotFound(String),

    /// A conditional write kept losing to concurrent writers.
    #[error("write conflict: {0}")]
    Conflict(String),
}

impl LedgerError {
    /// Create a decode error from any error type.
    #[inline]
    pub fn decode<E: std::fmt::Display>(err: E) -> Self {
        Self::Decode(err.to_string())
    }
}
