//! Common error types for WPA

use thiserror::Error;

/// Common result type for WPA operations
pub type Result<T> = std::result::Result<T, Error>;

/// Common error types across the WPA crates
#[derive(Error, Debug)]
pub enum Error {
    /// Storage unavailable or statement failed (wraps sqlx::Error)
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    /// I/O operation error (wraps std::io::Error)
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Configuration loading or validation error
    #[error("Configuration error: {0}")]
    Config(String),

    /// Invalid input or request parameter
    #[error("Invalid input: {0}")]
    InvalidInput(String),

    /// Reconciliation of a page failed part way through.
    ///
    /// Writes applied before the failure stay applied; replaying the same
    /// event is safe.
    #[error("Reconciliation of page {page_id} failed in stage {stage}: {source}")]
    Reconcile {
        page_id: i64,
        stage: String,
        #[source]
        source: Box<Error>,
    },

    /// Internal error
    #[error("Internal error: {0}")]
    Internal(String),
}

impl Error {
    /// True when the failure came from the storage layer and retrying the
    /// whole operation later may succeed.
    pub fn is_storage(&self) -> bool {
        match self {
            Error::Database(_) => true,
            Error::Reconcile { source, .. } => source.is_storage(),
            _ => false,
        }
    }
}
