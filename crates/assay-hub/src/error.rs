//! Error types for assay-hub

use thiserror::Error;

/// Result type for assay-hub operations
pub type Result<T> = std::result::Result<T, Error>;

/// Errors that can occur while running an analysis
#[derive(Debug, Error)]
pub enum Error {
    /// No analysis script with this name
    #[error("analysis not found: {0}")]
    ScriptNotFound(String),

    /// Path, binding or coercion failure
    #[error(transparent)]
    Core(#[from] assay_core::Error),

    /// The sandbox rejected or failed the script
    #[error(transparent)]
    Sandbox(#[from] assay_script::Error),

    /// Storage failure
    #[error("storage error: {0}")]
    Storage(#[from] assay_db::Error),

    /// The worker pool has shut down
    #[error("worker pool closed")]
    PoolClosed,

    /// A blocking task panicked or was cancelled
    #[error("background task failed: {0}")]
    Join(String),
}

impl From<tokio::task::JoinError> for Error {
    fn from(err: tokio::task::JoinError) -> Self {
        Error::Join(err.to_string())
    }
}

impl Error {
    /// The core error behind this one, if any
    pub fn as_core(&self) -> Option<&assay_core::Error> {
        match self {
            Error::Core(err) => Some(err),
            _ => None,
        }
    }
}

// Compile-time check that Error is Send + Sync for propagation across tasks.
fn _assert_error_send_sync<T: Send + Sync>() {}
fn _error_is_send_sync() {
    _assert_error_send_sync::<Error>();
}
