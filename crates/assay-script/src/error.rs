//! Error types for assay-script

use thiserror::Error;

/// Why a script run failed
#[derive(Error, Debug, Clone, PartialEq)]
pub enum Error {
    #[error("Script execution timed out after {0} ms")]
    Timeout(u64),

    #[error("{0}")]
    ScriptError(String),

    #[error("Memory limit exceeded: {0}")]
    MemoryLimitExceeded(String),

    #[error("Runtime faulted: {0}")]
    Faulted(String),
}

/// Result type alias
pub type Result<T> = std::result::Result<T, Error>;
