//! Error types for assay-core

use thiserror::Error;

/// Resolution, binding and coercion errors
///
/// Messages are user-facing: the HTTP layer returns them verbatim inside the
/// error envelope.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum Error {
    #[error("Asset path not found: {0}")]
    PathNotFound(String),

    #[error("Asset has no template: {0}")]
    NoTemplate(String),

    #[error("Attribute not found: {0}")]
    AttributeNotFound(String),

    #[error("{0}")]
    InvalidBinding(String),

    #[error("Parse error: {0}")]
    ParseError(String),

    #[error("Invalid timestamp: {0}")]
    InvalidTimestamp(String),

    #[error("Invalid time range: {0}")]
    InvalidTimeRange(String),

    #[error("Invalid bucket: {0}")]
    InvalidBucket(String),
}

/// Result type alias
pub type Result<T> = std::result::Result<T, Error>;
