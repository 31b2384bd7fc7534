//! Error handling for vsum-store
//!
//! Wraps vsum-core ExError with store-specific helpers

use std::path::Path;

use vsum_core::errors::{ExError, ExErrorKind};

/// Result type alias using ExError
pub type Result<T> = std::result::Result<T, ExError>;

/// Create an IO error
pub fn io_error(operation: &str, err: std::io::Error) -> ExError {
    ExError::new(ExErrorKind::Io)
        .with_op(operation.to_string())
        .with_message(err.to_string())
}

/// Create a serialization error for an artifact
pub fn serialization_error(operation: &str, err: serde_json::Error) -> ExError {
    ExError::new(ExErrorKind::Serialization)
        .with_op(operation.to_string())
        .with_message(err.to_string())
}

/// Create an error for an artifact that parses but cannot be used
pub fn corrupt_artifact(path: &Path, reason: &str) -> ExError {
    ExError::new(ExErrorKind::Persistence)
        .with_op("load_artifact")
        .with_message(format!("{}: {}", path.display(), reason))
}

/// Create an error for an artifact written by an unknown format version
pub fn unsupported_version(path: &Path, found: u32) -> ExError {
    ExError::new(ExErrorKind::Persistence)
        .with_op("load_artifact")
        .with_message(format!(
            "{}: unsupported schema version {}",
            path.display(),
            found
        ))
}
