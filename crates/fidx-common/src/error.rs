//! Error types shared across FIDX crates

use thiserror::Error;

/// Result type alias for shared FIDX operations
pub type Result<T> = std::result::Result<T, FidxError>;

/// Main error type for FIDX
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum FidxError {
    #[error("Checksum mismatch: expected {expected}, got {actual}")]
    ChecksumMismatch { expected: String, actual: String },
}
