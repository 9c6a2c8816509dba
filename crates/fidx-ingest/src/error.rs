//! Ingestion error taxonomy
//!
//! Only [`IngestError`] aborts a run. The other enums are scoped to a single
//! locator (transport, decode, sink, cursor) and end up recorded in the
//! [`IngestionReport`](crate::report::IngestionReport) instead of propagating.

use std::time::Duration;
use thiserror::Error;

/// Result type for run-level ingestion operations
pub type Result<T> = std::result::Result<T, IngestError>;

/// Errors that stop an ingestion run before or while it starts
#[derive(Debug, Error)]
pub enum IngestError {
    /// Caller input; nothing was attempted
    #[error("Invalid range: {0}")]
    InvalidRange(String),

    /// An identifier filter cannot be silently weakened
    #[error("Ticker resolution failed for {ticker}: {reason}")]
    TickerResolutionFailed { ticker: String, reason: String },

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Cursor store error: {0}")]
    Cursor(#[from] CursorError),
}

/// Transport-level failure for one resource
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum TransportError {
    #[error("Resource not found: {0}")]
    NotFound(String),

    #[error("Timed out after {0:?}")]
    Timeout(Duration),

    #[error("Transport failure: {0}")]
    Failed(String),
}

impl TransportError {
    /// Missing resources are not retried
    pub fn is_retryable(&self) -> bool {
        !matches!(self, TransportError::NotFound(_))
    }
}

impl From<reqwest::Error> for TransportError {
    fn from(err: reqwest::Error) -> Self {
        TransportError::Failed(err.to_string())
    }
}

/// Failure while reversing the declared encoding or splitting lines
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum DecodeError {
    #[error("Header does not match declared encoding {expected}")]
    HeaderMismatch { expected: &'static str },

    /// The byte stream stopped before the last record was complete
    #[error("Stream ended mid-record: {0}")]
    TransportIncomplete(String),

    #[error("Corrupt {encoding} stream: {reason}")]
    Corrupt {
        encoding: &'static str,
        reason: String,
    },

    #[error("Archive holds no index file")]
    EmptyArchive,
}

/// Persistence sink failure for one upsert
#[derive(Debug, Clone, Error, PartialEq, Eq)]
#[error("Sink failure: {0}")]
pub struct SinkError(pub String);

impl From<std::io::Error> for SinkError {
    fn from(err: std::io::Error) -> Self {
        SinkError(err.to_string())
    }
}

#[cfg(feature = "database")]
impl From<sqlx::Error> for SinkError {
    fn from(err: sqlx::Error) -> Self {
        SinkError(err.to_string())
    }
}

/// Cursor persistence failure
#[derive(Debug, Error)]
pub enum CursorError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}
