//! Index transports
//!
//! The coordinator only sees [`IndexTransport`]; which upstream serves the
//! bytes is chosen at startup.
//!
//! - [`HttpTransport`]: the public full-index tree over HTTPS
//! - [`FtpTransport`]: an FTP mirror of the same tree
//! - [`LocalTransport`]: a directory mirror on disk

pub mod ftp;
pub mod http;
pub mod local;

pub use ftp::{FtpConfig, FtpTransport};
pub use http::HttpTransport;
pub use local::LocalTransport;

use crate::error::TransportError;
use crate::locator::ResourceLocator;
use async_trait::async_trait;
use std::future::Future;
use std::time::Duration;
use tracing::{debug, warn};

/// Retrieves the raw bytes of one index resource
#[async_trait]
pub trait IndexTransport: Send + Sync {
    async fn fetch(&self, locator: &ResourceLocator) -> Result<Vec<u8>, TransportError>;

    /// Short label for logs
    fn name(&self) -> &'static str;
}

/// Bounded attempts with a per-attempt deadline and linear backoff
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Total attempts including the first
    pub max_attempts: u32,
    /// Multiplied by the attempt number before the next try
    pub base_delay: Duration,
    /// Deadline for a single attempt
    pub attempt_timeout: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            base_delay: Duration::from_secs(5),
            attempt_timeout: Duration::from_secs(120),
        }
    }
}

impl RetryPolicy {
    /// Run `op` until it succeeds, fails with a non-retryable error, or
    /// attempts run out. The last error is returned.
    pub async fn run<T, F, Fut>(&self, what: &str, mut op: F) -> Result<T, TransportError>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T, TransportError>>,
    {
        let attempts = self.max_attempts.max(1);
        let mut attempt = 1;

        loop {
            debug!(attempt, attempts, what, "Fetch attempt");

            let result = match tokio::time::timeout(self.attempt_timeout, op()).await {
                Ok(result) => result,
                Err(_) => Err(TransportError::Timeout(self.attempt_timeout)),
            };

            match result {
                Ok(value) => return Ok(value),
                Err(err) if !err.is_retryable() || attempt >= attempts => return Err(err),
                Err(err) => {
                    let delay = self.base_delay * attempt;
                    warn!(
                        attempt,
                        attempts,
                        what,
                        error = %err,
                        "Fetch attempt failed, retrying in {:?}",
                        delay
                    );
                    tokio::time::sleep(delay).await;
                    attempt += 1;
                },
            }
        }
    }
}
