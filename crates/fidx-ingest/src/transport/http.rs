//! HTTPS transport for the public full-index tree

use super::{IndexTransport, RetryPolicy};
use crate::error::{IngestError, TransportError};
use crate::locator::ResourceLocator;
use async_trait::async_trait;
use reqwest::{Client, StatusCode};
use tracing::info;

/// Fetches `{base_url}/{year}/QTR{q}/{file}` with `reqwest`
///
/// The archive rejects requests without a descriptive user agent, so one is
/// always configured.
pub struct HttpTransport {
    client: Client,
    base_url: String,
    retry: RetryPolicy,
}

impl HttpTransport {
    pub fn new(base_url: impl Into<String>, user_agent: &str, retry: RetryPolicy) -> crate::Result<Self> {
        let client = Client::builder()
            .user_agent(user_agent)
            .timeout(retry.attempt_timeout)
            .build()
            .map_err(|e| IngestError::Config(format!("HTTP client: {}", e)))?;

        Ok(Self {
            client,
            base_url: base_url.into(),
            retry,
        })
    }

    async fn fetch_once(&self, url: &str) -> Result<Vec<u8>, TransportError> {
        let response = self.client.get(url).send().await.map_err(|e| self.classify(e))?;
        let status = response.status();

        if status == StatusCode::NOT_FOUND {
            return Err(TransportError::NotFound(url.to_string()));
        }
        if !status.is_success() {
            return Err(TransportError::Failed(format!("HTTP {} for {}", status, url)));
        }

        let body = response.bytes().await.map_err(|e| self.classify(e))?;
        Ok(body.to_vec())
    }

    fn classify(&self, err: reqwest::Error) -> TransportError {
        if err.is_timeout() {
            TransportError::Timeout(self.retry.attempt_timeout)
        } else {
            err.into()
        }
    }
}

#[async_trait]
impl IndexTransport for HttpTransport {
    async fn fetch(&self, locator: &ResourceLocator) -> Result<Vec<u8>, TransportError> {
        let url = locator.url(&self.base_url);
        let data = self.retry.run(&url, || self.fetch_once(&url)).await?;
        info!(locator = %locator, bytes = data.len(), "Downloaded index resource");
        Ok(data)
    }

    fn name(&self) -> &'static str {
        "http"
    }
}
