//! Ticker symbol to company identifier resolution

use crate::error::{IngestError, Result, TransportError};
use async_trait::async_trait;
use fidx_common::types::CompanyId;
use regex::Regex;
use reqwest::{Client, StatusCode};
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::RwLock;
use tracing::{debug, info};

/// Company browse page; `{ticker}` is substituted
pub const DEFAULT_TICKER_URL: &str = "https://www.sec.gov/cgi-bin/browse-edgar?action=getcompany&CIK={ticker}&owner=exclude&count=10";

/// Looks up the identifier behind a ticker symbol
#[async_trait]
pub trait TickerResolver: Send + Sync {
    /// `Ok(None)` when the service does not know the ticker
    async fn resolve(&self, ticker: &str) -> std::result::Result<Option<CompanyId>, TransportError>;
}

/// Resolves tickers by scraping the first `CIK=` link off the company page
pub struct EdgarTickerResolver {
    client: Client,
    url_template: String,
    cik_pattern: Regex,
}

impl EdgarTickerResolver {
    pub fn new(url_template: impl Into<String>, user_agent: &str, timeout: Duration) -> Result<Self> {
        let client = Client::builder()
            .user_agent(user_agent)
            .timeout(timeout)
            .build()
            .map_err(|e| IngestError::Config(format!("ticker HTTP client: {}", e)))?;
        let cik_pattern = Regex::new(r"(?i)CIK=(\d+)")
            .map_err(|e| IngestError::Config(format!("ticker pattern: {}", e)))?;

        Ok(Self {
            client,
            url_template: url_template.into(),
            cik_pattern,
        })
    }

    fn url_for(&self, ticker: &str) -> String {
        self.url_template.replace("{ticker}", ticker)
    }
}

#[async_trait]
impl TickerResolver for EdgarTickerResolver {
    async fn resolve(&self, ticker: &str) -> std::result::Result<Option<CompanyId>, TransportError> {
        let url = self.url_for(ticker);
        debug!(ticker, url = %url, "Resolving ticker");

        let response = self.client.get(&url).send().await?;
        if response.status() == StatusCode::NOT_FOUND {
            return Ok(None);
        }
        let response = response.error_for_status()?;
        let body = response.text().await?;

        Ok(self
            .cik_pattern
            .captures(&body)
            .and_then(|caps| caps.get(1))
            .and_then(|m| m.as_str().parse::<CompanyId>().ok()))
    }
}

/// Per-run cache in front of a [`TickerResolver`]
///
/// Tickers are case-insensitive. Each distinct ticker reaches the resolver
/// at most once; misses are resolved under the write lock so concurrent
/// callers asking for the same symbol wait for the first answer.
pub struct TickerCache {
    resolver: Arc<dyn TickerResolver>,
    resolved: RwLock<HashMap<String, CompanyId>>,
}

impl TickerCache {
    pub fn new(resolver: Arc<dyn TickerResolver>) -> Self {
        Self {
            resolver,
            resolved: RwLock::new(HashMap::new()),
        }
    }

    /// Identifier for `ticker`; unknown tickers are run-fatal
    pub async fn resolve(&self, ticker: &str) -> Result<CompanyId> {
        let key = ticker.trim().to_uppercase();

        if let Some(id) = self.resolved.read().await.get(&key) {
            return Ok(*id);
        }

        let mut resolved = self.resolved.write().await;
        if let Some(id) = resolved.get(&key) {
            return Ok(*id);
        }

        let failed = |reason: String| IngestError::TickerResolutionFailed {
            ticker: key.clone(),
            reason,
        };
        let id = self
            .resolver
            .resolve(&key)
            .await
            .map_err(|e| failed(e.to_string()))?
            .ok_or_else(|| failed("no company identifier found".to_string()))?;

        info!(ticker = %key, cik = %id, "Resolved ticker");
        resolved.insert(key, id);
        Ok(id)
    }

    pub async fn len(&self) -> usize {
        self.resolved.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.resolved.read().await.is_empty()
    }
}
