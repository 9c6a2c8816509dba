//! Configuration management
//!
//! Everything is read from `FIDX_*` environment variables (after `.env` is
//! loaded by the binary); command-line flags override individual fields via
//! the `with_*` setters.

use crate::coordinator::CoordinatorSettings;
use crate::locator::{Encoding, SortOrder, EARLIEST_PUBLICATION_YEAR};
use crate::ticker::{EdgarTickerResolver, DEFAULT_TICKER_URL};
use crate::transport::{FtpConfig, FtpTransport, HttpTransport, IndexTransport, LocalTransport, RetryPolicy};
use anyhow::Context;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

// ============================================================================
// Configuration Constants
// ============================================================================

/// Default root of the quarterly full-index tree.
pub const DEFAULT_BASE_URL: &str = "https://www.sec.gov/Archives/edgar/full-index";

/// The archive asks automated clients to identify themselves.
pub const DEFAULT_USER_AGENT: &str = "fidx-ingest/0.1 admin@example.com";

/// Default FTP mirror host.
pub const DEFAULT_FTP_HOST: &str = "ftp.sec.gov";

/// Default FTP port.
pub const DEFAULT_FTP_PORT: u16 = 21;

/// Default FTP directory holding the `{year}/QTR{q}` tree.
pub const DEFAULT_FTP_BASE_PATH: &str = "/edgar/full-index";

/// Default root of an on-disk mirror.
pub const DEFAULT_LOCAL_ROOT: &str = "./full-index";

/// Default directory for cursors and the JSON-lines sink.
pub const DEFAULT_STATE_DIR: &str = "./.fidx";

/// Default records per committed batch.
pub const DEFAULT_BATCH_SIZE: usize = 500;

/// Default locator pipelines in flight.
pub const DEFAULT_CONCURRENCY: usize = 4;

/// Default upstream fetches in flight.
pub const DEFAULT_FETCH_CONCURRENCY: usize = 1;

/// Default per-attempt fetch deadline in seconds.
pub const DEFAULT_FETCH_TIMEOUT_SECS: u64 = 120;

/// Default transport attempts per resource.
pub const DEFAULT_MAX_RETRIES: u32 = 3;

/// Default delay unit between transport attempts in seconds.
pub const DEFAULT_RETRY_DELAY_SECS: u64 = 5;

/// Default sink attempts per batch.
pub const DEFAULT_SINK_MAX_ATTEMPTS: u32 = 3;

/// Which upstream serves index resources
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TransportKind {
    Http,
    Ftp,
    Local,
}

impl std::str::FromStr for TransportKind {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> anyhow::Result<Self> {
        match s.to_lowercase().as_str() {
            "http" | "https" => Ok(TransportKind::Http),
            "ftp" => Ok(TransportKind::Ftp),
            "local" | "file" => Ok(TransportKind::Local),
            other => anyhow::bail!("unknown transport: {}", other),
        }
    }
}

/// Ingestion configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IngestConfig {
    pub base_url: String,
    pub user_agent: String,
    pub transport: TransportKind,
    pub ftp_host: String,
    pub ftp_port: u16,
    pub ftp_base_path: String,
    pub local_root: PathBuf,
    pub state_dir: PathBuf,
    pub encoding: Encoding,
    /// `None` picks the variant from the criteria
    pub sort_order: Option<SortOrder>,
    pub batch_size: usize,
    pub concurrency: usize,
    pub fetch_concurrency: usize,
    pub fetch_timeout_secs: u64,
    pub max_retries: u32,
    pub retry_delay_secs: u64,
    pub sink_max_attempts: u32,
    pub earliest_year: i32,
    /// Browse endpoint with a `{ticker}` placeholder
    pub ticker_url: String,
}

impl Default for IngestConfig {
    fn default() -> Self {
        Self {
            base_url: DEFAULT_BASE_URL.to_string(),
            user_agent: DEFAULT_USER_AGENT.to_string(),
            transport: TransportKind::Http,
            ftp_host: DEFAULT_FTP_HOST.to_string(),
            ftp_port: DEFAULT_FTP_PORT,
            ftp_base_path: DEFAULT_FTP_BASE_PATH.to_string(),
            local_root: PathBuf::from(DEFAULT_LOCAL_ROOT),
            state_dir: PathBuf::from(DEFAULT_STATE_DIR),
            encoding: Encoding::Gzip,
            sort_order: None,
            batch_size: DEFAULT_BATCH_SIZE,
            concurrency: DEFAULT_CONCURRENCY,
            fetch_concurrency: DEFAULT_FETCH_CONCURRENCY,
            fetch_timeout_secs: DEFAULT_FETCH_TIMEOUT_SECS,
            max_retries: DEFAULT_MAX_RETRIES,
            retry_delay_secs: DEFAULT_RETRY_DELAY_SECS,
            sink_max_attempts: DEFAULT_SINK_MAX_ATTEMPTS,
            earliest_year: EARLIEST_PUBLICATION_YEAR,
            ticker_url: DEFAULT_TICKER_URL.to_string(),
        }
    }
}

/// `auto` (or unset) leaves the choice to the planner
pub fn parse_sort_order(value: &str) -> anyhow::Result<Option<SortOrder>> {
    if value.trim().eq_ignore_ascii_case("auto") {
        return Ok(None);
    }
    Ok(Some(value.parse()?))
}

fn env_string(key: &str) -> Option<String> {
    std::env::var(key).ok().filter(|v| !v.trim().is_empty())
}

fn env_parse<T>(key: &str, default: T) -> anyhow::Result<T>
where
    T: std::str::FromStr,
    T::Err: std::fmt::Display,
{
    match env_string(key) {
        Some(raw) => raw
            .trim()
            .parse()
            .map_err(|e| anyhow::anyhow!("{}={:?}: {}", key, raw, e)),
        None => Ok(default),
    }
}

impl IngestConfig {
    /// Load configuration from `FIDX_*` variables and defaults
    pub fn from_env() -> anyhow::Result<Self> {
        let defaults = Self::default();

        let sort_order = match env_string("FIDX_SORT_ORDER") {
            Some(raw) => parse_sort_order(&raw).context("FIDX_SORT_ORDER")?,
            None => defaults.sort_order,
        };
        let encoding = match env_string("FIDX_ENCODING") {
            Some(raw) => raw.parse::<Encoding>().context("FIDX_ENCODING")?,
            None => defaults.encoding,
        };

        let config = Self {
            base_url: env_string("FIDX_BASE_URL").unwrap_or(defaults.base_url),
            user_agent: env_string("FIDX_USER_AGENT").unwrap_or(defaults.user_agent),
            transport: env_parse("FIDX_TRANSPORT", defaults.transport)?,
            ftp_host: env_string("FIDX_FTP_HOST").unwrap_or(defaults.ftp_host),
            ftp_port: env_parse("FIDX_FTP_PORT", defaults.ftp_port)?,
            ftp_base_path: env_string("FIDX_FTP_BASE_PATH").unwrap_or(defaults.ftp_base_path),
            local_root: env_string("FIDX_LOCAL_ROOT")
                .map(PathBuf::from)
                .unwrap_or(defaults.local_root),
            state_dir: env_string("FIDX_STATE_DIR")
                .map(PathBuf::from)
                .unwrap_or(defaults.state_dir),
            encoding,
            sort_order,
            batch_size: env_parse("FIDX_BATCH_SIZE", defaults.batch_size)?,
            concurrency: env_parse("FIDX_CONCURRENCY", defaults.concurrency)?,
            fetch_concurrency: env_parse("FIDX_FETCH_CONCURRENCY", defaults.fetch_concurrency)?,
            fetch_timeout_secs: env_parse("FIDX_FETCH_TIMEOUT_SECS", defaults.fetch_timeout_secs)?,
            max_retries: env_parse("FIDX_MAX_RETRIES", defaults.max_retries)?,
            retry_delay_secs: env_parse("FIDX_RETRY_DELAY_SECS", defaults.retry_delay_secs)?,
            sink_max_attempts: env_parse("FIDX_SINK_MAX_ATTEMPTS", defaults.sink_max_attempts)?,
            earliest_year: env_parse("FIDX_EARLIEST_YEAR", defaults.earliest_year)?,
            ticker_url: env_string("FIDX_TICKER_URL").unwrap_or(defaults.ticker_url),
        };

        config.validate()?;
        Ok(config)
    }

    /// Validate configuration
    pub fn validate(&self) -> anyhow::Result<()> {
        if self.batch_size == 0 {
            anyhow::bail!("Batch size must be greater than 0");
        }
        if self.concurrency == 0 || self.fetch_concurrency == 0 {
            anyhow::bail!("Concurrency and fetch concurrency must be greater than 0");
        }
        if self.fetch_timeout_secs == 0 {
            anyhow::bail!("Fetch timeout must be greater than 0");
        }
        if self.max_retries == 0 || self.sink_max_attempts == 0 {
            anyhow::bail!("Transport and sink attempts must be greater than 0");
        }
        if self.user_agent.trim().is_empty() {
            anyhow::bail!("User agent cannot be empty");
        }
        if !self.ticker_url.contains("{ticker}") {
            anyhow::bail!("Ticker URL must contain a {{ticker}} placeholder");
        }
        if self.earliest_year < EARLIEST_PUBLICATION_YEAR {
            anyhow::bail!(
                "Earliest year {} precedes the first published index ({})",
                self.earliest_year,
                EARLIEST_PUBLICATION_YEAR
            );
        }
        if self.fetch_concurrency > self.concurrency {
            tracing::warn!(
                fetch_concurrency = self.fetch_concurrency,
                concurrency = self.concurrency,
                "Fetch concurrency exceeds pipeline concurrency and will never be reached"
            );
        }
        Ok(())
    }

    pub fn with_transport(mut self, transport: TransportKind) -> Self {
        self.transport = transport;
        self
    }

    pub fn with_encoding(mut self, encoding: Encoding) -> Self {
        self.encoding = encoding;
        self
    }

    pub fn with_sort_order(mut self, sort_order: Option<SortOrder>) -> Self {
        self.sort_order = sort_order;
        self
    }

    pub fn with_state_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.state_dir = dir.into();
        self
    }

    pub fn with_local_root(mut self, root: impl Into<PathBuf>) -> Self {
        self.local_root = root.into();
        self
    }

    pub fn with_batch_size(mut self, batch_size: usize) -> Self {
        self.batch_size = batch_size;
        self
    }

    pub fn with_concurrency(mut self, concurrency: usize) -> Self {
        self.concurrency = concurrency;
        self
    }

    pub fn retry_policy(&self) -> RetryPolicy {
        RetryPolicy {
            max_attempts: self.max_retries,
            base_delay: Duration::from_secs(self.retry_delay_secs),
            attempt_timeout: Duration::from_secs(self.fetch_timeout_secs),
        }
    }

    pub fn coordinator_settings(&self) -> CoordinatorSettings {
        CoordinatorSettings {
            batch_size: self.batch_size,
            concurrency: self.concurrency,
            fetch_concurrency: self.fetch_concurrency,
            sink_max_attempts: self.sink_max_attempts,
            sort_order: self.sort_order,
            encoding: self.encoding,
            ..CoordinatorSettings::default()
        }
    }

    pub fn ftp_config(&self) -> FtpConfig {
        FtpConfig {
            host: self.ftp_host.clone(),
            port: self.ftp_port,
            base_path: self.ftp_base_path.clone(),
            timeout: Duration::from_secs(self.fetch_timeout_secs),
            ..FtpConfig::default()
        }
    }

    /// Instantiate the configured transport
    pub fn build_transport(&self) -> anyhow::Result<Arc<dyn IndexTransport>> {
        let transport: Arc<dyn IndexTransport> = match self.transport {
            TransportKind::Http => Arc::new(
                HttpTransport::new(&self.base_url, &self.user_agent, self.retry_policy())
                    .context("Failed to build HTTP transport")?,
            ),
            TransportKind::Ftp => Arc::new(FtpTransport::new(self.ftp_config(), self.retry_policy())),
            TransportKind::Local => Arc::new(LocalTransport::new(&self.local_root)),
        };
        Ok(transport)
    }

    pub fn build_ticker_resolver(&self) -> anyhow::Result<EdgarTickerResolver> {
        EdgarTickerResolver::new(
            &self.ticker_url,
            &self.user_agent,
            Duration::from_secs(self.fetch_timeout_secs),
        )
        .context("Failed to build ticker resolver")
    }

    pub fn cursor_path(&self) -> PathBuf {
        self.state_dir.join("cursors.json")
    }

    pub fn jsonl_path(&self) -> PathBuf {
        self.state_dir.join("filings.jsonl")
    }
}
