//! FTP transport for mirrors of the full-index tree
//!
//! `suppaftp` is blocking, so each attempt runs on the blocking pool and
//! opens its own session.

use super::{IndexTransport, RetryPolicy};
use crate::error::TransportError;
use crate::locator::ResourceLocator;
use async_trait::async_trait;
use std::io::Read;
use std::net::{SocketAddr, TcpStream, ToSocketAddrs};
use std::time::Duration;
use suppaftp::{FtpError, FtpResult, FtpStream, Mode, Status};
use tracing::{debug, info, warn};

/// Connection settings for an FTP mirror
#[derive(Debug, Clone)]
pub struct FtpConfig {
    pub host: String,

    /// Usually 21
    pub port: u16,

    /// Typically "anonymous" for public mirrors
    pub username: String,

    /// Typically a contact address for anonymous access
    pub password: String,

    /// Directory holding the `{year}/QTR{q}` tree, e.g. `/edgar/full-index`
    pub base_path: String,

    /// Connect, read and write deadline for both the control and data sockets
    pub timeout: Duration,
}

impl Default for FtpConfig {
    fn default() -> Self {
        Self {
            host: "localhost".to_string(),
            port: 21,
            username: "anonymous".to_string(),
            password: "anonymous@example.com".to_string(),
            base_path: "/edgar/full-index".to_string(),
            timeout: Duration::from_secs(120),
        }
    }
}

impl FtpConfig {
    /// Remote path of a locator under `base_path`
    pub fn remote_path(&self, locator: &ResourceLocator) -> String {
        format!(
            "{}/{}",
            self.base_path.trim_end_matches('/'),
            locator.relative_path()
        )
    }
}

pub struct FtpTransport {
    config: FtpConfig,
    retry: RetryPolicy,
}

impl FtpTransport {
    pub fn new(config: FtpConfig, retry: RetryPolicy) -> Self {
        Self { config, retry }
    }

    async fn fetch_once(&self, path: &str) -> Result<Vec<u8>, TransportError> {
        let config = self.config.clone();
        let path = path.to_string();

        tokio::task::spawn_blocking(move || download_sync(&config, &path))
            .await
            .map_err(|e| TransportError::Failed(format!("FTP download task panicked: {}", e)))?
    }
}

#[async_trait]
impl IndexTransport for FtpTransport {
    async fn fetch(&self, locator: &ResourceLocator) -> Result<Vec<u8>, TransportError> {
        let path = self.config.remote_path(locator);
        let data = self.retry.run(&path, || self.fetch_once(&path)).await?;
        info!(locator = %locator, bytes = data.len(), "Downloaded index resource over FTP");
        Ok(data)
    }

    fn name(&self) -> &'static str {
        "ftp"
    }
}

fn classify(err: FtpError, path: &str) -> TransportError {
    match err {
        FtpError::UnexpectedResponse(ref response) if response.status == Status::FileUnavailable => {
            TransportError::NotFound(path.to_string())
        },
        other => TransportError::Failed(format!("FTP {}: {}", path, other)),
    }
}

/// TCP connection with deadlines on connect and on every read and write
fn open_socket(addr: SocketAddr, timeout: Duration) -> std::io::Result<TcpStream> {
    let stream = TcpStream::connect_timeout(&addr, timeout)?;
    stream.set_read_timeout(Some(timeout))?;
    stream.set_write_timeout(Some(timeout))?;
    Ok(stream)
}

/// Control connection whose greeting, commands and data channels all time out
fn connect(config: &FtpConfig) -> FtpResult<FtpStream> {
    let timeout = config.timeout;
    let addrs = (config.host.as_str(), config.port)
        .to_socket_addrs()
        .map_err(FtpError::ConnectionError)?;

    let mut last_error = None;
    for addr in addrs {
        match open_socket(addr, timeout) {
            Ok(stream) => {
                let ftp_stream = FtpStream::connect_with_stream(stream)?;
                return Ok(ftp_stream.passive_stream_builder(move |data_addr| {
                    open_socket(data_addr, timeout).map_err(FtpError::ConnectionError)
                }));
            },
            Err(e) => last_error = Some(e),
        }
    }
    Err(FtpError::ConnectionError(last_error.unwrap_or_else(|| {
        std::io::Error::new(
            std::io::ErrorKind::NotFound,
            format!("no address for {}", config.host),
        )
    })))
}

fn download_sync(config: &FtpConfig, path: &str) -> Result<Vec<u8>, TransportError> {
    debug!(host = %config.host, port = config.port, timeout = ?config.timeout, "Connecting to FTP server");

    let mut ftp_stream = connect(config).map_err(|e| classify(e, path))?;

    // Extended passive mode copes with NAT
    ftp_stream.set_mode(Mode::ExtendedPassive);

    ftp_stream
        .login(&config.username, &config.password)
        .map_err(|e| classify(e, path))?;
    ftp_stream
        .transfer_type(suppaftp::types::FileType::Binary)
        .map_err(|e| classify(e, path))?;

    debug!(path, "Retrieving file");
    let mut reader = ftp_stream.retr_as_buffer(path).map_err(|e| classify(e, path))?;

    let mut data = Vec::new();
    reader
        .read_to_end(&mut data)
        .map_err(|e| TransportError::Failed(format!("FTP read {}: {}", path, e)))?;

    if let Err(e) = ftp_stream.quit() {
        warn!("Failed to quit FTP session gracefully: {}", e);
    }

    Ok(data)
}
